/*!
# Stack Frame Instrumentation

Rule tying together frame discovery, import guarantees, hoisting and the
delegation rewriter.
*/

use swc_core::ecma::ast::Module;
use tracing::debug;

use super::bindings::{self, RegistryRef};
use super::builders;
use super::delegation::DelegationRewriter;
use super::frames;
use super::rules::TransformationRule;
use super::{TransformResult, TransformationContext};

pub struct StackFrameInstrumentation {
    priority: u32,
}

impl StackFrameInstrumentation {
    pub fn new() -> Self {
        Self { priority: 200 }
    }
}

impl Default for StackFrameInstrumentation {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformationRule for StackFrameInstrumentation {
    fn name(&self) -> &'static str {
        "StackFrameInstrumentation"
    }

    fn description(&self) -> &'static str {
        "Hoists a stack frame per yield* site and links it to the caller's frame at run time"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn matches(&self, _module: &Module, context: &TransformationContext) -> bool {
        !context.bindings.is_empty()
    }

    fn transform(&self, module: &mut Module, context: &TransformationContext) -> TransformResult<bool> {
        let registry = frames::discover(module, context);
        if registry.is_empty() {
            return Ok(false);
        }

        let library = &context.options.library;
        let registry_ref: RegistryRef = bindings::ensure_registry(module, library);
        let update = match &context.bindings.namespace {
            Some(namespace) => builders::member(namespace, &library.update_combinator),
            None => builders::ident_expr(&bindings::ensure_named_import(
                module,
                library.primary_namespace_module(),
                &library.update_combinator,
            )),
        };

        let index = bindings::insertion_index(module);
        frames::hoist(module, &registry, index);

        let rewritten = DelegationRewriter::new(context, &registry, update, &registry_ref).rewrite(module);
        debug!(
            file = context.file_id,
            frames = registry.len(),
            rewritten,
            "stack frames instrumented"
        );

        Ok(true)
    }
}
