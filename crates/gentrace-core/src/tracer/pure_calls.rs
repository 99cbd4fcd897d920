/*!
# Pure Call Annotation

Marks calls into side-effect free library modules (`Layer.succeed(...)`,
`Context.GenericTag(...)`) with a leading `/*#__PURE__*/` comment so that
bundlers can drop them when their result is unused. Only calls whose
result is bound, exported, returned or produced by an arrow expression
body are marked; nothing else in the tree changes.
*/

use std::collections::HashSet;

use swc_core::common::comments::Comments;
use swc_core::common::BytePos;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};
use tracing::{debug, trace};

use super::bindings;
use super::patterns::{CallPattern, ModuleCallPattern, PatternMatcher};
use super::rules::TransformationRule;
use super::{TransformResult, TransformationContext};

pub struct PureCallAnnotator {
    priority: u32,
}

impl PureCallAnnotator {
    pub fn new() -> Self {
        Self { priority: 100 }
    }
}

impl Default for PureCallAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformationRule for PureCallAnnotator {
    fn name(&self) -> &'static str {
        "PureCallAnnotator"
    }

    fn description(&self) -> &'static str {
        "Adds #__PURE__ markers to discardable calls into side-effect free modules"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn matches(&self, _module: &Module, context: &TransformationContext) -> bool {
        context.options.pure_calls.enabled && !context.options.pure_calls.modules.is_empty()
    }

    fn transform(&self, module: &mut Module, context: &TransformationContext) -> TransformResult<bool> {
        let aliases = pure_module_aliases(module, context);
        if aliases.is_empty() {
            return Ok(false);
        }

        let mut annotator = Annotator {
            context,
            pattern: PatternMatcher::module_call(&aliases),
            discardable: false,
            annotated: 0,
        };
        module.visit_mut_with(&mut annotator);

        debug!(file = context.file_id, annotated = annotator.annotated, "pure calls annotated");
        Ok(annotator.annotated > 0)
    }
}

struct Annotator<'a, 'ctx> {
    context: &'a TransformationContext<'ctx>,
    pattern: ModuleCallPattern<'a>,
    /// Whether the value being visited may be dropped when unused
    discardable: bool,
    annotated: usize,
}

impl Annotator<'_, '_> {
    fn scoped(&mut self, discardable: bool, visit: impl FnOnce(&mut Self)) {
        let saved = std::mem::replace(&mut self.discardable, discardable);
        visit(self);
        self.discardable = saved;
    }

    fn has_pure_marker(&self, pos: BytePos) -> bool {
        self.context
            .comments
            .get_leading(pos)
            .map(|comments| {
                comments.iter().any(|comment| {
                    let text = comment.text.trim();
                    text == "#__PURE__" || text == "@__PURE__"
                })
            })
            .unwrap_or(false)
    }
}

impl VisitMut for Annotator<'_, '_> {
    fn visit_mut_call_expr(&mut self, call: &mut CallExpr) {
        if self.discardable && !call.span.is_dummy() && self.pattern.matches(call) {
            if self.has_pure_marker(call.span.lo) {
                trace!(pos = call.span.lo.0, "already marked pure");
            } else {
                self.context.comments.add_pure_comment(call.span.lo);
                self.annotated += 1;
            }
        }
        // `M.f(x)(y)`: same as a piped call, the marker would cover the outer call
        match &mut call.callee {
            Callee::Expr(callee) => match &mut **callee {
                Expr::Call(inner) => inner.visit_mut_children_with(self),
                other => other.visit_mut_with(self),
            },
            callee => callee.visit_mut_with(self),
        }
        call.args.visit_mut_with(self);
        call.type_args.visit_mut_with(self);
    }

    /// `M.f(x).pipe(...)`: a marker on the inner call would end up in front
    /// of the outer one
    fn visit_mut_member_expr(&mut self, member: &mut MemberExpr) {
        match &mut *member.obj {
            Expr::Call(call) => call.visit_mut_children_with(self),
            obj => obj.visit_mut_with(self),
        }
        member.prop.visit_mut_with(self);
    }

    fn visit_mut_var_declarator(&mut self, declarator: &mut VarDeclarator) {
        declarator.name.visit_mut_with(self);
        self.scoped(true, |this| declarator.init.visit_mut_with(this));
    }

    fn visit_mut_export_decl(&mut self, export: &mut ExportDecl) {
        self.scoped(true, |this| export.visit_mut_children_with(this));
    }

    fn visit_mut_export_default_expr(&mut self, export: &mut ExportDefaultExpr) {
        self.scoped(true, |this| export.visit_mut_children_with(this));
    }

    fn visit_mut_return_stmt(&mut self, stmt: &mut ReturnStmt) {
        self.scoped(true, |this| stmt.visit_mut_children_with(this));
    }

    fn visit_mut_arrow_expr(&mut self, arrow: &mut ArrowExpr) {
        self.scoped(false, |this| arrow.params.visit_mut_with(this));
        match &mut *arrow.body {
            BlockStmtOrExpr::Expr(body) => self.scoped(true, |this| body.visit_mut_with(this)),
            BlockStmtOrExpr::BlockStmt(block) => block.visit_mut_with(self),
        }
    }

    fn visit_mut_block_stmt(&mut self, block: &mut BlockStmt) {
        self.scoped(false, |this| block.visit_mut_children_with(this));
    }
}

/// Aliases of the allow-listed modules imported by a module
pub fn pure_module_aliases(module: &Module, context: &TransformationContext) -> HashSet<String> {
    bindings::module_aliases(module, &context.options.library, &context.options.pure_calls.modules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PureCallOptions, TransformOptions};
    use crate::tracer::test_support::run_rule;

    fn options() -> TransformOptions {
        TransformOptions {
            pure_calls: PureCallOptions {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn annotate(source: &str) -> (bool, String) {
        run_rule(&PureCallAnnotator::new(), source, "layers.ts", &options())
    }

    #[test]
    fn test_discardable_positions() {
        let (changed, code) = annotate(
            r#"import { Layer, Context } from "effect"
const Live = Layer.succeed(Tag, impl)
export const Tag2 = Context.GenericTag("Tag2")
function make() {
  return Layer.effect(Tag, build)
}
const lazy = () => Layer.scoped(Tag, acquire)
"#,
        );
        assert!(changed);
        assert_eq!(code.matches("/*#__PURE__*/").count(), 4);
        assert!(code.contains("/*#__PURE__*/ Layer.succeed("));
        assert!(code.contains("/*#__PURE__*/ Context.GenericTag("));
        assert!(code.contains("/*#__PURE__*/ Layer.effect("));
        assert!(code.contains("/*#__PURE__*/ Layer.scoped("));
    }

    #[test]
    fn test_bare_statements_are_not_annotated() {
        let (changed, code) = annotate(
            r#"import * as Layer from "effect/Layer"
Layer.succeed(Tag, impl)
const run = () => {
  Layer.launch(live)
}
"#,
        );
        assert!(!changed);
        assert!(!code.contains("__PURE__"));
    }

    #[test]
    fn test_existing_markers_are_kept() {
        let (changed, code) = annotate(
            r#"import { Layer } from "effect"
const Live = /*#__PURE__*/ Layer.succeed(Tag, impl)
const Other = /* @__PURE__ */ Layer.succeed(Tag, other)
"#,
        );
        assert!(!changed);
        assert_eq!(code.matches("__PURE__").count(), 2);
    }

    #[test]
    fn test_piped_calls_and_other_modules() {
        let (changed, code) = annotate(
            r#"import { Layer, Effect } from "effect"
const Live = Layer.succeed(Tag, impl).pipe(Layer.provide(Base))
const program = Effect.succeed(1)
"#,
        );
        assert!(changed);
        assert_eq!(code.matches("/*#__PURE__*/").count(), 1);
        assert!(code.contains("/*#__PURE__*/ Layer.provide(Base)"));
    }

    #[test]
    fn test_called_results_are_not_annotated() {
        let (changed, code) = annotate(
            r#"import { Layer } from "effect"
const y = Layer.succeed(a)(b)
const z = Layer.succeed(Layer.effect(Tag, build))(c)
"#,
        );
        assert!(changed);
        assert_eq!(code.matches("/*#__PURE__*/").count(), 1);
        assert!(code.contains("/*#__PURE__*/ Layer.effect(Tag, build)"));
        assert!(!code.contains("/*#__PURE__*/ Layer.succeed("));
    }

    #[test]
    fn test_disabled_by_default() {
        let source = "import { Layer } from \"effect\"\nconst Live = Layer.succeed(Tag, impl)\n";
        let (changed, code) = run_rule(&PureCallAnnotator::new(), source, "a.ts", &TransformOptions::default());
        assert!(!changed);
        assert!(!code.contains("__PURE__"));
    }
}
