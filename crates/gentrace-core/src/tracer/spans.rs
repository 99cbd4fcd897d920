/*!
# Span Instrumentation

Wraps matched combinator calls in the library's span combinator:

```text
Effect.withSpan(call, "Effect.all (program)", {
  attributes: { "code.filepath": ..., "code.lineno": ..., "code.column": ..., "code.function": ... }
})
```

Matches are visited in pre-order. The depth of a match counts only the
matches enclosing it, so non-matching wrappers in between do not add depth.
Inner matches are wrapped before their enclosing match.
*/

use swc_core::common::{Span, DUMMY_SP};
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};
use tracing::{debug, trace};

use super::builders;
use super::patterns::{InstrumentablePattern, PatternMatcher};
use super::policy::{CompiledPolicy, SpanCandidate};
use super::rules::TransformationRule;
use super::{TransformResult, TransformationContext};
use crate::config::{Combinator, NameFormat, SpanOptions};

pub struct SpanInstrumentation {
    policy: CompiledPolicy,
    priority: u32,
}

impl SpanInstrumentation {
    /// Compile the span policy; malformed patterns are reported here
    pub fn new(spans: &SpanOptions) -> crate::Result<Self> {
        Ok(Self {
            policy: CompiledPolicy::compile(spans.strategy.as_ref())?,
            priority: 300,
        })
    }
}

impl TransformationRule for SpanInstrumentation {
    fn name(&self) -> &'static str {
        "SpanInstrumentation"
    }

    fn description(&self) -> &'static str {
        "Wraps combinator calls accepted by the span policy in a tracing span"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn matches(&self, _module: &Module, context: &TransformationContext) -> bool {
        context.options.spans.enabled && context.bindings.namespace.is_some()
    }

    fn transform(&self, module: &mut Module, context: &TransformationContext) -> TransformResult<bool> {
        let Some(namespace) = context.bindings.namespace.as_deref() else {
            return Ok(false);
        };

        let mut wrapper = SpanWrapper {
            context,
            policy: &self.policy,
            pattern: PatternMatcher::instrumentable(context.bindings, &context.options.spans),
            namespace,
            depth: 0,
            bound_names: Vec::new(),
            wrapped: 0,
        };
        module.visit_mut_with(&mut wrapper);

        debug!(file = context.file_id, spans = wrapper.wrapped, "span instrumentation done");
        Ok(wrapper.wrapped > 0)
    }
}

struct SpanWrapper<'a, 'ctx> {
    context: &'a TransformationContext<'ctx>,
    policy: &'a CompiledPolicy,
    pattern: InstrumentablePattern<'a>,
    namespace: &'a str,
    /// Matches currently enclosing the visitor
    depth: usize,
    bound_names: Vec<String>,
    wrapped: usize,
}

impl SpanWrapper<'_, '_> {
    fn with_bound_name(&mut self, name: String, visit: impl FnOnce(&mut Self)) {
        self.bound_names.push(name);
        visit(self);
        self.bound_names.pop();
    }

    fn wrap(&self, call: Expr, combinator: Combinator, span: Span, function: Option<&str>) -> Expr {
        let file = self.context.source_path();
        let location = self.context.location(span);
        let name = render_name(
            self.context.options.spans.name_format,
            &format!("{}.{}", self.namespace, combinator),
            function,
            file,
            location.line,
        );

        let attributes = builders::object(vec![
            builders::quoted_key_value("code.filepath", builders::str_lit(file)),
            builders::quoted_key_value("code.lineno", builders::num_lit(location.line)),
            builders::quoted_key_value("code.column", builders::num_lit(location.column)),
            builders::quoted_key_value("code.function", builders::str_lit(function.unwrap_or(&name))),
        ]);

        builders::call(
            builders::member(self.namespace, &self.context.options.library.span_combinator),
            vec![
                call,
                builders::str_lit(&name),
                builders::object(vec![builders::key_value("attributes", attributes)]),
            ],
        )
    }
}

impl VisitMut for SpanWrapper<'_, '_> {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        let matched = match expr {
            Expr::Call(call) if !call.span.is_dummy() => {
                self.pattern.combinator(call).map(|combinator| (combinator, call.span))
            }
            _ => None,
        };
        let Some((combinator, span)) = matched else {
            expr.visit_mut_children_with(self);
            return;
        };

        let depth = self.depth;
        self.depth += 1;
        expr.visit_mut_children_with(self);
        self.depth -= 1;

        let function = self.bound_names.last().cloned();
        let candidate = SpanCandidate {
            combinator,
            depth,
            file: self.context.source_path(),
            function: function.as_deref(),
        };
        if !self.policy.accepts(&candidate) {
            trace!(%combinator, depth, function = ?candidate.function, "span rejected by policy");
            return;
        }

        let call = std::mem::replace(expr, Expr::Invalid(Invalid { span: DUMMY_SP }));
        *expr = self.wrap(call, combinator, span, function.as_deref());
        self.wrapped += 1;
    }

    fn visit_mut_var_declarator(&mut self, declarator: &mut VarDeclarator) {
        let name = match &declarator.name {
            Pat::Ident(binding) => Some(binding.id.sym.to_string()),
            _ => None,
        };
        match name {
            Some(name) => self.with_bound_name(name, |this| declarator.visit_mut_children_with(this)),
            None => declarator.visit_mut_children_with(self),
        }
    }

    fn visit_mut_fn_decl(&mut self, decl: &mut FnDecl) {
        let name = decl.ident.sym.to_string();
        self.with_bound_name(name, |this| decl.visit_mut_children_with(this));
    }

    fn visit_mut_class_decl(&mut self, decl: &mut ClassDecl) {
        let name = decl.ident.sym.to_string();
        self.with_bound_name(name, |this| decl.visit_mut_children_with(this));
    }

    fn visit_mut_export_default_expr(&mut self, export: &mut ExportDefaultExpr) {
        self.with_bound_name("default".to_string(), |this| export.visit_mut_children_with(this));
    }

    fn visit_mut_export_default_decl(&mut self, export: &mut ExportDefaultDecl) {
        self.with_bound_name("default".to_string(), |this| export.visit_mut_children_with(this));
    }
}

/// Span name for a combinator qualified by the local namespace alias
pub fn render_name(format: NameFormat, qualified: &str, function: Option<&str>, file: &str, line: usize) -> String {
    match (format, function) {
        (NameFormat::Function, Some(function)) => format!("{} ({})", qualified, function),
        (NameFormat::Function, None) => qualified.to_string(),
        (NameFormat::Full, Some(function)) => format!("{} ({} @ {}:{})", qualified, function, file, line),
        (NameFormat::Location, _) | (NameFormat::Full, None) => format!("{} ({}:{})", qualified, file, line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DepthPolicy, OverridePolicy, RuleFilter, SpanStrategy, TransformOptions};
    use crate::tracer::test_support::run_rule;
    use indexmap::IndexMap;

    const NESTED: &str = r#"import * as Effect from "effect/Effect"
const program = Effect.gen(function* () {
  yield* Effect.all([Effect.forEach(items, process)])
})
"#;

    fn span_options(strategy: Option<SpanStrategy>) -> TransformOptions {
        TransformOptions {
            spans: SpanOptions {
                enabled: true,
                strategy,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn instrument(source: &str, file_id: &str, options: &TransformOptions) -> (bool, String) {
        let rule = SpanInstrumentation::new(&options.spans).unwrap();
        run_rule(&rule, source, file_id, options)
    }

    #[test]
    fn test_render_name_formats() {
        assert_eq!(render_name(NameFormat::Function, "Effect.all", Some("program"), "a.ts", 3), "Effect.all (program)");
        assert_eq!(render_name(NameFormat::Function, "Effect.all", None, "a.ts", 3), "Effect.all");
        assert_eq!(render_name(NameFormat::Location, "Effect.all", Some("program"), "a.ts", 3), "Effect.all (a.ts:3)");
        assert_eq!(render_name(NameFormat::Full, "E.fork", Some("run"), "a.ts", 9), "E.fork (run @ a.ts:9)");
        assert_eq!(render_name(NameFormat::Full, "E.fork", None, "a.ts", 9), "E.fork (a.ts:9)");
    }

    #[test]
    fn test_depth_limit_counts_enclosing_matches() {
        let options = span_options(Some(SpanStrategy::Depth(DepthPolicy {
            global_max_depth: Some(1),
            ..Default::default()
        })));
        let (changed, code) = instrument(NESTED, "main.ts", &options);
        assert!(changed);
        assert_eq!(code.matches("Effect.withSpan(").count(), 2);
        assert!(code.contains("\"Effect.gen (program)\""));
        assert!(code.contains("\"Effect.all (program)\""));
        assert!(!code.contains("Effect.forEach (program)"));
    }

    #[test]
    fn test_unbounded_wraps_every_match() {
        let (_, code) = instrument(NESTED, "main.ts", &span_options(None));
        assert_eq!(code.matches("Effect.withSpan(").count(), 3);
        assert!(code.contains("\"code.filepath\": \"main.ts\""));
        assert!(code.contains("\"code.lineno\": 2"));
        assert!(code.contains("\"code.function\": \"program\""));
    }

    #[test]
    fn test_override_by_file() {
        let mut rules = IndexMap::new();
        rules.insert(
            Combinator::Fork,
            RuleFilter {
                include_files: Some(vec!["src/workers/**".to_string()]),
                ..Default::default()
            },
        );
        let options = span_options(Some(SpanStrategy::Override(OverridePolicy { rules })));
        let source = "import { Effect } from \"effect\"\nexport const start = Effect.fork(task)\n";

        let (changed, _) = instrument(source, "src/utils/helpers.ts", &options);
        assert!(!changed);
        let (changed, code) = instrument(source, "src/workers/task.ts", &options);
        assert!(changed);
        assert!(code.contains("\"Effect.fork (start)\""));
    }

    #[test]
    fn test_bundler_query_is_dropped_from_attributes() {
        let mut options = span_options(None);
        options.spans.name_format = NameFormat::Location;
        let source = "import { Effect } from \"effect\"\nexport const start = Effect.fork(task)\n";
        let (changed, code) = instrument(source, "src/App.vue?vue&type=script&lang.ts", &options);
        assert!(changed);
        assert!(code.contains("\"code.filepath\": \"src/App.vue\""));
        assert!(code.contains("\"Effect.fork (src/App.vue:2)\""));
        assert!(!code.contains("type=script"));
    }

    #[test]
    fn test_names_and_formats() {
        let mut options = span_options(None);
        options.spans.name_format = NameFormat::Full;
        let source = r#"import * as Fx from "effect/Effect"
export default Fx.all([a, b])
function run() {
  return Fx.fork(task)
}
"#;
        let (_, code) = instrument(source, "app.ts", &options);
        assert!(code.contains("Fx.withSpan(Fx.all("));
        assert!(code.contains("\"Fx.all (default @ app.ts:2)\""));
        assert!(code.contains("\"Fx.fork (run @ app.ts:4)\""));
    }

    #[test]
    fn test_anonymous_match_uses_rendered_name() {
        let mut options = span_options(None);
        options.spans.name_format = NameFormat::Location;
        let source = "import * as Effect from \"effect/Effect\"\nEffect.runPromise(Effect.all([a]))\n";
        let (_, code) = instrument(source, "app.ts", &options);
        assert!(code.contains("\"code.function\": \"Effect.all (app.ts:2)\""));
        assert!(!code.contains("Effect.withSpan(Effect.runPromise"));
    }

    #[test]
    fn test_requires_namespace_binding() {
        let source = "import { gen } from \"effect/Effect\"\nconst p = gen(function* () {})\n";
        let (changed, code) = instrument(source, "app.ts", &span_options(None));
        assert!(!changed);
        assert!(!code.contains("withSpan"));
    }

    #[test]
    fn test_disabled_spans_do_not_match() {
        let options = TransformOptions::default();
        let (changed, code) = instrument(NESTED, "main.ts", &options);
        assert!(!changed);
        assert!(!code.contains("withSpan"));
    }
}
