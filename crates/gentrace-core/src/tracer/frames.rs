/*!
# Stack Frame Discovery & Hoisting

Phase 1 walks every effect generator body and records one
[`StackFrameRecord`] per distinct delegation site. Nested generator
literals are not entered from an enclosing body: the module-level walk
reaches them on its own, so each site is seen exactly once.

Phase 2 hoists one immutable `const` per record right after the imports.
The `parent` slot of a hoisted frame is a placeholder; the real parent is
supplied at each call site by the delegation rewriter.
*/

use std::collections::HashMap;

use swc_core::common::Span;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitWith};

use super::builders;
use super::patterns::{self, CallPattern, PatternMatcher};
use super::TransformationContext;

/// Metadata for one delegation site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrameRecord {
    pub name: String,
    /// `file:line:column`
    pub location: String,
    /// `_sf<N>`
    pub synthetic_id: String,
}

/// Frames discovered in one file, in first-visit order
#[derive(Debug, Default)]
pub struct FrameRegistry {
    records: Vec<StackFrameRecord>,
    by_location: HashMap<String, usize>,
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a site; a location seen before keeps its first record
    pub fn record(&mut self, location: String, name: String) -> &StackFrameRecord {
        let next = self.records.len();
        let index = *self.by_location.entry(location.clone()).or_insert(next);
        if index == next {
            self.records.push(StackFrameRecord {
                name,
                location,
                synthetic_id: format!("_sf{}", next),
            });
        }
        &self.records[index]
    }

    pub fn get(&self, location: &str) -> Option<&StackFrameRecord> {
        self.by_location.get(location).map(|&index| &self.records[index])
    }

    pub fn records(&self) -> &[StackFrameRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Run phase 1 over a module
pub fn discover(module: &Module, context: &TransformationContext) -> FrameRegistry {
    let mut discovery = FrameDiscovery {
        context,
        registry: FrameRegistry::new(),
    };
    module.visit_with(&mut discovery);
    discovery.registry
}

struct FrameDiscovery<'a, 'ctx> {
    context: &'a TransformationContext<'ctx>,
    registry: FrameRegistry,
}

impl Visit for FrameDiscovery<'_, '_> {
    fn visit_call_expr(&mut self, call: &CallExpr) {
        if PatternMatcher::effect_gen(self.context.bindings).matches(call) {
            for body in patterns::generator_bodies(call) {
                let mut sites = DelegationSites {
                    context: self.context,
                    found: Vec::new(),
                };
                body.visit_with(&mut sites);

                for (span, name) in sites.found {
                    self.registry.record(self.context.location_key(span), name);
                }
            }
        }
        call.visit_children_with(self);
    }
}

/// Delegations of one generator body, stopping at nested generators
struct DelegationSites<'a, 'ctx> {
    context: &'a TransformationContext<'ctx>,
    found: Vec<(Span, String)>,
}

impl Visit for DelegationSites<'_, '_> {
    fn visit_yield_expr(&mut self, expr: &YieldExpr) {
        if let Some(arg) = patterns::delegated_argument(expr) {
            let options = self.context.options;
            let name = patterns::frame_name(
                arg,
                self.context.bindings,
                &options.library,
                options.extract_function_name,
            );
            self.found.push((expr.span, name));
        }
        expr.visit_children_with(self);
    }

    fn visit_function(&mut self, function: &Function) {
        if !function.is_generator {
            function.visit_children_with(self);
        }
    }
}

/// `const _sfN = { name, location: () => "file:line:column", parent: undefined }`
pub fn frame_declaration(record: &StackFrameRecord) -> ModuleItem {
    builders::const_decl(
        &record.synthetic_id,
        builders::object(vec![
            builders::key_value("name", builders::str_lit(&record.name)),
            builders::key_value(
                "location",
                builders::arrow(&[], builders::str_lit(&record.location)),
            ),
            builders::key_value("parent", builders::ident_expr("undefined")),
        ]),
    )
}

/// Run phase 2: insert every frame as one contiguous block at `index`
pub fn hoist(module: &mut Module, registry: &FrameRegistry, index: usize) {
    for (offset, record) in registry.records().iter().enumerate() {
        module.body.insert(index + offset, frame_declaration(record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransformOptions;
    use crate::syntax::{parse, with_globals};
    use crate::tracer::EffectBindings;

    fn discover_in(source: &str, options: &TransformOptions) -> Vec<StackFrameRecord> {
        with_globals(|| {
            let unit = parse(source, "src/program.ts").unwrap();
            let bindings = EffectBindings::resolve(&unit.module, &options.library);
            let context = TransformationContext {
                file_id: "src/program.ts",
                options,
                bindings: &bindings,
                source_map: unit.source_map.clone(),
                comments: &unit.comments,
            };
            discover(&unit.module, &context).records().to_vec()
        })
    }

    #[test]
    fn test_registry_dedups_locations() {
        let mut registry = FrameRegistry::new();
        registry.record("a.ts:1:0".to_string(), "first".to_string());
        registry.record("a.ts:2:0".to_string(), "second".to_string());
        let again = registry.record("a.ts:1:0".to_string(), "other".to_string()).clone();
        assert_eq!(again.synthetic_id, "_sf0");
        assert_eq!(again.name, "first");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("a.ts:2:0").map(|r| r.synthetic_id.as_str()), Some("_sf1"));
        assert!(registry.get("a.ts:3:0").is_none());
    }

    #[test]
    fn test_discovers_sites_with_locations() {
        let records = discover_in(
            r#"import * as Effect from "effect/Effect"
const program = Effect.gen(function* () {
  const user = yield* getUser()
  yield* service.fetchUser()
  yield 42
})
"#,
            &TransformOptions::default(),
        );
        assert_eq!(
            records,
            vec![
                StackFrameRecord {
                    name: "getUser".to_string(),
                    location: "src/program.ts:3:15".to_string(),
                    synthetic_id: "_sf0".to_string(),
                },
                StackFrameRecord {
                    name: "fetchUser".to_string(),
                    location: "src/program.ts:4:2".to_string(),
                    synthetic_id: "_sf1".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_nested_generators_are_recorded_once() {
        let records = discover_in(
            r#"import * as Effect from "effect/Effect"
const outer = Effect.gen(function* () {
  yield* Effect.gen(function* () {
    yield* inner()
  })
  yield* after()
})
"#,
            &TransformOptions::default(),
        );
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Effect.gen", "after", "inner"]);
        let ids: Vec<&str> = records.iter().map(|r| r.synthetic_id.as_str()).collect();
        assert_eq!(ids, vec!["_sf0", "_sf1", "_sf2"]);
    }

    #[test]
    fn test_plain_generators_are_ignored() {
        let records = discover_in(
            r#"import * as Effect from "effect/Effect"
function* plain() {
  yield* other()
}
"#,
            &TransformOptions::default(),
        );
        assert!(records.is_empty());
    }

    #[test]
    fn test_hoist_inserts_contiguous_block() {
        with_globals(|| {
            let mut unit = parse(
                "import * as Effect from \"effect/Effect\"\nconst a = 1\n",
                "test.ts",
            )
            .unwrap();
            let mut registry = FrameRegistry::new();
            registry.record("test.ts:1:0".to_string(), "one".to_string());
            registry.record("test.ts:2:0".to_string(), "two".to_string());
            hoist(&mut unit.module, &registry, 1);
            assert_eq!(unit.module.body.len(), 4);
            assert!(matches!(unit.module.body[0], ModuleItem::ModuleDecl(ModuleDecl::Import(_))));
            for item in &unit.module.body[1..3] {
                assert!(matches!(item, ModuleItem::Stmt(Stmt::Decl(Decl::Var(_)))));
            }
        });
    }
}
