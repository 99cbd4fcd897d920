/*!
# Call Pattern Matching

Predicates over call expressions used by every rule, plus frame name
extraction for delegated calls.
*/

use std::collections::HashSet;

use swc_core::ecma::ast::*;

use super::bindings::EffectBindings;
use crate::config::{Combinator, LibraryProfile, SpanOptions, FALLBACK_FRAME_NAME, UNKNOWN_FRAME_NAME};

/// Pattern matcher for call expressions
pub trait CallPattern {
    /// Check if this pattern matches the given call
    fn matches(&self, call: &CallExpr) -> bool;
}

/// Pattern matcher utility
pub struct PatternMatcher;

impl PatternMatcher {
    /// `<namespace>.gen(...)` or a bare call of the imported generator combinator
    pub fn effect_gen(bindings: &EffectBindings) -> EffectGenPattern<'_> {
        EffectGenPattern { bindings }
    }

    /// `<namespace>.<combinator>(...)` for combinators allowed by the span options
    pub fn instrumentable<'a>(bindings: &'a EffectBindings, spans: &'a SpanOptions) -> InstrumentablePattern<'a> {
        InstrumentablePattern { bindings, spans }
    }

    /// `<alias>.<fn>(...)` where `alias` is one of the given module aliases
    pub fn module_call(aliases: &HashSet<String>) -> ModuleCallPattern<'_> {
        ModuleCallPattern { aliases }
    }
}

pub struct EffectGenPattern<'a> {
    bindings: &'a EffectBindings,
}

impl CallPattern for EffectGenPattern<'_> {
    fn matches(&self, call: &CallExpr) -> bool {
        match callee_expr(call) {
            Some(Expr::Ident(ident)) => self.bindings.gen.as_deref() == Some(&*ident.sym),
            Some(Expr::Member(member)) => match namespace_member(member) {
                Some((object, property)) => self.bindings.is_namespace(object) && property == "gen",
                None => false,
            },
            _ => false,
        }
    }
}

pub struct InstrumentablePattern<'a> {
    bindings: &'a EffectBindings,
    spans: &'a SpanOptions,
}

impl InstrumentablePattern<'_> {
    /// The matched combinator, if any
    pub fn combinator(&self, call: &CallExpr) -> Option<Combinator> {
        let Some(Expr::Member(member)) = callee_expr(call) else {
            return None;
        };
        let (object, property) = namespace_member(member)?;
        if !self.bindings.is_namespace(object) {
            return None;
        }
        Combinator::from_member(property).filter(|c| self.spans.allows(*c))
    }
}

impl CallPattern for InstrumentablePattern<'_> {
    fn matches(&self, call: &CallExpr) -> bool {
        self.combinator(call).is_some()
    }
}

pub struct ModuleCallPattern<'a> {
    aliases: &'a HashSet<String>,
}

impl CallPattern for ModuleCallPattern<'_> {
    fn matches(&self, call: &CallExpr) -> bool {
        match callee_expr(call) {
            Some(Expr::Member(member)) => match namespace_member(member) {
                Some((object, _)) => self.aliases.contains(object),
                None => false,
            },
            _ => false,
        }
    }
}

/// Argument of a `yield*` expression; plain yields never delegate
pub fn delegated_argument(expr: &YieldExpr) -> Option<&Expr> {
    if expr.delegate {
        expr.arg.as_deref()
    } else {
        None
    }
}

/// Generator function literals passed to an effect generator call
pub fn generator_bodies(call: &CallExpr) -> impl Iterator<Item = &BlockStmt> {
    call.args.iter().filter_map(|arg| match &*arg.expr {
        Expr::Fn(FnExpr { function, .. }) if function.is_generator => function.body.as_ref(),
        _ => None,
    })
}

/// Human readable name of a delegated computation.
///
/// Precedence: bare call `f()` gives `f`; a method call on anything but the
/// effect namespace gives the method; a call on the effect namespace gives
/// `Ns.m`; everything else is `unknown`. Span wrappers added by the engine
/// are looked through so the name reflects the user's call.
pub fn frame_name(
    arg: &Expr,
    bindings: &EffectBindings,
    profile: &LibraryProfile,
    extract: bool,
) -> String {
    if !extract {
        return FALLBACK_FRAME_NAME.to_string();
    }

    let Expr::Call(call) = unwrap_parens(arg) else {
        return UNKNOWN_FRAME_NAME.to_string();
    };
    let call = unwrap_span_wrapper(call, bindings, profile);

    match callee_expr(call) {
        Some(Expr::Ident(ident)) => ident.sym.to_string(),
        Some(Expr::Member(member)) => match &member.prop {
            MemberProp::Ident(property) => match &*member.obj {
                Expr::Ident(object) if bindings.is_namespace(&object.sym) => {
                    format!("{}.{}", object.sym, property.sym)
                }
                _ => property.sym.to_string(),
            },
            _ => UNKNOWN_FRAME_NAME.to_string(),
        },
        _ => UNKNOWN_FRAME_NAME.to_string(),
    }
}

/// The call inside a span wrapper synthesized by the engine
fn unwrap_span_wrapper<'a>(call: &'a CallExpr, bindings: &EffectBindings, profile: &LibraryProfile) -> &'a CallExpr {
    if !call.span.is_dummy() {
        return call;
    }
    let is_wrapper = matches!(
        callee_expr(call),
        Some(Expr::Member(member)) if matches!(
            namespace_member(member),
            Some((object, property)) if bindings.is_namespace(object) && property == profile.span_combinator
        )
    );
    match call.args.first().map(|arg| &*arg.expr) {
        Some(Expr::Call(inner)) if is_wrapper => inner,
        _ => call,
    }
}

fn unwrap_parens(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(paren) => unwrap_parens(&paren.expr),
        other => other,
    }
}

pub(crate) fn callee_expr(call: &CallExpr) -> Option<&Expr> {
    match &call.callee {
        Callee::Expr(callee) => Some(unwrap_parens(callee)),
        _ => None,
    }
}

/// `(object, property)` of an `ident.ident` member expression
pub(crate) fn namespace_member(member: &MemberExpr) -> Option<(&str, &str)> {
    match (&*member.obj, &member.prop) {
        (Expr::Ident(object), MemberProp::Ident(property)) => Some((&*object.sym, &*property.sym)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{parse, with_globals};
    use swc_core::ecma::visit::{Visit, VisitWith};

    #[derive(Default)]
    struct Collect {
        calls: Vec<CallExpr>,
        yields: Vec<YieldExpr>,
    }

    impl Visit for Collect {
        fn visit_call_expr(&mut self, call: &CallExpr) {
            self.calls.push(call.clone());
            call.visit_children_with(self);
        }

        fn visit_yield_expr(&mut self, expr: &YieldExpr) {
            self.yields.push(expr.clone());
            expr.visit_children_with(self);
        }
    }

    fn collect(source: &str) -> (EffectBindings, Collect) {
        with_globals(|| {
            let unit = parse(source, "test.ts").unwrap();
            let bindings = EffectBindings::resolve(&unit.module, &LibraryProfile::default());
            let mut collect = Collect::default();
            unit.module.visit_with(&mut collect);
            (bindings, collect)
        })
    }

    #[test]
    fn test_effect_gen_namespace_and_alias() {
        let (bindings, found) = collect(
            r#"
import * as Effect from "effect/Effect"
import { gen } from "effect/Effect"
Effect.gen(function* () {})
gen(function* () {})
Other.gen(function* () {})
"#,
        );
        let pattern = PatternMatcher::effect_gen(&bindings);
        let matched: Vec<bool> = found.calls.iter().map(|c| pattern.matches(c)).collect();
        assert_eq!(matched, vec![true, true, false]);
    }

    #[test]
    fn test_instrumentable_respects_lists() {
        let (bindings, found) = collect(
            r#"
import { Effect } from "effect"
Effect.all([])
Effect.fork(x)
Effect.succeed(1)
"#,
        );
        let spans = SpanOptions {
            exclude: vec![Combinator::Fork],
            ..Default::default()
        };
        let pattern = PatternMatcher::instrumentable(&bindings, &spans);
        let combinators: Vec<Option<Combinator>> = found.calls.iter().map(|c| pattern.combinator(c)).collect();
        assert_eq!(combinators, vec![Some(Combinator::All), None, None]);
    }

    #[test]
    fn test_delegated_argument() {
        let (_, found) = collect(
            r#"
function* g() {
  yield 1
  yield* other()
  yield
}
"#,
        );
        let delegated: Vec<bool> = found.yields.iter().map(|y| delegated_argument(y).is_some()).collect();
        assert_eq!(delegated, vec![false, true, false]);
    }

    fn names_of(source: &str, extract: bool) -> Vec<String> {
        let (bindings, found) = collect(source);
        found
            .yields
            .iter()
            .filter_map(delegated_argument)
            .map(|arg| frame_name(arg, &bindings, &LibraryProfile::default(), extract))
            .collect()
    }

    #[test]
    fn test_frame_name_precedence() {
        let source = r#"
import * as Effect from "effect/Effect"
const getUser = () => Lib.succeed(x)
Effect.gen(function* () {
  yield* getUser()
  yield* service.fetchUser()
  yield* Effect.sleep(10)
  yield* this.repo.users.find()
  yield* program
  yield* factory()()
})
"#;
        assert_eq!(
            names_of(source, true),
            vec!["getUser", "fetchUser", "Effect.sleep", "find", "unknown", "unknown"]
        );
    }

    #[test]
    fn test_frame_name_disabled() {
        let source = r#"
import * as Effect from "effect/Effect"
Effect.gen(function* () {
  yield* getUser()
  yield* service.fetchUser()
})
"#;
        assert_eq!(names_of(source, false), vec!["effect", "effect"]);
    }

    #[test]
    fn test_module_call_pattern() {
        let (_, found) = collect("Layer.succeed(Tag, value)\nlayer.succeed(Tag, value)\n");
        let aliases: HashSet<String> = ["Layer".to_string()].into_iter().collect();
        let pattern = PatternMatcher::module_call(&aliases);
        let matched: Vec<bool> = found.calls.iter().map(|c| pattern.matches(c)).collect();
        assert_eq!(matched, vec![true, false]);
    }
}
