/*!
# Delegation Rewriter

Replaces the argument `E` of every recorded `yield*` with

```text
update(E, <registry>.CurrentStackFrame, (parent) => ({ ..._sfN, parent }))
```

The parent comes from whatever frame is current when `E` runs, so a
generator shared between call sites reports the ancestry of its actual
caller. The hoisted frame itself is never mutated.
*/

use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};
use tracing::trace;

use super::bindings::RegistryRef;
use super::builders;
use super::frames::{FrameRegistry, StackFrameRecord};
use super::patterns;
use super::TransformationContext;

pub struct DelegationRewriter<'a, 'ctx> {
    context: &'a TransformationContext<'ctx>,
    registry: &'a FrameRegistry,
    /// `Effect.updateService` or a directly imported `updateService`
    update: Expr,
    /// `References.CurrentStackFrame` or a directly imported `CurrentStackFrame`
    current_frame: Expr,
    rewritten: usize,
}

impl<'a, 'ctx> DelegationRewriter<'a, 'ctx> {
    pub fn new(
        context: &'a TransformationContext<'ctx>,
        registry: &'a FrameRegistry,
        update: Expr,
        registry_ref: &RegistryRef,
    ) -> Self {
        Self {
            context,
            registry,
            update,
            current_frame: registry_ref.current_frame(&context.options.library.registry_key),
            rewritten: 0,
        }
    }

    /// Rewrite every recorded delegation in the module
    pub fn rewrite(mut self, module: &mut Module) -> usize {
        module.visit_mut_with(&mut self);
        self.rewritten
    }

    fn linked_call(&self, arg: Expr, record: &StackFrameRecord) -> Expr {
        let frame = builders::paren(builders::object(vec![
            PropOrSpread::Spread(SpreadElement {
                dot3_token: DUMMY_SP,
                expr: Box::new(builders::ident_expr(&record.synthetic_id)),
            }),
            PropOrSpread::Prop(Box::new(Prop::Shorthand(builders::ident("parent")))),
        ]));

        builders::call(
            self.update.clone(),
            vec![arg, self.current_frame.clone(), builders::arrow(&["parent"], frame)],
        )
    }
}

impl VisitMut for DelegationRewriter<'_, '_> {
    fn visit_mut_yield_expr(&mut self, expr: &mut YieldExpr) {
        expr.visit_mut_children_with(self);

        if patterns::delegated_argument(expr).is_none() {
            return;
        }

        let key = self.context.location_key(expr.span);
        let Some(record) = self.registry.get(&key) else {
            trace!(location = %key, "no frame recorded for delegation, leaving it untouched");
            return;
        };

        if let Some(arg) = expr.arg.take() {
            expr.arg = Some(Box::new(self.linked_call(*arg, record)));
            self.rewritten += 1;
        }
    }
}
