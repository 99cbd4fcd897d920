/*!
# Transformation Rules

Core trait and bookkeeping for the passes run by the engine.
*/

use swc_core::ecma::ast::Module;

use super::{TransformResult, TransformationContext};

/// Core trait for transformation rules
///
/// A rule inspects the whole module and mutates it in place. Rules keep no
/// state between invocations: everything an invocation needs lives in the
/// context or in locals of `transform`.
pub trait TransformationRule: Send + Sync {
    /// Human-readable name for this rule
    fn name(&self) -> &'static str;

    /// Detailed description of what this rule does
    fn description(&self) -> &'static str;

    /// Priority for rule ordering (higher priority runs first)
    fn priority(&self) -> u32 {
        100
    }

    /// Check if this rule applies to the module at all
    fn matches(&self, module: &Module, context: &TransformationContext) -> bool;

    /// Apply the transformation, returning whether the module changed
    fn transform(&self, module: &mut Module, context: &TransformationContext) -> TransformResult<bool>;
}

/// Rule execution statistics for one invocation
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RuleStats {
    pub rule_name: String,
    pub applications: u64,
    pub transformations: u64,
    pub total_time_us: u64,
}

impl RuleStats {
    pub fn new(rule_name: String) -> Self {
        Self {
            rule_name,
            applications: 0,
            transformations: 0,
            total_time_us: 0,
        }
    }

    pub fn merge(&mut self, other: &RuleStats) {
        self.applications += other.applications;
        self.transformations += other.transformations;
        self.total_time_us += other.total_time_us;
    }

    pub fn success_rate(&self) -> f64 {
        if self.applications == 0 {
            0.0
        } else {
            (self.transformations as f64) / (self.applications as f64)
        }
    }
}
