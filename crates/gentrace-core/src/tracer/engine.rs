/*!
# Tracer - Transformation Engine

Runs the enabled rules over one source file. Every call to
[`Tracer::transform`] owns its own syntax tree, frame registry and
statistics, so a single `Tracer` can be shared across threads.
*/

use std::time::Instant;

use tracing::{debug, trace};

use super::bindings::EffectBindings;
use super::pure_calls::PureCallAnnotator;
use super::rules::{RuleStats, TransformationRule};
use super::source_trace::StackFrameInstrumentation;
use super::spans::SpanInstrumentation;
use super::TransformationContext;
use crate::config::TransformOptions;
use crate::syntax::{self, with_globals};
use crate::{Result, TraceError};

/// Result of transforming one file
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub code: String,
    /// JSON source map, present only for transformed output
    pub map: Option<String>,
    /// `false` means `code` is the input, byte for byte
    pub transformed: bool,
    pub stats: Vec<RuleStats>,
}

impl TransformOutput {
    fn unchanged(source: &str, stats: Vec<RuleStats>) -> Self {
        Self {
            code: source.to_string(),
            map: None,
            transformed: false,
            stats,
        }
    }
}

/// Transformation engine for one configuration
pub struct Tracer {
    options: TransformOptions,
    rules: Vec<Box<dyn TransformationRule>>,
}

impl Tracer {
    /// Build the engine, compiling the span policy up front
    pub fn new(options: TransformOptions) -> Result<Self> {
        let mut tracer = Self {
            rules: Vec::new(),
            options,
        };

        if tracer.options.spans.enabled {
            let spans = SpanInstrumentation::new(&tracer.options.spans)?;
            tracer.add_rule(Box::new(spans));
        }
        if tracer.options.source_trace {
            tracer.add_rule(Box::new(StackFrameInstrumentation::new()));
        }
        if tracer.options.pure_calls.enabled {
            tracer.add_rule(Box::new(PureCallAnnotator::new()));
        }
        tracer.sort_rules_by_priority();

        Ok(tracer)
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Add a transformation rule
    pub fn add_rule(&mut self, rule: Box<dyn TransformationRule>) {
        self.rules.push(rule);
    }

    /// Sort rules by priority (higher priority first)
    pub fn sort_rules_by_priority(&mut self) {
        self.rules.sort_by_key(|rule| std::cmp::Reverse(rule.priority()));
    }

    /// Names of the active rules, in execution order
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Transform one source file.
    ///
    /// Unparseable input and files without an import of the effect library
    /// come back unchanged with `transformed == false`.
    pub fn transform(&self, source: &str, file_id: &str) -> Result<TransformOutput> {
        if self.rules.is_empty() {
            return Ok(TransformOutput::unchanged(source, Vec::new()));
        }

        with_globals(|| {
            let Some(mut unit) = syntax::parse(source, file_id) else {
                return Ok(TransformOutput::unchanged(source, Vec::new()));
            };

            let bindings = EffectBindings::resolve(&unit.module, &self.options.library);
            if bindings.is_empty() {
                debug!(file = file_id, "no effect import found");
            }

            let mut stats = Vec::with_capacity(self.rules.len());
            let mut changed = false;
            {
                let context = TransformationContext {
                    file_id,
                    options: &self.options,
                    bindings: &bindings,
                    source_map: unit.source_map.clone(),
                    comments: &unit.comments,
                };

                for rule in &self.rules {
                    let mut rule_stats = RuleStats::new(rule.name().to_string());
                    if rule.matches(&unit.module, &context) {
                        let start_time = Instant::now();
                        rule_stats.applications += 1;

                        let rule_changed = rule
                            .transform(&mut unit.module, &context)
                            .map_err(|source| TraceError::Rule {
                                rule: rule.name(),
                                source,
                            })?;
                        if rule_changed {
                            rule_stats.transformations += 1;
                            changed = true;
                        }

                        rule_stats.total_time_us += start_time.elapsed().as_micros() as u64;
                        trace!(rule = rule.name(), changed = rule_changed, "rule applied");
                    }
                    stats.push(rule_stats);
                }
            }

            if !changed {
                return Ok(TransformOutput::unchanged(source, stats));
            }

            let (code, map) = syntax::emit(&unit, self.options.source_maps)?;
            Ok(TransformOutput {
                code,
                map,
                transformed: true,
                stats,
            })
        })
    }
}

/// One-shot transformation with a freshly built engine
pub fn transform(source: &str, file_id: &str, options: &TransformOptions) -> Result<TransformOutput> {
    Tracer::new(options.clone())?.transform(source, file_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpanOptions;

    const PROGRAM: &str = r#"import * as Effect from "effect/Effect"

const program = Effect.gen(function* () {
  const user = yield* getUser()
  return user
})
"#;

    #[test]
    fn test_rule_order() {
        let tracer = Tracer::new(TransformOptions {
            spans: SpanOptions {
                enabled: true,
                ..Default::default()
            },
            pure_calls: crate::config::PureCallOptions {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            tracer.rule_names(),
            vec!["SpanInstrumentation", "StackFrameInstrumentation", "PureCallAnnotator"]
        );
    }

    #[test]
    fn test_no_rules_returns_input() {
        let tracer = Tracer::new(TransformOptions {
            source_trace: false,
            ..Default::default()
        })
        .unwrap();
        assert!(tracer.rule_names().is_empty());
        let output = tracer.transform(PROGRAM, "main.ts").unwrap();
        assert!(!output.transformed);
        assert_eq!(output.code, PROGRAM);
    }

    #[test]
    fn test_transform_collects_stats_and_map() {
        let output = transform(PROGRAM, "main.ts", &TransformOptions::default()).unwrap();
        assert!(output.transformed);
        assert!(output.code.contains("const _sf0 = {"));
        assert!(output.map.is_some());
        assert_eq!(output.stats.len(), 1);
        assert_eq!(output.stats[0].rule_name, "StackFrameInstrumentation");
        assert_eq!(output.stats[0].transformations, 1);
    }

    #[test]
    fn test_source_maps_can_be_disabled() {
        let options = TransformOptions {
            source_maps: false,
            ..Default::default()
        };
        let output = transform(PROGRAM, "main.ts", &options).unwrap();
        assert!(output.transformed);
        assert!(output.map.is_none());
    }

    #[test]
    fn test_parse_failure_returns_input() {
        let source = "import * as Effect from \"effect/Effect\"\nconst = yield* (\n";
        let output = transform(source, "broken.ts", &TransformOptions::default()).unwrap();
        assert!(!output.transformed);
        assert_eq!(output.code, source);
    }
}
