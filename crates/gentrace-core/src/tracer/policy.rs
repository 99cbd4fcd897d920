/*!
# Span Policy Evaluation

A [`SpanStrategy`] is compiled once per configuration into a
[`CompiledPolicy`]; malformed globs and regexes are reported at that point
instead of silently matching nothing.
*/

use std::collections::HashMap;

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;

use crate::config::{Combinator, RuleFilter, SpanStrategy};
use crate::{Result, TraceError};

/// One matched combinator call, as seen by the policy
#[derive(Debug, Clone, Copy)]
pub struct SpanCandidate<'a> {
    pub combinator: Combinator,
    /// Number of matched calls strictly enclosing this one
    pub depth: usize,
    pub file: &'a str,
    /// Name of the nearest enclosing binding
    pub function: Option<&'a str>,
}

#[derive(Debug)]
pub enum CompiledPolicy {
    AcceptAll,
    Depth {
        global: Option<usize>,
        per_combinator: HashMap<Combinator, usize>,
    },
    Override {
        rules: HashMap<Combinator, CompiledRule>,
    },
}

impl CompiledPolicy {
    pub fn compile(strategy: Option<&SpanStrategy>) -> Result<Self> {
        Ok(match strategy {
            None => CompiledPolicy::AcceptAll,
            Some(SpanStrategy::Depth(policy)) => CompiledPolicy::Depth {
                global: policy.global_max_depth,
                per_combinator: policy
                    .per_combinator_max_depth
                    .iter()
                    .map(|(combinator, depth)| (*combinator, *depth))
                    .collect(),
            },
            Some(SpanStrategy::Override(policy)) => CompiledPolicy::Override {
                rules: policy
                    .rules
                    .iter()
                    .map(|(combinator, filter)| Ok((*combinator, CompiledRule::compile(filter)?)))
                    .collect::<Result<_>>()?,
            },
        })
    }

    pub fn accepts(&self, candidate: &SpanCandidate) -> bool {
        match self {
            CompiledPolicy::AcceptAll => true,
            CompiledPolicy::Depth { global, per_combinator } => {
                match per_combinator.get(&candidate.combinator).copied().or(*global) {
                    Some(limit) => candidate.depth <= limit,
                    None => true,
                }
            }
            CompiledPolicy::Override { rules } => match rules.get(&candidate.combinator) {
                Some(rule) => rule.accepts(candidate.file, candidate.function),
                None => true,
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct CompiledRule {
    include_files: Option<GlobSet>,
    exclude_files: Option<GlobSet>,
    include_functions: Option<Vec<Regex>>,
    exclude_functions: Option<Vec<Regex>>,
}

impl CompiledRule {
    pub fn compile(filter: &RuleFilter) -> Result<Self> {
        Ok(Self {
            include_files: filter.include_files.as_deref().map(compile_globs).transpose()?,
            exclude_files: filter.exclude_files.as_deref().map(compile_globs).transpose()?,
            include_functions: filter.include_functions.as_deref().map(compile_regexes).transpose()?,
            exclude_functions: filter.exclude_functions.as_deref().map(compile_regexes).transpose()?,
        })
    }

    /// An absent function name never matches a name pattern
    pub fn accepts(&self, file: &str, function: Option<&str>) -> bool {
        if let Some(excluded) = &self.exclude_files {
            if excluded.is_match(file) {
                return false;
            }
        }

        if let Some(excluded) = &self.exclude_functions {
            match function {
                None => return false,
                Some(name) if excluded.iter().any(|re| re.is_match(name)) => return false,
                Some(_) => {}
            }
        }

        if let Some(included) = &self.include_files {
            if !included.is_match(file) {
                return false;
            }
        }

        if let Some(included) = &self.include_functions {
            match function {
                Some(name) if included.iter().any(|re| re.is_match(name)) => {}
                _ => return false,
            }
        }

        true
    }
}

/// Glob in the minimatch sense: `*` stays within one path segment
pub fn compile_glob(pattern: &str) -> Result<Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| TraceError::MalformedPattern {
            pattern: pattern.to_string(),
            reason: e.kind().to_string(),
        })
}

pub fn compile_globs(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(compile_glob(pattern)?);
    }
    builder.build().map_err(|e| TraceError::MalformedPattern {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })
}

pub fn compile_regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| TraceError::MalformedPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn compile_regexes(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| compile_regex(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DepthPolicy, OverridePolicy};
    use indexmap::IndexMap;

    fn candidate<'a>(combinator: Combinator, depth: usize, file: &'a str, function: Option<&'a str>) -> SpanCandidate<'a> {
        SpanCandidate {
            combinator,
            depth,
            file,
            function,
        }
    }

    fn override_policy(combinator: Combinator, filter: RuleFilter) -> CompiledPolicy {
        let mut rules = IndexMap::new();
        rules.insert(combinator, filter);
        CompiledPolicy::compile(Some(&SpanStrategy::Override(OverridePolicy { rules }))).unwrap()
    }

    fn strings(items: &[&str]) -> Option<Vec<String>> {
        Some(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_no_strategy_accepts_everything() {
        let policy = CompiledPolicy::compile(None).unwrap();
        assert!(policy.accepts(&candidate(Combinator::ForEach, 12, "a.ts", None)));
    }

    #[test]
    fn test_depth_limits() {
        let mut per_combinator = IndexMap::new();
        per_combinator.insert(Combinator::Fork, 0);
        let policy = CompiledPolicy::compile(Some(&SpanStrategy::Depth(DepthPolicy {
            global_max_depth: Some(1),
            per_combinator_max_depth: per_combinator,
        })))
        .unwrap();

        assert!(policy.accepts(&candidate(Combinator::Gen, 0, "a.ts", None)));
        assert!(policy.accepts(&candidate(Combinator::All, 1, "a.ts", None)));
        assert!(!policy.accepts(&candidate(Combinator::ForEach, 2, "a.ts", None)));
        assert!(policy.accepts(&candidate(Combinator::Fork, 0, "a.ts", None)));
        assert!(!policy.accepts(&candidate(Combinator::Fork, 1, "a.ts", None)));
    }

    #[test]
    fn test_depth_without_limits_is_unbounded() {
        let policy = CompiledPolicy::compile(Some(&SpanStrategy::Depth(DepthPolicy::default()))).unwrap();
        assert!(policy.accepts(&candidate(Combinator::All, 40, "a.ts", None)));
    }

    #[test]
    fn test_include_files() {
        let policy = override_policy(
            Combinator::Fork,
            RuleFilter {
                include_files: strings(&["src/workers/**"]),
                ..Default::default()
            },
        );
        assert!(!policy.accepts(&candidate(Combinator::Fork, 0, "src/utils/helpers.ts", Some("run"))));
        assert!(policy.accepts(&candidate(Combinator::Fork, 0, "src/workers/task.ts", Some("run"))));
        // No rule for `all`
        assert!(policy.accepts(&candidate(Combinator::All, 0, "src/utils/helpers.ts", None)));
    }

    #[test]
    fn test_exclude_files_wins() {
        let policy = override_policy(
            Combinator::Gen,
            RuleFilter {
                include_files: strings(&["src/**"]),
                exclude_files: strings(&["src/**/*.test.ts"]),
                ..Default::default()
            },
        );
        assert!(!policy.accepts(&candidate(Combinator::Gen, 0, "src/a/b.test.ts", Some("x"))));
        assert!(policy.accepts(&candidate(Combinator::Gen, 0, "src/a/b.ts", Some("x"))));
    }

    #[test]
    fn test_exclude_functions_rejects_anonymous() {
        let policy = override_policy(
            Combinator::Gen,
            RuleFilter {
                exclude_functions: strings(&["^internal"]),
                ..Default::default()
            },
        );
        assert!(!policy.accepts(&candidate(Combinator::Gen, 0, "a.ts", Some("internalLoop"))));
        assert!(!policy.accepts(&candidate(Combinator::Gen, 0, "a.ts", None)));
        assert!(policy.accepts(&candidate(Combinator::Gen, 0, "a.ts", Some("program"))));
    }

    #[test]
    fn test_include_functions_requires_name() {
        let policy = override_policy(
            Combinator::All,
            RuleFilter {
                include_functions: strings(&["^fetch", "Batch$"]),
                ..Default::default()
            },
        );
        assert!(policy.accepts(&candidate(Combinator::All, 0, "a.ts", Some("fetchUsers"))));
        assert!(policy.accepts(&candidate(Combinator::All, 0, "a.ts", Some("loadBatch"))));
        assert!(!policy.accepts(&candidate(Combinator::All, 0, "a.ts", Some("render"))));
        assert!(!policy.accepts(&candidate(Combinator::All, 0, "a.ts", None)));
    }

    #[test]
    fn test_malformed_patterns_are_errors() {
        let bad_regex = CompiledRule::compile(&RuleFilter {
            include_functions: strings(&["(unclosed"]),
            ..Default::default()
        });
        assert!(matches!(
            bad_regex,
            Err(TraceError::MalformedPattern { ref pattern, .. }) if pattern == "(unclosed"
        ));

        let bad_glob = CompiledRule::compile(&RuleFilter {
            include_files: strings(&["src/[workers"]),
            ..Default::default()
        });
        assert!(matches!(bad_glob, Err(TraceError::MalformedPattern { .. })));
    }
}
