//! File filtering for host adapters and directory runs.
//!
//! Patterns written as `/.../` are regular expressions, anything else is a
//! glob. Exclusion always wins over inclusion.

use globset::{GlobSet, GlobSetBuilder};
use regex::Regex;

use crate::tracer::policy::{compile_glob, compile_regex};
use crate::{Result, TraceError};

/// Predicate over file identifiers
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: PatternSet,
    exclude: PatternSet,
}

impl FileFilter {
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        Ok(Self {
            include: PatternSet::compile(include)?,
            exclude: PatternSet::compile(exclude)?,
        })
    }

    /// Accepts every identifier
    pub fn accept_all() -> Self {
        Self {
            include: PatternSet::default(),
            exclude: PatternSet::default(),
        }
    }

    /// Whether the engine should see this file. Query strings added by
    /// bundlers (`App.vue?vue&type=script`) are ignored.
    pub fn should_process(&self, id: &str) -> bool {
        let normalized = id.replace('\\', "/");
        let path = normalized.split('?').next().unwrap_or_default();

        if self.exclude.is_match(path) {
            return false;
        }
        self.include.is_empty() || self.include.is_match(path)
    }
}

#[derive(Debug, Clone, Default)]
struct PatternSet {
    globs: Option<GlobSet>,
    regexes: Vec<Regex>,
}

impl PatternSet {
    fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut globs = GlobSetBuilder::new();
        let mut glob_count = 0;
        let mut regexes = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            match regex_body(pattern) {
                Some(body) => regexes.push(compile_regex(body)?),
                None => {
                    globs.add(compile_glob(pattern)?);
                    glob_count += 1;
                }
            }
        }

        let globs = if glob_count > 0 {
            Some(globs.build().map_err(|e| TraceError::MalformedPattern {
                pattern: format!("{} glob(s)", glob_count),
                reason: e.to_string(),
            })?)
        } else {
            None
        };

        Ok(Self { globs, regexes })
    }

    fn is_empty(&self) -> bool {
        self.globs.is_none() && self.regexes.is_empty()
    }

    fn is_match(&self, path: &str) -> bool {
        self.globs.as_ref().is_some_and(|globs| globs.is_match(path))
            || self.regexes.iter().any(|re| re.is_match(path))
    }
}

fn regex_body(pattern: &str) -> Option<&str> {
    pattern
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
        .filter(|body| !body.is_empty())
}
