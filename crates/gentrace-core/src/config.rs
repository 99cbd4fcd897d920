/*!
# Configuration

Options accepted by the engine for one invocation, plus the file-level
configuration used by the CLI and the plugin factory. Every struct decodes
from camelCase JSON and falls back to its `Default` for missing keys.
*/

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{Result, TraceError};

/// Name used for a frame when name extraction is disabled
pub const FALLBACK_FRAME_NAME: &str = "effect";

/// Name used for a frame whose delegation argument has no recognizable shape
pub const UNKNOWN_FRAME_NAME: &str = "unknown";

/// Options for a single transformation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransformOptions {
    /// Hoist stack frames and rewrite `yield*` delegations
    pub source_trace: bool,
    /// Derive frame names from the delegated call
    pub extract_function_name: bool,
    /// Span instrumentation
    pub spans: SpanOptions,
    /// `#__PURE__` annotations for allow-listed module calls
    pub pure_calls: PureCallOptions,
    /// Produce a source map alongside transformed code
    pub source_maps: bool,
    /// Module and export names of the target library
    pub library: LibraryProfile,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            source_trace: true,
            extract_function_name: true,
            spans: SpanOptions::default(),
            pure_calls: PureCallOptions::default(),
            source_maps: true,
            library: LibraryProfile::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpanOptions {
    pub enabled: bool,
    /// When non-empty, only these combinators are instrumentable
    pub include: Vec<Combinator>,
    pub exclude: Vec<Combinator>,
    pub name_format: NameFormat,
    pub strategy: Option<SpanStrategy>,
}

impl SpanOptions {
    /// Whether a combinator survives the include/exclude name lists
    pub fn allows(&self, combinator: Combinator) -> bool {
        if !self.include.is_empty() && !self.include.contains(&combinator) {
            return false;
        }
        !self.exclude.contains(&combinator)
    }
}

/// Rendering of span names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameFormat {
    /// `Effect.all (program)`
    #[default]
    Function,
    /// `Effect.all (src/main.ts:12)`
    Location,
    /// `Effect.all (program @ src/main.ts:12)`
    Full,
}

/// Span inclusion policy; exactly one kind is active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SpanStrategy {
    Depth(DepthPolicy),
    Override(OverridePolicy),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DepthPolicy {
    #[serde(rename = "maxDepth", alias = "globalMaxDepth")]
    pub global_max_depth: Option<usize>,
    pub per_combinator_max_depth: IndexMap<Combinator, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverridePolicy {
    pub rules: IndexMap<Combinator, RuleFilter>,
}

/// Per-combinator filter. File patterns are globs, function patterns regexes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuleFilter {
    pub include_files: Option<Vec<String>>,
    pub exclude_files: Option<Vec<String>>,
    pub include_functions: Option<Vec<String>>,
    pub exclude_functions: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PureCallOptions {
    pub enabled: bool,
    /// Library modules whose functions are free of side effects
    pub modules: Vec<String>,
}

impl Default for PureCallOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            modules: [
                "Context", "Data", "Duration", "Layer", "Option", "Either", "Schema", "Schedule",
                "Chunk", "HashMap", "HashSet", "List",
            ]
            .iter()
            .map(|m| m.to_string())
            .collect(),
        }
    }
}

/// Where the effect library lives and what its exports are called
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LibraryProfile {
    /// Barrel module re-exporting every namespace (`import { Effect } from "effect"`)
    pub barrel_module: String,
    /// Modules importable as the effect namespace (`import * as Effect from "effect/Effect"`)
    pub namespace_modules: Vec<String>,
    /// Namespace export name inside the barrel module
    pub namespace_export: String,
    /// Generator combinator export
    pub gen_export: String,
    /// Module holding the current stack frame reference
    pub registry_module: String,
    pub registry_key: String,
    /// Combinator updating a context reference for a sub-computation
    pub update_combinator: String,
    /// Combinator wrapping a computation in a tracing span
    pub span_combinator: String,
}

impl Default for LibraryProfile {
    fn default() -> Self {
        Self {
            barrel_module: "effect".to_string(),
            namespace_modules: vec!["effect/Effect".to_string()],
            namespace_export: "Effect".to_string(),
            gen_export: "gen".to_string(),
            registry_module: "effect/References".to_string(),
            registry_key: "CurrentStackFrame".to_string(),
            update_combinator: "updateService".to_string(),
            span_combinator: "withSpan".to_string(),
        }
    }
}

impl LibraryProfile {
    /// Module used when an import of an effect export has to be inserted
    pub fn primary_namespace_module(&self) -> &str {
        self.namespace_modules
            .first()
            .map(String::as_str)
            .unwrap_or(self.barrel_module.as_str())
    }

    /// Submodule path of a namespace under the barrel, e.g. `effect/Layer`
    pub fn submodule(&self, name: &str) -> String {
        format!("{}/{}", self.barrel_module, name)
    }
}

/// The closed set of combinators eligible for span instrumentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Combinator {
    Gen,
    Fork,
    ForkDaemon,
    ForkScoped,
    ForkIn,
    All,
    ForEach,
    Filter,
    Reduce,
    Loop,
}

impl Combinator {
    pub const ALL: [Combinator; 10] = [
        Combinator::Gen,
        Combinator::Fork,
        Combinator::ForkDaemon,
        Combinator::ForkScoped,
        Combinator::ForkIn,
        Combinator::All,
        Combinator::ForEach,
        Combinator::Filter,
        Combinator::Reduce,
        Combinator::Loop,
    ];

    /// Member name as written after the namespace
    pub fn as_str(&self) -> &'static str {
        match self {
            Combinator::Gen => "gen",
            Combinator::Fork => "fork",
            Combinator::ForkDaemon => "forkDaemon",
            Combinator::ForkScoped => "forkScoped",
            Combinator::ForkIn => "forkIn",
            Combinator::All => "all",
            Combinator::ForEach => "forEach",
            Combinator::Filter => "filter",
            Combinator::Reduce => "reduce",
            Combinator::Loop => "loop",
        }
    }

    pub fn from_member(member: &str) -> Option<Combinator> {
        Self::ALL.iter().copied().find(|c| c.as_str() == member)
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File-level configuration: engine options plus the file filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GentraceConfig {
    pub options: TransformOptions,
    /// Glob patterns, or regexes written as `/.../`
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for GentraceConfig {
    fn default() -> Self {
        Self {
            options: TransformOptions::default(),
            include: vec!["**/*.{js,jsx,mjs,cjs,ts,tsx,mts,cts,vue,svelte}".to_string()],
            exclude: vec!["**/node_modules/**".to_string()],
        }
    }
}

impl GentraceConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TraceError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }
}
