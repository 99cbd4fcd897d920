//! # Gentrace Core
//!
//! Ahead-of-time instrumentation for programs built on a generator-based
//! effect library, including:
//! - Import binding resolution for the effect namespace and its registry
//! - Stack-frame hoisting and delegation rewriting (`yield*` sites)
//! - Tracing span insertion driven by a depth or override policy
//! - Pure-call annotation for dead-code elimination
//! - A generic host plugin factory and a directory tracer
//!
//! Parsing and code generation are delegated to `swc_core`; this crate only
//! analyses and mutates the syntax tree between those two boundaries.

#![warn(clippy::all)]

pub mod config;
pub mod filter;
pub mod plugin;
pub mod syntax;
pub mod tracer;

// Re-export commonly used types
pub use config::{
    Combinator, DepthPolicy, GentraceConfig, LibraryProfile, NameFormat, OverridePolicy,
    PureCallOptions, RuleFilter, SpanOptions, SpanStrategy, TransformOptions,
};
pub use filter::FileFilter;
pub use plugin::{create_plugin, Enforce, PluginDescriptor, PluginOutput, TransformCapability};
pub use tracer::{transform, FileTracer, Tracer, TransformOutput};

/// Gentrace version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for gentrace components at the default `info` level
pub fn init_tracing() {
    init_tracing_with("gentrace_core=info");
}

/// Initialize tracing with an explicit default directive.
///
/// `RUST_LOG` still takes precedence when it is set.
pub fn init_tracing_with(default_directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    // A subscriber may already be installed by the host; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Error types for gentrace operations
#[derive(thiserror::Error, Debug)]
pub enum TraceError {
    /// A user supplied glob or regex could not be compiled
    #[error("Malformed pattern `{pattern}`: {reason}")]
    MalformedPattern { pattern: String, reason: String },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A transformation rule failed
    #[error("Rule {rule} failed: {source}")]
    Rule {
        rule: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Code or source map generation failed
    #[error("Emit error: {0}")]
    Emit(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for gentrace operations
pub type Result<T> = std::result::Result<T, TraceError>;
