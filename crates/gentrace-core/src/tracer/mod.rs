/*!
# Tracer - Effect Instrumentation Engine

A rule-based rewriting engine for programs written against a generator-based
effect library. Each invocation parses one source file, resolves how the
library is imported, applies the enabled rules to the syntax tree and emits
the result.

## Architecture

- `TransformationRule`: Trait implemented by every pass
- `Tracer`: Core engine, owns the compiled rules for one configuration
- `FileTracer`: Directory runs on top of `Tracer`
- `bindings`: Import resolution and import insertion
- `patterns`: Call and delegation matchers, frame name extraction
- Rules: `SpanInstrumentation`, `StackFrameInstrumentation`, `PureCallAnnotator`

## Example Usage

```rust,no_run
use gentrace_core::{Tracer, TransformOptions};

let tracer = Tracer::new(TransformOptions::default())?;
let output = tracer.transform("import * as Effect from \"effect/Effect\"", "src/main.ts")?;
assert!(!output.transformed);
# Ok::<(), gentrace_core::TraceError>(())
```
*/

pub mod bindings;
pub mod builders;
pub mod delegation;
pub mod engine;
pub mod file_tracer;
pub mod frames;
pub mod patterns;
pub mod policy;
pub mod pure_calls;
pub mod rules;
pub mod source_trace;
pub mod spans;

use swc_core::common::comments::SingleThreadedComments;
use swc_core::common::sync::Lrc;
use swc_core::common::{SourceMap, Span};

use crate::config::TransformOptions;
use crate::syntax::{self, Location};

// Re-export main types
pub use bindings::EffectBindings;
pub use engine::{transform, Tracer, TransformOutput};
pub use file_tracer::{FileTracer, FileTransformationSummary};
pub use patterns::{CallPattern, PatternMatcher};
pub use rules::{RuleStats, TransformationRule};

// Common result type for transformations
pub type TransformResult<T> = anyhow::Result<T>;

/// Read-only view of one invocation shared by every rule
pub struct TransformationContext<'a> {
    pub file_id: &'a str,
    pub options: &'a TransformOptions,
    pub bindings: &'a EffectBindings,
    pub source_map: Lrc<SourceMap>,
    pub comments: &'a SingleThreadedComments,
}

impl TransformationContext<'_> {
    pub fn location(&self, span: Span) -> Location {
        syntax::location_of(&self.source_map, span.lo)
    }

    /// File identifier without a bundler query (`App.vue?vue&type=script`)
    pub fn source_path(&self) -> &str {
        self.file_id.split('?').next().unwrap_or(self.file_id)
    }

    /// `file:line:column` key identifying a source position
    pub fn location_key(&self, span: Span) -> String {
        let location = self.location(span);
        format!("{}:{}:{}", self.source_path(), location.line, location.column)
    }
}
