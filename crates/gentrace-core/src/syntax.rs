/*!
# Syntax Boundary

Parsing and code generation through `swc_core`. The engine never touches
source text directly: it receives a [`ParsedUnit`] from [`parse`] and hands
the mutated tree back to [`emit`].
*/

use swc_core::common::comments::SingleThreadedComments;
use swc_core::common::source_map::DefaultSourceMapGenConfig;
use swc_core::common::sync::Lrc;
use swc_core::common::{BytePos, FileName, Globals, SourceMap, GLOBALS};
use swc_core::ecma::ast::{EsVersion, Module};
use swc_core::ecma::codegen::text_writer::JsWriter;
use swc_core::ecma::codegen::{Config, Emitter};
use swc_core::ecma::parser::{parse_file_as_module, EsSyntax, Syntax, TsSyntax};
use tracing::debug;

use crate::{Result, TraceError};

/// A parsed source file owned by one invocation
pub struct ParsedUnit {
    pub module: Module,
    pub comments: SingleThreadedComments,
    pub source_map: Lrc<SourceMap>,
}

/// 1-based line, 0-based column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// Run `f` with a fresh set of swc globals scoped to the call
pub fn with_globals<R>(f: impl FnOnce() -> R) -> R {
    GLOBALS.set(&Globals::new(), f)
}

/// Pick parser syntax from the file identifier's extension
pub fn syntax_for(file_id: &str) -> Syntax {
    let (path, query) = file_id.split_once('?').unwrap_or((file_id, ""));
    // Single-file components announce their script language as `lang.ts`.
    let extension = query
        .split('&')
        .find_map(|param| param.strip_prefix("lang."))
        .unwrap_or_else(|| path.rsplit('.').next().unwrap_or(""))
        .to_ascii_lowercase();

    match extension.as_str() {
        "ts" | "mts" | "cts" => Syntax::Typescript(TsSyntax {
            decorators: true,
            ..Default::default()
        }),
        "tsx" => Syntax::Typescript(TsSyntax {
            tsx: true,
            decorators: true,
            ..Default::default()
        }),
        _ => Syntax::Es(EsSyntax {
            jsx: true,
            decorators: true,
            ..Default::default()
        }),
    }
}

/// Parse a module. Any syntax error, recovered or not, yields `None`.
pub fn parse(source: &str, file_id: &str) -> Option<ParsedUnit> {
    let source_map: Lrc<SourceMap> = Default::default();
    let file = source_map.new_source_file(
        FileName::Custom(file_id.to_string()).into(),
        source.to_string(),
    );
    let comments = SingleThreadedComments::default();
    let mut recovered = Vec::new();

    let parsed = parse_file_as_module(
        &file,
        syntax_for(file_id),
        EsVersion::latest(),
        Some(&comments),
        &mut recovered,
    );

    match parsed {
        Ok(module) if recovered.is_empty() => Some(ParsedUnit {
            module,
            comments,
            source_map,
        }),
        Ok(_) => {
            debug!(file = file_id, errors = recovered.len(), "recovered syntax errors, skipping");
            None
        }
        Err(error) => {
            debug!(file = file_id, error = ?error.kind(), "parse failure, skipping");
            None
        }
    }
}

/// Look up the source location of a byte position
pub fn location_of(source_map: &SourceMap, pos: BytePos) -> Location {
    let loc = source_map.lookup_char_pos(pos);
    Location {
        line: loc.line,
        column: loc.col.0,
    }
}

/// Generate code (and optionally a JSON source map) for a unit
pub fn emit(unit: &ParsedUnit, with_map: bool) -> Result<(String, Option<String>)> {
    let mut code = Vec::new();
    let mut mappings = Vec::new();

    {
        let writer = JsWriter::new(
            unit.source_map.clone(),
            "\n",
            &mut code,
            if with_map { Some(&mut mappings) } else { None },
        );
        let mut emitter = Emitter {
            cfg: Config::default().with_target(EsVersion::latest()),
            cm: unit.source_map.clone(),
            comments: Some(&unit.comments),
            wr: writer,
        };
        emitter
            .emit_module(&unit.module)
            .map_err(|e| TraceError::Emit(e.to_string()))?;
    }

    let code = String::from_utf8(code).map_err(|e| TraceError::Emit(e.to_string()))?;

    let map = if with_map {
        let source_map =
            unit.source_map
                .build_source_map_with_config(&mappings, None, DefaultSourceMapGenConfig);
        let mut json = Vec::new();
        source_map
            .to_writer(&mut json)
            .map_err(|e| TraceError::Emit(e.to_string()))?;
        Some(String::from_utf8(json).map_err(|e| TraceError::Emit(e.to_string()))?)
    } else {
        None
    };

    Ok((code, map))
}
