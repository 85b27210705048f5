//! JavaScript linting and bundling on top of `oxc`.
//!
//! Each source file goes through its own pipeline before concatenation:
//!
//! ```text
//! parse ─→ semantic ─→ transform (ES2015) ─→ minify ─→ codegen
//!                      (optional)            (dist)    (+ source map in dev)
//! ```
//!
//! Per-file source maps are joined with their line offsets into one map for
//! the bundle, appended as an inline data URL. Bundles that are neither
//! transpiled nor minified skip the pipeline and are copied verbatim.

use crate::sources::SourceFile;
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions};
use oxc::diagnostics::OxcDiagnostic;
use oxc::minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::semantic::SemanticBuilder;
use oxc_sourcemap::{ConcatSourceMapBuilder, SourceMap};
use oxc::span::SourceType;
use oxc::transformer::{TransformOptions, Transformer};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Transpilation target for every transformed bundle.
pub const TRANSPILE_TARGET: &str = "es2015";

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}", first_message(.0))]
    Syntax(Vec<ScriptDiagnostic>),
    #[error("Failed to transpile {file}: {message}")]
    Transform { file: PathBuf, message: String },
    #[error("Invalid transpile target: {0}")]
    Target(String),
}

fn first_message(diagnostics: &[ScriptDiagnostic]) -> String {
    match diagnostics {
        [] => "syntax error".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (+{} more)", rest.len()),
    }
}

/// A lint or parse finding, located by 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDiagnostic {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for ScriptDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file.display(),
            self.line,
            self.column,
            self.message
        )
    }
}

fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rfind('\n')
        .map_or(before.chars().count(), |nl| before[nl + 1..].chars().count())
        + 1;
    (line, column)
}

fn to_diagnostics(file: &Path, source: &str, errors: &[OxcDiagnostic]) -> Vec<ScriptDiagnostic> {
    errors
        .iter()
        .map(|error| {
            let offset = error
                .labels
                .as_ref()
                .and_then(|labels| labels.first())
                .map_or(0, |label| label.offset());
            let (line, column) = line_col(source, offset);
            ScriptDiagnostic {
                file: file.to_path_buf(),
                line,
                column,
                message: error.message.to_string(),
            }
        })
        .collect()
}

fn read(path: &Path) -> Result<String, ScriptError> {
    std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Syntax and semantic findings for one script. An empty list means clean.
pub fn lint_source(file: &Path, source: &str) -> Vec<ScriptDiagnostic> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::cjs()).parse();
    if !parsed.errors.is_empty() {
        return to_diagnostics(file, source, &parsed.errors);
    }
    let semantic = SemanticBuilder::new()
        .with_check_syntax_error(true)
        .build(&parsed.program);
    to_diagnostics(file, source, &semantic.errors)
}

pub fn lint_file(path: &Path) -> Result<Vec<ScriptDiagnostic>, ScriptError> {
    let source = read(path)?;
    Ok(lint_source(path, &source))
}

/// How a bundle's sources are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleOptions {
    pub transpile: bool,
    pub minify: bool,
    pub source_map: bool,
}

struct Chunk {
    code: String,
    map: Option<SourceMap>,
}

fn compile(
    file: &Path,
    map_path: &Path,
    source: &str,
    options: &BundleOptions,
    transform: Option<&TransformOptions>,
) -> Result<Chunk, ScriptError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::cjs()).parse();
    if !parsed.errors.is_empty() || parsed.panicked {
        return Err(ScriptError::Syntax(to_diagnostics(
            file,
            source,
            &parsed.errors,
        )));
    }
    let mut program = parsed.program;

    if let Some(transform) = transform {
        let scoping = SemanticBuilder::new()
            .build(&program)
            .semantic
            .into_scoping();
        let transformed = Transformer::new(&allocator, file, transform)
            .build_with_scoping(scoping, &mut program);
        if let Some(error) = transformed.errors.first() {
            return Err(ScriptError::Transform {
                file: file.to_path_buf(),
                message: error.message.to_string(),
            });
        }
    }

    let scoping = if options.minify {
        let minifier = Minifier::new(MinifierOptions {
            mangle: Some(MangleOptions::default()),
            compress: Some(CompressOptions::default()),
        });
        minifier.build(&allocator, &mut program).scoping
    } else {
        None
    };

    let codegen = Codegen::new()
        .with_options(CodegenOptions {
            minify: options.minify,
            source_map_path: options.source_map.then(|| map_path.to_path_buf()),
            ..CodegenOptions::default()
        })
        .with_scoping(scoping)
        .build(&program);

    Ok(Chunk {
        code: codegen.code,
        map: codegen.map,
    })
}

/// Raw concatenation in source order, each file newline-terminated.
fn concat_raw(sources: &[SourceFile]) -> Result<String, ScriptError> {
    let mut bundle = String::new();
    for source_file in sources {
        let source = read(&source_file.path)?;
        bundle.push_str(&source);
        if !source.is_empty() && !source.ends_with('\n') {
            bundle.push('\n');
        }
    }
    Ok(bundle)
}

/// Concatenate and compile `sources` into one bundle.
///
/// Files are processed in the given order; the first failing file aborts the
/// bundle. Source map entries use each file's `relative` path. A bundle that
/// is neither transpiled nor minified is plain concatenation: nothing is
/// parsed and no map is written.
pub fn build_bundle(sources: &[SourceFile], options: &BundleOptions) -> Result<String, ScriptError> {
    if !options.transpile && !options.minify {
        return concat_raw(sources);
    }

    let transform = if options.transpile {
        Some(TransformOptions::from_target(TRANSPILE_TARGET).map_err(ScriptError::Target)?)
    } else {
        None
    };

    let mut bundle = String::new();
    let mut maps: Vec<(SourceMap, u32)> = Vec::new();
    let mut line_offset: u32 = 0;

    for source_file in sources {
        let source = read(&source_file.path)?;
        let chunk = compile(
            &source_file.path,
            &source_file.relative,
            &source,
            options,
            transform.as_ref(),
        )?;

        let mut code = chunk.code;
        if options.minify && !code.trim_end().ends_with(';') && !code.trim().is_empty() {
            code.push(';');
        }
        if !code.ends_with('\n') {
            code.push('\n');
        }
        if let Some(map) = chunk.map {
            maps.push((map, line_offset));
        }
        line_offset += code.matches('\n').count() as u32;
        bundle.push_str(&code);
    }

    if options.source_map && !maps.is_empty() {
        let refs: Vec<(&SourceMap, u32)> = maps.iter().map(|(m, o)| (m, *o)).collect();
        let joined = ConcatSourceMapBuilder::from_sourcemaps(&refs).into_sourcemap();
        bundle.push_str("//# sourceMappingURL=");
        bundle.push_str(&joined.to_data_url());
        bundle.push('\n');
    }

    Ok(bundle)
}
