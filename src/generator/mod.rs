//! Message description language compiler.
//!
//! Lexer and recursive-descent parser producing an AST, a type registry
//! computing stable type identifiers, and deterministic C++ and Python
//! emitters. The `gen` binary is a thin CLI over [`parse`],
//! [`emit_cpp`] and [`emit_python`].
//!
//! Field properties and `include`/`import` declarations are parsed and
//! preserved in the AST but consumed by no emitter.

pub mod ast;
mod emit_cpp;
mod emit_python;
mod lexer;
pub mod parser;
mod registry;

use thiserror::Error;

pub use emit_cpp::emit_cpp;
pub use emit_python::emit_python;
pub use parser::parse;
pub use registry::{TypeMetadata, TypeRegistry};

/// A description failed to lex or parse.
///
/// Renders as `file (line: L, col: C): message`, the shape compiler
/// diagnostics are expected in.
#[derive(Debug, Clone, Error)]
#[error("{file} (line: {line}, col: {column}): {message}")]
pub struct ParseError {
    file: String,
    line: u32,
    column: u32,
    message: String,
}

impl ParseError {
    /// Create an error at a source position.
    pub fn new(file: &str, line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            file: file.to_string(),
            line,
            column,
            message: message.into(),
        }
    }

    /// Source file the error was found in.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// 1-based line.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 1-based column.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// The bare message, without position.
    pub fn message(&self) -> &str {
        &self.message
    }
}
