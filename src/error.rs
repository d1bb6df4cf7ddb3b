use thiserror::Error;

use crate::analyzer::Diagnostic;
use crate::codegen::CodegenError;
use crate::interpreter::InterpretError;
use crate::lexer::LexError;
use crate::parser::ParseError;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("semantic analysis failed:{}", list(.0))]
    Semantic(Vec<Diagnostic>),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error(transparent)]
    Interpret(#[from] InterpretError),
}

fn list(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("\n  - {}", d))
        .collect()
}
