pub mod analyzer;
pub mod codegen;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod value;

use analyzer::{SemanticVisitor, SymbolTable};
use codegen::{Assembly, Codegen, CodegenOptions};
use interpreter::{Interpreter, Outcome};
use lexer::Lexer;
use parser::{Parser, Program};

pub use error::CompileError;

pub fn parse(user_input: &str) -> Result<Program, CompileError> {
    let tokens = Lexer::tokenize(user_input)?;
    let mut parser = Parser::new(tokens);
    Ok(parser.parse()?)
}

/// Runs semantic analysis, returning the resulting scope tree.
pub fn check(program: &Program) -> Result<SymbolTable, CompileError> {
    let mut visitor = SemanticVisitor::new();
    if !visitor.analyze(program) {
        return Err(CompileError::Semantic(visitor.into_diagnostics()));
    }
    Ok(visitor.into_symbol_table())
}

pub fn compile(user_input: &str, options: CodegenOptions) -> Result<Assembly, CompileError> {
    let program = parse(user_input)?;
    check(&program)?;
    Ok(Codegen::new(options).generate(&program)?)
}

pub fn interpret(user_input: &str, options: CodegenOptions) -> Result<Outcome, CompileError> {
    let program = parse(user_input)?;
    check(&program)?;
    Ok(Interpreter::new(options.max_call_depth).run(&program)?)
}
