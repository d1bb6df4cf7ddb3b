mod ast;
mod parser;
mod printer;

pub use ast::*;
pub use parser::*;
pub use printer::print_tree;
