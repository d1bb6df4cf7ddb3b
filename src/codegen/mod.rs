mod assembly;
mod codegen;
mod instruction;
mod machine;
mod trace;

pub use assembly::*;
pub use codegen::*;
pub use instruction::*;
pub use machine::*;
pub use trace::*;
