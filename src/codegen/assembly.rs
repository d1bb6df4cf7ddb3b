use std::fmt;

use crate::analyzer::{SymbolTable, Ty};

use super::{render_line, Instruction, Machine, Reg, Trace};

const RULE: &str = "============================================================";

/// Generated listing together with the simulated run that produced its trace.
#[derive(Clone, Debug)]
pub struct Assembly {
    pub return_type: Ty,
    pub lines: Vec<Instruction>,
    pub trace: Trace,
    pub machine: Machine,
    /// Scopes and stack slots as laid out during generation.
    pub symbol_table: SymbolTable,
}

impl Assembly {
    /// The instruction listing alone.
    pub fn code(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&render_line(line));
            out.push('\n');
        }
        out
    }

    pub fn render_trace(&self) -> String {
        self.trace.render()
    }

    /// Value left in the accumulator when `main` finished.
    pub fn return_value(&self) -> i64 {
        self.machine.get(Reg::Rax)
    }

    pub fn variable(&self, name: &str) -> Option<i64> {
        self.machine.variable(name)
    }

    pub fn contains(&self, instr: &Instruction) -> bool {
        self.lines.contains(instr)
    }
}

impl fmt::Display for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# x86-64 assembly generated by toyc")?;
        writeln!(f, ".section .text")?;
        writeln!(f, ".global main")?;
        writeln!(f)?;
        write!(f, "{}", self.code())?;
        writeln!(f)?;

        writeln!(f, "#\n# {}", RULE)?;
        writeln!(f, "# EXECUTION TRACE")?;
        writeln!(f, "# {}", RULE)?;
        write!(f, "{}", self.render_trace())?;

        writeln!(f, "# {}", RULE)?;
        writeln!(f, "# FINAL STATE")?;
        writeln!(f, "# {}", RULE)?;
        writeln!(f, "# Registers:")?;
        for (reg, value) in self.machine.registers() {
            writeln!(f, "#   {} = {}", reg.name(), value)?;
        }
        writeln!(f, "#\n# Variables:")?;
        for (name, value) in self.machine.variables() {
            writeln!(f, "#   {} = {}", name, value)?;
        }
        writeln!(f, "#")?;
        match self.return_type {
            Ty::Void => writeln!(f, "# RESULT: void")?,
            _ => writeln!(f, "# RESULT (return value): {}", self.return_value())?,
        }
        writeln!(f, "# {}", RULE)
    }
}
