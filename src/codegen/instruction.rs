use std::fmt;

use crate::parser::CmpOpKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reg {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsp,
    Rbp,
    Eax,
    Al,
}

impl Reg {
    /// Registers tracked by the simulated machine.
    pub const TRACKED: [Reg; 4] = [Reg::Rax, Reg::Rbx, Reg::Rcx, Reg::Rdx];

    pub fn name(&self) -> &'static str {
        match self {
            Reg::Rax => "rax",
            Reg::Rbx => "rbx",
            Reg::Rcx => "rcx",
            Reg::Rdx => "rdx",
            Reg::Rsp => "rsp",
            Reg::Rbp => "rbp",
            Reg::Eax => "eax",
            Reg::Al => "al",
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg),
    Imm(i64),
    /// `offset(%rbp)`
    Frame(i64),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{}", reg),
            Operand::Imm(n) => write!(f, "${}", n),
            Operand::Frame(offset) => write!(f, "{}(%rbp)", offset),
        }
    }
}

impl From<Reg> for Operand {
    fn from(reg: Reg) -> Self {
        Operand::Reg(reg)
    }
}

/// Condition code of a `setcc` instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    E,
    Ne,
    L,
    G,
    Le,
    Ge,
}

impl From<CmpOpKind> for Cond {
    fn from(op: CmpOpKind) -> Self {
        match op {
            CmpOpKind::Equal => Cond::E,
            CmpOpKind::NotEqual => Cond::Ne,
            CmpOpKind::LessThan => Cond::L,
            CmpOpKind::GreaterThan => Cond::G,
            CmpOpKind::LessEqual => Cond::Le,
            CmpOpKind::GreaterEqual => Cond::Ge,
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cond::E => "e",
            Cond::Ne => "ne",
            Cond::L => "l",
            Cond::G => "g",
            Cond::Le => "le",
            Cond::Ge => "ge",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Label(String),
    Comment(String),
    Blank,
    Push(Reg),
    Pop(Reg),
    Movq(Operand, Operand),
    /// `movl $imm, %eax`
    Movl(i64),
    Xorq(Reg, Reg),
    Addq(Operand, Operand),
    Subq(Operand, Operand),
    Imulq(Reg, Reg),
    Cqto,
    Idivq(Reg),
    Cmpq(Operand, Operand),
    Testq(Reg, Reg),
    Set(Cond),
    /// `movzbl %al, %eax`
    Movzbl,
    Jmp(String),
    Je(String),
    Jne(String),
    Call(String),
    Ret,
}

impl Instruction {
    pub fn load_imm(value: i64) -> Self {
        match value {
            0 => Instruction::Xorq(Reg::Rax, Reg::Rax),
            1..=0x7fff_ffff => Instruction::Movl(value),
            _ => Instruction::Movq(Operand::Imm(value), Operand::Reg(Reg::Rax)),
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Instruction::Label(_))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Label(name) => write!(f, "{}:", name),
            Instruction::Comment(text) => write!(f, "# {}", text),
            Instruction::Blank => Ok(()),
            Instruction::Push(reg) => write!(f, "pushq {}", reg),
            Instruction::Pop(reg) => write!(f, "popq {}", reg),
            Instruction::Movq(src, dst) => write!(f, "movq {}, {}", src, dst),
            Instruction::Movl(value) => write!(f, "movl ${}, {}", value, Reg::Eax),
            Instruction::Xorq(src, dst) => write!(f, "xorq {}, {}", src, dst),
            Instruction::Addq(src, dst) => write!(f, "addq {}, {}", src, dst),
            Instruction::Subq(src, dst) => write!(f, "subq {}, {}", src, dst),
            Instruction::Imulq(src, dst) => write!(f, "imulq {}, {}", src, dst),
            Instruction::Cqto => write!(f, "cqto"),
            Instruction::Idivq(reg) => write!(f, "idivq {}", reg),
            Instruction::Cmpq(src, dst) => write!(f, "cmpq {}, {}", src, dst),
            Instruction::Testq(src, dst) => write!(f, "testq {}, {}", src, dst),
            Instruction::Set(cond) => write!(f, "set{} {}", cond, Reg::Al),
            Instruction::Movzbl => write!(f, "movzbl {}, {}", Reg::Al, Reg::Eax),
            Instruction::Jmp(label) => write!(f, "jmp {}", label),
            Instruction::Je(label) => write!(f, "je {}", label),
            Instruction::Jne(label) => write!(f, "jne {}", label),
            Instruction::Call(name) => write!(f, "call {}", name),
            Instruction::Ret => write!(f, "ret"),
        }
    }
}

/// Formats an instruction as a line of the listing.
pub fn render_line(instr: &Instruction) -> String {
    match instr {
        Instruction::Label(_) | Instruction::Blank => instr.to_string(),
        _ => format!("    {}", instr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_loads_pick_the_shortest_form() {
        assert_eq!(Instruction::load_imm(0).to_string(), "xorq %rax, %rax");
        assert_eq!(Instruction::load_imm(15).to_string(), "movl $15, %eax");
        assert_eq!(Instruction::load_imm(-1).to_string(), "movq $-1, %rax");
        assert_eq!(
            Instruction::load_imm(1 << 40).to_string(),
            "movq $1099511627776, %rax"
        );
    }

    #[test]
    fn listing_indents_opcodes_only() {
        assert_eq!(render_line(&Instruction::Label(".L0".into())), ".L0:");
        assert_eq!(
            render_line(&Instruction::Movq(Reg::Rax.into(), Operand::Frame(-8))),
            "    movq %rax, -8(%rbp)"
        );
        assert_eq!(render_line(&Instruction::Set(Cond::Le)), "    setle %al");
    }
}
