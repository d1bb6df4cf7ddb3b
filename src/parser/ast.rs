use std::fmt;

use crate::analyzer::Ty;
use crate::lexer::Position;

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub return_type: Ty,
    pub functions: Vec<FunctionDecl>,
    pub main: MainFunction,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub return_type: Ty,
    pub name: String,
    pub params: Vec<Param>,
    pub locals: Vec<VarDecl>,
    pub body: Vec<Stmt>,
}

impl FunctionDecl {
    /// Number of stack slots the function's frame needs: its locals plus
    /// every declaration nested in its blocks.
    pub fn frame_slots(&self) -> usize {
        self.locals.len() + count_decls(&self.body)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub ty: Ty,
    pub name: String,
    pub pos: Position,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MainFunction {
    pub locals: Vec<VarDecl>,
    pub body: Vec<Stmt>,
}

impl MainFunction {
    pub fn frame_slots(&self) -> usize {
        self.locals.len() + count_decls(&self.body)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub ty: Ty,
    pub name: String,
    pub pos: Position,
}

impl VarDecl {
    pub fn new(ty: Ty, name: &str) -> Self {
        Self {
            ty,
            name: name.to_string(),
            pos: Position::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    VarDecl(VarDecl),
    Assignment {
        name: String,
        expr: Expr,
    },
    If {
        cond: Expr,
        then_block: Vec<Stmt>,
        else_block: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Expression(Expr),
}

impl Stmt {
    pub fn assign(name: &str, expr: Expr) -> Self {
        Stmt::Assignment {
            name: name.to_string(),
            expr,
        }
    }

    /// True when an `if` carries a non-empty else block.
    pub fn has_else(&self) -> bool {
        matches!(self, Stmt::If { else_block: Some(block), .. } if !block.is_empty())
    }
}

fn count_decls(stmts: &[Stmt]) -> usize {
    stmts
        .iter()
        .map(|s| match s {
            Stmt::VarDecl(_) => 1,
            Stmt::If {
                then_block,
                else_block,
                ..
            } => count_decls(then_block) + else_block.as_deref().map_or(0, count_decls),
            Stmt::While { body, .. } => count_decls(body),
            Stmt::Assignment { .. } | Stmt::Return(_) | Stmt::Expression(_) => 0,
        })
        .sum()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOpKind {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
}

impl CmpOpKind {
    pub fn evaluate(&self, left: i64, right: i64) -> bool {
        match self {
            CmpOpKind::Equal => left == right,
            CmpOpKind::NotEqual => left != right,
            CmpOpKind::LessThan => left < right,
            CmpOpKind::GreaterThan => left > right,
            CmpOpKind::LessEqual => left <= right,
            CmpOpKind::GreaterEqual => left >= right,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOpKind {
    And,
    Or,
    Not,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    BinaryOp {
        left: Box<Expr>,
        op: BinOpKind,
        right: Box<Expr>,
    },
    Comparison {
        left: Box<Expr>,
        op: CmpOpKind,
        right: Box<Expr>,
    },
    /// `right` is `None` exactly when `op` is `Not`.
    LogicalOp {
        left: Box<Expr>,
        op: LogicalOpKind,
        right: Option<Box<Expr>>,
    },
    Number(i64),
    Boolean(bool),
    Variable(String),
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn var(name: &str) -> Self {
        Expr::Variable(name.to_string())
    }

    pub fn binary(left: Expr, op: BinOpKind, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn compare(left: Expr, op: CmpOpKind, right: Expr) -> Self {
        Expr::Comparison {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::LogicalOp {
            left: Box::new(left),
            op: LogicalOpKind::And,
            right: Some(Box::new(right)),
        }
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::LogicalOp {
            left: Box::new(left),
            op: LogicalOpKind::Or,
            right: Some(Box::new(right)),
        }
    }

    pub fn not(operand: Expr) -> Self {
        Expr::LogicalOp {
            left: Box::new(operand),
            op: LogicalOpKind::Not,
            right: None,
        }
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::FunctionCall {
            name: name.to_string(),
            args,
        }
    }
}

impl fmt::Display for BinOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mul => "*",
            BinOpKind::Div => "/",
        };
        f.write_str(s)
    }
}

impl fmt::Display for CmpOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOpKind::Equal => "==",
            CmpOpKind::NotEqual => "!=",
            CmpOpKind::LessThan => "<",
            CmpOpKind::GreaterThan => ">",
            CmpOpKind::LessEqual => "<=",
            CmpOpKind::GreaterEqual => ">=",
        };
        f.write_str(s)
    }
}

impl fmt::Display for LogicalOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogicalOpKind::And => "&&",
            LogicalOpKind::Or => "||",
            LogicalOpKind::Not => "!",
        };
        f.write_str(s)
    }
}
