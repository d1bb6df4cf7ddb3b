use std::fmt::Write;

use super::{Expr, FunctionDecl, MainFunction, Program, Stmt, VarDecl};

const BRANCH: &str = "├── ";
const LAST_BRANCH: &str = "└── ";
const VERTICAL: &str = "│   ";
const SPACE: &str = "    ";
const RULE: &str = "═════════════════════════════════════";

/// Renders a program as a box-drawing tree, one node per line.
pub fn print_tree(program: &Program) -> String {
    let mut printer = TreePrinter::default();
    printer.out.push_str("ABSTRACT SYNTAX TREE (AST)\n");
    printer.out.push_str(RULE);
    printer.out.push('\n');
    printer.program(program);
    printer.out.push_str(RULE);
    printer.out.push('\n');
    printer.out
}

#[derive(Default)]
struct TreePrinter {
    out: String,
}

impl TreePrinter {
    /// Writes one node line and returns the prefix its children should use.
    fn node(&mut self, prefix: &str, is_last: bool, label: &str, details: Option<String>) -> String {
        let (branch, next) = if is_last {
            (LAST_BRANCH, SPACE)
        } else {
            (BRANCH, VERTICAL)
        };
        self.line(&format!("{prefix}{branch}"), label, details);

        format!("{prefix}{next}")
    }

    fn line(&mut self, indent: &str, label: &str, details: Option<String>) {
        let _ = write!(self.out, "{indent}{label}");
        if let Some(details) = details {
            let _ = write!(self.out, " ➤ {details}");
        }
        self.out.push('\n');
    }

    fn program(&mut self, program: &Program) {
        self.line(
            "",
            "PROGRAM",
            Some(format!("Return Type: {}", program.return_type)),
        );
        let prefix = String::new();

        let count = program.functions.len() + 1;
        for (i, func) in program.functions.iter().enumerate() {
            self.function(&prefix, i + 1 == count, func);
        }
        self.main(&prefix, &program.main);
    }

    fn function(&mut self, prefix: &str, is_last: bool, func: &FunctionDecl) {
        let prefix = self.node(
            prefix,
            is_last,
            "FUNCTION",
            Some(format!("{} {}", func.return_type, func.name)),
        );

        let total = func.params.len() + func.locals.len() + func.body.len();
        let mut index = 0;
        for param in &func.params {
            index += 1;
            self.node(
                &prefix,
                index == total,
                "PARAMETER",
                Some(format!("Type: {}, Identifier: {}", param.ty, param.name)),
            );
        }
        self.locals_and_body(&prefix, index, total, &func.locals, &func.body);
    }

    fn main(&mut self, prefix: &str, main: &MainFunction) {
        let prefix = self.node(prefix, true, "MAIN_FUNCTION", None);
        let total = main.locals.len() + main.body.len();
        self.locals_and_body(&prefix, 0, total, &main.locals, &main.body);
    }

    fn locals_and_body(
        &mut self,
        prefix: &str,
        mut index: usize,
        total: usize,
        locals: &[VarDecl],
        body: &[Stmt],
    ) {
        for decl in locals {
            index += 1;
            self.var_decl(prefix, index == total, decl);
        }
        for stmt in body {
            index += 1;
            self.stmt(prefix, index == total, stmt);
        }
    }

    fn var_decl(&mut self, prefix: &str, is_last: bool, decl: &VarDecl) {
        self.node(
            prefix,
            is_last,
            "VARIABLE_DECLARATION",
            Some(format!("Type: {}, Identifier: {}", decl.ty, decl.name)),
        );
    }

    fn block(&mut self, prefix: &str, is_last: bool, label: &str, stmts: &[Stmt]) {
        let prefix = self.node(prefix, is_last, label, None);
        for (i, stmt) in stmts.iter().enumerate() {
            self.stmt(&prefix, i + 1 == stmts.len(), stmt);
        }
    }

    fn stmt(&mut self, prefix: &str, is_last: bool, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(decl) => self.var_decl(prefix, is_last, decl),
            Stmt::Assignment { name, expr } => {
                let prefix =
                    self.node(prefix, is_last, "ASSIGNMENT", Some(format!("Variable: {name}")));
                self.expr(&prefix, true, expr);
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let prefix = self.node(prefix, is_last, "IF_STATEMENT", None);
                let cond_prefix = self.node(&prefix, false, "CONDITION", None);
                self.expr(&cond_prefix, true, cond);

                let has_else = stmt.has_else();
                self.block(&prefix, !has_else, "THEN_BLOCK", then_block);
                if let Some(else_block) = else_block.as_deref().filter(|_| has_else) {
                    self.block(&prefix, true, "ELSE_BLOCK", else_block);
                }
            }
            Stmt::While { cond, body } => {
                let prefix = self.node(prefix, is_last, "WHILE_LOOP", None);
                let cond_prefix = self.node(&prefix, false, "CONDITION", None);
                self.expr(&cond_prefix, true, cond);
                self.block(&prefix, true, "BODY", body);
            }
            Stmt::Return(expr) => {
                let details = if expr.is_some() { "with expression" } else { "void" };
                let prefix = self.node(prefix, is_last, "RETURN", Some(details.to_string()));
                if let Some(expr) = expr {
                    self.expr(&prefix, true, expr);
                }
            }
            Stmt::Expression(expr) => {
                let prefix = self.node(prefix, is_last, "EXPRESSION_STATEMENT", None);
                self.expr(&prefix, true, expr);
            }
        }
    }

    fn operands(&mut self, prefix: &str, left: &Expr, right: Option<&Expr>) {
        let left_prefix = self.node(prefix, right.is_none(), "LEFT_OPERAND", None);
        self.expr(&left_prefix, true, left);
        if let Some(right) = right {
            let right_prefix = self.node(prefix, true, "RIGHT_OPERAND", None);
            self.expr(&right_prefix, true, right);
        }
    }

    fn expr(&mut self, prefix: &str, is_last: bool, expr: &Expr) {
        match expr {
            Expr::BinaryOp { left, op, right } => {
                let prefix = self.node(
                    prefix,
                    is_last,
                    "BINARY_OPERATION",
                    Some(format!("Operator: {op}")),
                );
                self.operands(&prefix, left, Some(right));
            }
            Expr::Comparison { left, op, right } => {
                let prefix =
                    self.node(prefix, is_last, "COMPARISON", Some(format!("Operator: {op}")));
                self.operands(&prefix, left, Some(right));
            }
            Expr::LogicalOp { left, op, right } => {
                let prefix = self.node(
                    prefix,
                    is_last,
                    "LOGICAL_OPERATION",
                    Some(format!("Operator: {op}")),
                );
                self.operands(&prefix, left, right.as_deref());
            }
            Expr::Number(n) => {
                self.node(prefix, is_last, "NUMBER", Some(format!("Value: {n}")));
            }
            Expr::Boolean(b) => {
                self.node(prefix, is_last, "BOOLEAN", Some(format!("Value: {b}")));
            }
            Expr::Variable(name) => {
                self.node(prefix, is_last, "VARIABLE", Some(format!("Identifier: {name}")));
            }
            Expr::FunctionCall { name, args } => {
                let prefix = self.node(
                    prefix,
                    is_last,
                    "FUNCTION_CALL",
                    Some(format!("{name} ({} args)", args.len())),
                );
                for (i, arg) in args.iter().enumerate() {
                    self.expr(&prefix, i + 1 == args.len(), arg);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Ty;
    use crate::parser::BinOpKind;

    #[test]
    fn draws_nested_branches() {
        let program = Program {
            return_type: Ty::Int,
            functions: vec![],
            main: MainFunction {
                locals: vec![VarDecl::new(Ty::Int, "x")],
                body: vec![Stmt::assign(
                    "x",
                    Expr::binary(Expr::Number(10), BinOpKind::Add, Expr::Number(5)),
                )],
            },
        };

        let tree = print_tree(&program);
        let lines: Vec<_> = tree.lines().skip(2).collect();
        assert_eq!(
            lines[..8],
            [
                "PROGRAM ➤ Return Type: int",
                "└── MAIN_FUNCTION",
                "    ├── VARIABLE_DECLARATION ➤ Type: int, Identifier: x",
                "    └── ASSIGNMENT ➤ Variable: x",
                "        └── BINARY_OPERATION ➤ Operator: +",
                "            ├── LEFT_OPERAND",
                "            │   └── NUMBER ➤ Value: 10",
                "            └── RIGHT_OPERAND",
            ]
        );
    }
}
