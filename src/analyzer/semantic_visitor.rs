use std::collections::HashMap;

use log::debug;
use thiserror::Error;

use crate::lexer::Position;
use crate::parser::{Expr, FunctionDecl, MainFunction, Param, Program, Stmt, VarDecl};

use super::{SymbolTable, Ty};

/// A non-fatal problem found while checking a program.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error("{pos}: variable '{name}' is already declared in scope '{scope}'")]
    Redeclared {
        name: String,
        scope: String,
        pos: Position,
    },
    #[error("variable '{name}' is not declared (in scope '{scope}')")]
    Undeclared { name: String, scope: String },
    #[error("parameter '{name}' is declared twice in function '{function}'")]
    DuplicateParameter { name: String, function: String },
    #[error("function '{name}' is already declared")]
    FunctionRedeclared { name: String },
    #[error("function '{name}' is not declared")]
    UndeclaredFunction { name: String },
    #[error("function '{name}' expects {expected} argument(s), but received {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Clone, Debug)]
struct Signature {
    params: Vec<Ty>,
}

/// Checks declarations and uses of every name in a program.
#[derive(Debug, Default)]
pub struct SemanticVisitor {
    symbol_table: SymbolTable,
    diagnostics: Vec<Diagnostic>,
    functions: HashMap<String, Signature>,
}

impl SemanticVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the pass and returns whether the program is free of diagnostics.
    pub fn analyze(&mut self, program: &Program) -> bool {
        self.diagnostics.clear();
        self.functions.clear();
        self.symbol_table.clear();

        debug!("semantic analysis started");
        let mut table = std::mem::take(&mut self.symbol_table);
        self.visit_program(&mut table, program);
        self.symbol_table = table;

        for diagnostic in &self.diagnostics {
            debug!("semantic error: {}", diagnostic);
        }
        debug!(
            "semantic analysis finished with {} error(s)",
            self.diagnostics.len()
        );
        self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbol_table
    }

    pub fn into_symbol_table(self) -> SymbolTable {
        self.symbol_table
    }

    fn visit_program(&mut self, table: &mut SymbolTable, program: &Program) {
        let mut global = table.enter_scope("global");

        for func in &program.functions {
            if self.functions.contains_key(&func.name) {
                self.diagnostics.push(Diagnostic::FunctionRedeclared {
                    name: func.name.clone(),
                });
                continue;
            }
            let signature = Signature {
                params: func.params.iter().map(|p| p.ty).collect(),
            };
            self.functions.insert(func.name.clone(), signature);
        }

        for func in &program.functions {
            self.visit_function(&mut global, func);
        }
        self.visit_main(&mut global, &program.main);
    }

    fn visit_function(&mut self, table: &mut SymbolTable, func: &FunctionDecl) {
        let mut scope = table.enter_scope(&format!("func_{}", func.name));

        for param in &func.params {
            self.visit_param(&mut scope, &func.name, param);
        }
        for decl in &func.locals {
            self.visit_var_decl(&mut scope, decl);
        }
        self.visit_stmts(&mut scope, &func.body);
    }

    fn visit_main(&mut self, table: &mut SymbolTable, main: &MainFunction) {
        let mut scope = table.enter_scope("main");

        for decl in &main.locals {
            self.visit_var_decl(&mut scope, decl);
        }
        self.visit_stmts(&mut scope, &main.body);
    }

    fn visit_param(&mut self, table: &mut SymbolTable, function: &str, param: &Param) {
        if table.exists_local(&param.name) {
            self.diagnostics.push(Diagnostic::DuplicateParameter {
                name: param.name.clone(),
                function: function.to_string(),
            });
        } else {
            table.declare(&param.name, param.ty, param.pos.line, param.pos.col);
        }
    }

    fn visit_var_decl(&mut self, table: &mut SymbolTable, decl: &VarDecl) {
        if table.exists_local(&decl.name) {
            self.diagnostics.push(Diagnostic::Redeclared {
                name: decl.name.clone(),
                scope: table.current_scope().name.clone(),
                pos: decl.pos,
            });
        } else {
            table.declare(&decl.name, decl.ty, decl.pos.line, decl.pos.col);
        }
    }

    fn visit_block(&mut self, table: &mut SymbolTable, name: &str, stmts: &[Stmt]) {
        let mut scope = table.enter_scope(name);
        self.visit_stmts(&mut scope, stmts);
    }

    fn visit_stmts(&mut self, table: &mut SymbolTable, stmts: &[Stmt]) {
        for stmt in stmts {
            self.visit_stmt(table, stmt);
        }
    }

    fn visit_stmt(&mut self, table: &mut SymbolTable, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(decl) => self.visit_var_decl(table, decl),
            Stmt::Assignment { name, expr } => {
                self.check_variable(table, name);
                self.visit_expr(table, expr);
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                self.visit_expr(table, cond);
                self.visit_block(table, "if_then", then_block);
                if let Some(else_block) = else_block.as_deref().filter(|b| !b.is_empty()) {
                    self.visit_block(table, "if_else", else_block);
                }
            }
            Stmt::While { cond, body } => {
                self.visit_expr(table, cond);
                self.visit_block(table, "while_body", body);
            }
            Stmt::Return(expr) => {
                if let Some(expr) = expr {
                    self.visit_expr(table, expr);
                }
            }
            Stmt::Expression(expr) => self.visit_expr(table, expr),
        }
    }

    fn check_variable(&mut self, table: &SymbolTable, name: &str) {
        if !table.exists(name) {
            self.diagnostics.push(Diagnostic::Undeclared {
                name: name.to_string(),
                scope: table.current_scope().name.clone(),
            });
        }
    }

    fn visit_expr(&mut self, table: &mut SymbolTable, expr: &Expr) {
        match expr {
            Expr::BinaryOp { left, right, .. } | Expr::Comparison { left, right, .. } => {
                self.visit_expr(table, left);
                self.visit_expr(table, right);
            }
            Expr::LogicalOp { left, right, .. } => {
                self.visit_expr(table, left);
                if let Some(right) = right {
                    self.visit_expr(table, right);
                }
            }
            Expr::Number(_) | Expr::Boolean(_) => (),
            Expr::Variable(name) => self.check_variable(table, name),
            Expr::FunctionCall { name, args } => {
                match self.functions.get(name) {
                    None => self.diagnostics.push(Diagnostic::UndeclaredFunction {
                        name: name.clone(),
                    }),
                    Some(signature) if signature.params.len() != args.len() => {
                        self.diagnostics.push(Diagnostic::ArityMismatch {
                            name: name.clone(),
                            expected: signature.params.len(),
                            found: args.len(),
                        })
                    }
                    Some(_) => (),
                }
                for arg in args {
                    self.visit_expr(table, arg);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::BinOpKind;

    fn main_with(locals: Vec<VarDecl>, body: Vec<Stmt>) -> Program {
        Program {
            return_type: Ty::Int,
            functions: vec![],
            main: MainFunction { locals, body },
        }
    }

    #[test]
    fn declared_before_use_is_valid() {
        let program = main_with(
            vec![VarDecl::new(Ty::Int, "x")],
            vec![
                Stmt::assign(
                    "x",
                    Expr::binary(Expr::Number(10), BinOpKind::Add, Expr::Number(5)),
                ),
                Stmt::Return(Some(Expr::var("x"))),
            ],
        );
        let mut visitor = SemanticVisitor::new();
        assert!(visitor.analyze(&program));
        assert!(visitor.diagnostics().is_empty());
    }

    #[test]
    fn reports_every_problem_in_order() {
        let program = main_with(
            vec![VarDecl::new(Ty::Int, "x"), VarDecl::new(Ty::Int, "x")],
            vec![
                Stmt::assign("y", Expr::var("z")),
                Stmt::Expression(Expr::call("missing", vec![Expr::var("w")])),
            ],
        );
        let mut visitor = SemanticVisitor::new();
        assert!(!visitor.analyze(&program));

        let names: Vec<_> = visitor
            .diagnostics()
            .iter()
            .map(|d| match d {
                Diagnostic::Redeclared { name, .. }
                | Diagnostic::Undeclared { name, .. }
                | Diagnostic::UndeclaredFunction { name } => name.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(names, ["x", "y", "z", "missing", "w"]);
    }

    #[test]
    fn block_declarations_shadow() {
        let program = main_with(
            vec![VarDecl::new(Ty::Int, "x")],
            vec![Stmt::While {
                cond: Expr::Boolean(false),
                body: vec![
                    Stmt::VarDecl(VarDecl::new(Ty::Bool, "x")),
                    Stmt::assign("x", Expr::Boolean(true)),
                ],
            }],
        );
        let mut visitor = SemanticVisitor::new();
        assert!(visitor.analyze(&program));

        let dump = visitor.symbol_table().dump();
        assert!(dump.contains("Scope[while_body_3] (level=3, symbols=1)"));
    }
}
