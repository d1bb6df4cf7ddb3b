use std::collections::HashMap;

use indexmap::IndexMap;
use log::{debug, trace};
use thiserror::Error;

use crate::analyzer::Ty;
use crate::parser::{
    BinOpKind, CmpOpKind, Expr, FunctionDecl, LogicalOpKind, Program, Stmt, VarDecl,
};
use crate::value::Value;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum InterpretError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("call to unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' expects {expected} argument(s), but received {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("operator '{op}' cannot be applied to {value}")]
    TypeMismatch { op: String, value: Value },
    #[error("call depth exceeded {0}")]
    CallDepthExceeded(usize),
}

type InterpretResult<T> = Result<T, InterpretError>;

/// Result of running a program to completion.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    pub return_value: Option<Value>,
    /// Variables declared at the top level of `main`, in declaration order.
    pub variables: IndexMap<String, Value>,
}

enum Flow {
    Normal,
    Return(Option<Value>),
}

/// Block-scoped variables of one function activation.
#[derive(Default)]
struct Frame {
    scopes: Vec<IndexMap<String, Value>>,
}

impl Frame {
    fn with_scope(scope: IndexMap<String, Value>) -> Self {
        Self {
            scopes: vec![scope],
        }
    }

    fn declare(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }
}

/// Executes a program directly on its syntax tree.
pub struct Interpreter<'p> {
    functions: HashMap<&'p str, &'p FunctionDecl>,
    frames: Vec<Frame>,
    max_call_depth: usize,
}

impl<'p> Interpreter<'p> {
    pub fn new(max_call_depth: usize) -> Self {
        Self {
            functions: HashMap::new(),
            frames: vec![],
            max_call_depth,
        }
    }

    pub fn run(mut self, program: &'p Program) -> InterpretResult<Outcome> {
        debug!("interpreting program (return type {})", program.return_type);
        self.functions = program
            .functions
            .iter()
            .map(|f| (f.name.as_str(), f))
            .collect();

        self.frames.push(Frame::with_scope(IndexMap::new()));
        for decl in &program.main.locals {
            self.declare(decl);
        }

        let flow = self.exec_block(&program.main.body)?;
        let return_value = match flow {
            Flow::Return(value) => value,
            Flow::Normal => None,
        };
        let return_value = match program.return_type {
            Ty::Void => None,
            ty => return_value.and_then(|v| ty.from_word(v.as_int())),
        };

        let variables = self
            .frames
            .pop()
            .and_then(|frame| frame.scopes.into_iter().next())
            .unwrap_or_default();
        debug!("program returned {:?}", return_value);

        Ok(Outcome {
            return_value,
            variables,
        })
    }

    fn frame(&mut self) -> &mut Frame {
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn declare(&mut self, decl: &VarDecl) {
        let value = Value::default_for(decl.ty).unwrap_or(Value::Int(0));
        trace!("declare {} {} = {}", decl.ty, decl.name, value);
        self.frame().declare(&decl.name, value);
    }

    fn lookup(&mut self, name: &str) -> InterpretResult<Value> {
        self.frame()
            .get(name)
            .ok_or_else(|| InterpretError::UndefinedVariable(name.to_string()))
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> InterpretResult<Flow> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec_stmt(stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_scoped(&mut self, stmts: &[Stmt]) -> InterpretResult<Flow> {
        self.frame().scopes.push(IndexMap::new());
        let flow = self.exec_block(stmts);
        self.frame().scopes.pop();
        flow
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> InterpretResult<Flow> {
        match stmt {
            Stmt::VarDecl(decl) => self.declare(decl),
            Stmt::Assignment { name, expr } => {
                let value = self.eval(expr)?;
                let slot = self
                    .frame()
                    .get_mut(name)
                    .ok_or_else(|| InterpretError::UndefinedVariable(name.clone()))?;
                // Keep the declared type of the variable.
                *slot = match *slot {
                    Value::Int(_) => Value::Int(value.as_int()),
                    Value::Bool(_) => Value::Bool(value.is_truthy()),
                };
                trace!("{} = {}", name, slot);
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                if self.eval(cond)?.is_truthy() {
                    return self.exec_scoped(then_block);
                } else if let Some(else_block) = else_block {
                    return self.exec_scoped(else_block);
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.is_truthy() {
                    if let Flow::Return(value) = self.exec_scoped(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Stmt::Return(expr) => {
                let value = expr.as_ref().map(|e| self.eval(e)).transpose()?;
                return Ok(Flow::Return(value));
            }
            Stmt::Expression(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn expect_int(op: impl ToString, value: Value) -> InterpretResult<i64> {
        match value {
            Value::Int(n) => Ok(n),
            Value::Bool(_) => Err(InterpretError::TypeMismatch {
                op: op.to_string(),
                value,
            }),
        }
    }

    fn eval(&mut self, expr: &Expr) -> InterpretResult<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::Int(*n)),
            Expr::Boolean(b) => Ok(Value::Bool(*b)),
            Expr::Variable(name) => self.lookup(name),
            Expr::BinaryOp { left, op, right } => {
                let lhs = Self::expect_int(op, self.eval(left)?)?;
                let rhs = Self::expect_int(op, self.eval(right)?)?;
                let result = match op {
                    BinOpKind::Add => lhs.wrapping_add(rhs),
                    BinOpKind::Sub => lhs.wrapping_sub(rhs),
                    BinOpKind::Mul => lhs.wrapping_mul(rhs),
                    BinOpKind::Div if rhs == 0 => return Err(InterpretError::DivisionByZero),
                    BinOpKind::Div => lhs.wrapping_div(rhs),
                };
                Ok(Value::Int(result))
            }
            Expr::Comparison { left, op, right } => {
                let lhs = self.eval(left)?;
                let rhs = self.eval(right)?;
                let result = match (op, lhs, rhs) {
                    (CmpOpKind::Equal | CmpOpKind::NotEqual, Value::Bool(_), _)
                    | (CmpOpKind::Equal | CmpOpKind::NotEqual, _, Value::Bool(_)) => {
                        op.evaluate(lhs.as_int(), rhs.as_int())
                    }
                    _ => op.evaluate(Self::expect_int(op, lhs)?, Self::expect_int(op, rhs)?),
                };
                Ok(Value::Bool(result))
            }
            Expr::LogicalOp { left, op, right } => {
                let lhs = self.eval(left)?.is_truthy();
                let result = match (op, right) {
                    (LogicalOpKind::And, Some(right)) => lhs && self.eval(right)?.is_truthy(),
                    (LogicalOpKind::Or, Some(right)) => lhs || self.eval(right)?.is_truthy(),
                    _ => !lhs,
                };
                Ok(Value::Bool(result))
            }
            Expr::FunctionCall { name, args } => self.call(name, args),
        }
    }

    fn call(&mut self, name: &str, args: &[Expr]) -> InterpretResult<Value> {
        let func = *self
            .functions
            .get(name)
            .ok_or_else(|| InterpretError::UnknownFunction(name.to_string()))?;
        if func.params.len() != args.len() {
            return Err(InterpretError::ArityMismatch {
                name: name.to_string(),
                expected: func.params.len(),
                found: args.len(),
            });
        }
        if self.frames.len() > self.max_call_depth {
            return Err(InterpretError::CallDepthExceeded(self.max_call_depth));
        }

        let mut scope = IndexMap::new();
        for (param, arg) in func.params.iter().zip(args) {
            let value = self.eval(arg)?;
            let value = param.ty.from_word(value.as_int()).unwrap_or(value);
            scope.insert(param.name.clone(), value);
        }
        trace!("call {}({:?})", name, scope.values().collect::<Vec<_>>());

        self.frames.push(Frame::with_scope(scope));
        for decl in &func.locals {
            self.declare(decl);
        }
        let flow = self.exec_block(&func.body);
        self.frames.pop();

        let value = match flow? {
            Flow::Return(Some(value)) => value,
            Flow::Return(None) | Flow::Normal => Value::Int(0),
        };
        Ok(func.return_type.from_word(value.as_int()).unwrap_or(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn run(input: &str) -> InterpretResult<Outcome> {
        let tokens = Lexer::tokenize(input).unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        Interpreter::new(256).run(&program)
    }

    #[test]
    fn block_scopes_shadow() {
        let outcome = run("int main() {
            int x;
            x = 1;
            if (true) { int x; x = 5; }
            return x;
        }")
        .unwrap();
        assert_eq!(outcome.return_value, Some(Value::Int(1)));
        assert_eq!(outcome.variables.get("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn arithmetic_on_booleans_is_rejected() {
        let err = run("int main() { bool b; return b + 1; }").unwrap_err();
        assert_eq!(
            err,
            InterpretError::TypeMismatch {
                op: "+".to_string(),
                value: Value::Bool(false)
            }
        );
    }
}
