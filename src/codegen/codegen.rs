use std::collections::HashMap;

use log::{debug, trace, warn};
use thiserror::Error;

use crate::{
    analyzer::{ScopeId, Storage, SymbolTable, Ty},
    parser::{
        BinOpKind, CmpOpKind, Expr, FunctionDecl, LogicalOpKind, MainFunction, Program, Stmt,
        VarDecl,
    },
    value::Value,
};

use super::{Assembly, Cond, FlowState, Instruction, Machine, Operand, Reg, Trace};

const WORD: usize = 8;
const FIRST_PARAM_OFFSET: i64 = 16;
pub const DIV_BY_ZERO_LABEL: &str = "__div_by_zero";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Upper bound on simulated iterations of a single `while`.
    pub max_loop_iterations: usize,
    /// Upper bound on nested simulated calls.
    pub max_call_depth: usize,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            max_loop_iterations: 1000,
            max_call_depth: 256,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("variable '{0}' has no stack slot")]
    UnresolvedVariable(String),
    #[error("division by zero in '{0}'")]
    DivisionByZero(String),
    #[error("call to unknown function '{0}'")]
    UnknownFunction(String),
    #[error("simulated call depth exceeded {0}")]
    CallDepthExceeded(usize),
}

type CodegenResult<T> = Result<T, CodegenError>;

#[derive(Clone, Copy, Debug)]
struct Callee<'p> {
    decl: &'p FunctionDecl,
    label_base: usize,
}

/// Lowers a checked program to assembly while simulating its execution.
///
/// Emission and simulation are switched independently: both branches of an
/// `if` are emitted but only the taken one is simulated, and loop bodies or
/// called functions are re-run with emission switched off.
pub struct Codegen<'p> {
    options: CodegenOptions,
    functions: HashMap<&'p str, Callee<'p>>,
    lines: Vec<Instruction>,
    trace: Trace,
    machine: Machine,
    label_index: usize,
    emit: bool,
    simulate: bool,
    returned: bool,
    call_depth: usize,
    program_scope: Option<ScopeId>,
    uses_division: bool,
}

fn frame_size(slots: usize) -> usize {
    ((slots * WORD) + 15) & !15
}

impl<'p> Codegen<'p> {
    pub fn new(options: CodegenOptions) -> Self {
        Self {
            options,
            functions: HashMap::new(),
            lines: vec![],
            trace: Trace::default(),
            machine: Machine::new(),
            label_index: 0,
            emit: true,
            simulate: true,
            returned: false,
            call_depth: 0,
            program_scope: None,
            uses_division: false,
        }
    }

    pub fn generate(mut self, program: &'p Program) -> CodegenResult<Assembly> {
        debug!("code generation started");
        let mut table = SymbolTable::new();
        {
            let mut global = table.enter_scope("global");
            self.program_scope = Some(global.id());
            self.gen_program(&mut global, program)?;
        }

        if self.uses_division {
            self.gen_div_by_zero();
        }
        debug!(
            "code generation finished: {} line(s), {} trace step(s)",
            self.lines.len(),
            self.trace.step_count()
        );

        Ok(Assembly {
            return_type: program.return_type,
            lines: self.lines,
            trace: self.trace,
            machine: self.machine,
            symbol_table: table,
        })
    }

    fn emit(&mut self, instr: Instruction) {
        if self.emit {
            self.lines.push(instr);
        }
    }

    /// Emits `instr` and records it as an executed step.
    fn exec(&mut self, instr: Instruction, description: impl Into<String>) {
        if self.simulate {
            self.trace.step(instr.clone(), description);
        }
        self.emit(instr);
    }

    fn marker(&mut self, text: impl Into<String>) {
        if self.simulate {
            self.trace.marker(text);
        }
    }

    fn note(&mut self, text: impl Into<String>) {
        if self.simulate {
            self.trace.note(text);
        }
    }

    fn flow(&mut self, state: FlowState) {
        if self.simulate {
            self.trace.flow(state);
        }
    }

    fn set_reg(&mut self, reg: Reg, value: i64) {
        if self.simulate {
            self.machine.set(reg, value);
        }
    }

    fn rax(&self) -> i64 {
        self.machine.get(Reg::Rax)
    }

    fn new_label(&mut self) -> String {
        let s = format!(".L{}", self.label_index);
        self.label_index += 1;
        s
    }

    fn gen_program(&mut self, table: &mut SymbolTable, program: &'p Program) -> CodegenResult<()> {
        self.trace
            .marker(format!("PROGRAM (return type: {})", program.return_type));

        // Every function is callable from every body, whatever the order.
        for func in &program.functions {
            self.functions.insert(
                &func.name,
                Callee {
                    decl: func,
                    label_base: 0,
                },
            );
        }

        // Function bodies only run through simulated calls.
        self.simulate = false;
        for func in &program.functions {
            if let Some(callee) = self.functions.get_mut(func.name.as_str()) {
                callee.label_base = self.label_index;
            }
            self.gen_function(table, func)?;
        }

        self.simulate = true;
        self.gen_main(table, &program.main)
    }

    fn gen_prologue(&mut self, name: &str, slots: usize) {
        self.emit(Instruction::Label(name.to_string()));
        self.exec(
            Instruction::Push(Reg::Rbp),
            format!("save caller frame pointer ({})", name),
        );
        self.exec(
            Instruction::Movq(Reg::Rsp.into(), Reg::Rbp.into()),
            "set up new frame pointer",
        );
        if slots > 0 {
            let size = frame_size(slots);
            self.exec(
                Instruction::Subq(Operand::Imm(size as i64), Reg::Rsp.into()),
                format!("reserve {} bytes for {} variable(s)", size, slots),
            );
        }
        self.emit(Instruction::Blank);
    }

    fn gen_epilogue(&mut self) {
        self.emit(Instruction::Movq(Reg::Rbp.into(), Reg::Rsp.into()));
        self.emit(Instruction::Pop(Reg::Rbp));
        self.emit(Instruction::Ret);
    }

    fn gen_function(&mut self, table: &mut SymbolTable, func: &FunctionDecl) -> CodegenResult<()> {
        trace!("lowering function {}", func.name);
        self.gen_prologue(&func.name, func.frame_slots());

        let mut scope = table.enter_scope(&format!("func_{}", func.name));
        scope.reset_stack_offset();
        self.returned = false;

        for (i, param) in func.params.iter().enumerate() {
            let offset = FIRST_PARAM_OFFSET + (i * WORD) as i64;
            let storage = Storage::parameter(offset, WORD).at(param.pos);
            scope.declare_with_storage(&param.name, param.ty, storage);
        }
        for decl in &func.locals {
            self.gen_var_decl(&mut scope, decl)?;
        }
        self.gen_stmts(&mut scope, &func.body)?;

        self.emit(Instruction::Blank);
        self.gen_epilogue();
        self.emit(Instruction::Blank);
        Ok(())
    }

    fn gen_main(&mut self, table: &mut SymbolTable, main: &MainFunction) -> CodegenResult<()> {
        self.trace.marker("MAIN");
        self.gen_prologue("main", main.frame_slots());

        let mut scope = table.enter_scope("main");
        scope.reset_stack_offset();
        self.returned = false;

        for decl in &main.locals {
            self.gen_var_decl(&mut scope, decl)?;
        }
        self.gen_stmts(&mut scope, &main.body)?;

        // Only main's own declarations make it into the final state.
        for entry in scope.current_scope().symbols.values() {
            let word = entry.value.map_or(0, |value| value.as_int());
            self.machine.set_variable(&entry.name, word);
        }

        self.emit(Instruction::Blank);
        self.gen_epilogue();
        Ok(())
    }

    fn gen_div_by_zero(&mut self) {
        self.lines.push(Instruction::Blank);
        self.lines
            .push(Instruction::Label(DIV_BY_ZERO_LABEL.to_string()));
        self.lines
            .push(Instruction::Comment("division by zero".to_string()));
        self.lines.push(Instruction::Call("abort".to_string()));
    }

    fn gen_block(&mut self, table: &mut SymbolTable, name: &str, stmts: &[Stmt]) -> CodegenResult<()> {
        // Blocks that are not emitted leave nothing behind in the table.
        let mut scope = if self.emit {
            table.enter_scope(name)
        } else {
            table.enter_transient_scope(name)
        };
        self.gen_stmts(&mut scope, stmts)
    }

    fn gen_stmts(&mut self, table: &mut SymbolTable, stmts: &[Stmt]) -> CodegenResult<()> {
        for stmt in stmts {
            let simulate = self.simulate;
            self.simulate &= !self.returned;
            self.gen_stmt(table, stmt)?;
            self.simulate = simulate;
        }
        Ok(())
    }

    fn gen_stmt(&mut self, table: &mut SymbolTable, stmt: &Stmt) -> CodegenResult<()> {
        match stmt {
            Stmt::VarDecl(decl) => self.gen_var_decl(table, decl),
            Stmt::Assignment { name, expr } => self.gen_assignment(table, name, expr),
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let else_block = else_block.as_deref().filter(|_| stmt.has_else());
                self.gen_if(table, cond, then_block, else_block)
            }
            Stmt::While { cond, body } => self.gen_while(table, cond, body),
            Stmt::Return(expr) => self.gen_return(table, expr.as_ref()),
            Stmt::Expression(expr) => self.gen_expr(table, expr),
        }
    }

    fn gen_var_decl(&mut self, table: &mut SymbolTable, decl: &VarDecl) -> CodegenResult<()> {
        let offset = table.allocate_stack_space(WORD);
        let storage = Storage::local(offset, WORD).at(decl.pos);
        table.declare_with_storage(&decl.name, decl.ty, storage);

        if self.simulate {
            if let (Some(entry), Some(value)) = (table.lookup_mut(&decl.name), Value::default_for(decl.ty)) {
                entry.set_value(value);
            }
        }
        self.exec(
            Instruction::Movq(Operand::Imm(0), Operand::Frame(-offset)),
            format!("initialize variable '{}' = 0", decl.name),
        );
        Ok(())
    }

    fn frame_slot(table: &SymbolTable, name: &str) -> CodegenResult<i64> {
        table
            .lookup(name)
            .filter(|entry| entry.address.is_some())
            .map(|entry| entry.stack_offset)
            .ok_or_else(|| CodegenError::UnresolvedVariable(name.to_string()))
    }

    fn gen_assignment(&mut self, table: &mut SymbolTable, name: &str, expr: &Expr) -> CodegenResult<()> {
        self.gen_expr(table, expr)?;
        let offset = Self::frame_slot(table, name)?;
        let store = Instruction::Movq(Reg::Rax.into(), Operand::Frame(offset));

        if !self.simulate {
            self.emit(store);
            return Ok(());
        }

        let word = self.rax();
        let value = match table.lookup_mut(name) {
            Some(entry) => {
                let value = entry.ty.from_word(word).unwrap_or(Value::Int(word));
                entry.set_value(value);
                value
            }
            None => return Err(CodegenError::UnresolvedVariable(name.to_string())),
        };

        self.exec(store, format!("store {} in variable '{}'", value.as_int(), name));
        self.note(format!("{} = {}", name, value));
        Ok(())
    }

    fn gen_if(
        &mut self,
        table: &mut SymbolTable,
        cond: &Expr,
        then_block: &[Stmt],
        else_block: Option<&[Stmt]>,
    ) -> CodegenResult<()> {
        let else_label = else_block.map(|_| self.new_label());
        let end_label = self.new_label();

        self.marker("IF STATEMENT");
        self.flow(FlowState::ConditionEval);
        self.gen_expr(table, cond)?;
        let taken = self.rax() != 0;

        self.exec(
            Instruction::Cmpq(Operand::Imm(0), Reg::Rax.into()),
            "test the condition",
        );
        match &else_label {
            Some(label) => self.exec(
                Instruction::Je(label.clone()),
                "jump to ELSE if the condition is false",
            ),
            None => self.exec(
                Instruction::Je(end_label.clone()),
                "jump to the end if the condition is false",
            ),
        }
        self.flow(if taken {
            FlowState::BranchTaken
        } else {
            FlowState::BranchNotTaken
        });

        let simulate = self.simulate;
        let status = |executed: bool| if executed { "executed" } else { "not executed" };

        self.marker(format!("THEN BLOCK ({})", status(taken)));
        self.simulate = simulate && taken;
        self.gen_block(table, "if_then", then_block)?;

        if let (Some(else_block), Some(else_label)) = (else_block, else_label) {
            self.exec(Instruction::Jmp(end_label.clone()), "skip the ELSE block");
            self.emit(Instruction::Label(else_label));
            self.simulate = simulate;
            self.marker(format!("ELSE BLOCK ({})", status(!taken)));
            self.simulate = simulate && !taken;
            self.gen_block(table, "if_else", else_block)?;
        }

        self.simulate = simulate;
        self.emit(Instruction::Label(end_label));
        self.marker("END IF");
        Ok(())
    }

    fn gen_while(&mut self, table: &mut SymbolTable, cond: &Expr, body: &[Stmt]) -> CodegenResult<()> {
        let loop_label = self.new_label();
        let end_label = self.new_label();
        let checkpoint = (self.label_index, table.stack_offset());

        self.marker("WHILE LOOP");
        self.emit(Instruction::Label(loop_label.clone()));
        self.flow(FlowState::ConditionEval);
        self.gen_expr(table, cond)?;
        self.exec(
            Instruction::Cmpq(Operand::Imm(0), Reg::Rax.into()),
            "test the loop condition",
        );
        self.exec(
            Instruction::Je(end_label.clone()),
            "leave the loop if the condition is false",
        );

        let simulate = self.simulate;
        let mut iterations = 0;
        let mut running = simulate && self.rax() != 0;
        if running && self.options.max_loop_iterations == 0 {
            self.loop_limit_reached(iterations);
            running = false;
        }

        // The single emitted pass doubles as the first simulated iteration.
        if running {
            iterations = 1;
            self.flow(FlowState::Iterating);
        }
        self.simulate = running;
        self.gen_block(table, "while_body", body)?;
        self.exec(Instruction::Jmp(loop_label), "back to the loop condition");
        self.emit(Instruction::Label(end_label));
        let after_body = (self.label_index, table.stack_offset());

        let emit = self.emit;
        self.emit = false;
        while running && !self.returned {
            self.label_index = checkpoint.0;
            table.set_stack_offset(checkpoint.1);

            self.flow(FlowState::ConditionEval);
            self.gen_expr(table, cond)?;
            if self.rax() == 0 {
                break;
            }
            if iterations >= self.options.max_loop_iterations {
                self.loop_limit_reached(iterations);
                break;
            }

            iterations += 1;
            self.marker(format!("iteration {}", iterations));
            self.flow(FlowState::Iterating);
            self.gen_block(table, "while_body", body)?;
        }
        self.emit = emit;
        self.label_index = after_body.0;
        table.set_stack_offset(after_body.1);

        self.simulate = simulate;
        self.flow(FlowState::Exit);
        self.marker(format!("END WHILE ({} iterations)", iterations));
        Ok(())
    }

    fn loop_limit_reached(&mut self, iterations: usize) {
        warn!(
            "while loop stopped after {} simulated iterations",
            iterations
        );
        self.note(format!(
            "iteration limit of {} reached, simulation stops here",
            self.options.max_loop_iterations
        ));
    }

    fn gen_return(&mut self, table: &mut SymbolTable, expr: Option<&Expr>) -> CodegenResult<()> {
        match expr {
            Some(expr) => self.gen_expr(table, expr)?,
            None => {
                self.exec(Instruction::Xorq(Reg::Rax, Reg::Rax), "void return");
                self.set_reg(Reg::Rax, 0);
            }
        }

        if self.simulate {
            let value = self.rax();
            self.trace.step(Instruction::Ret, format!("return value = {}", value));
            self.trace.note(format!("RETURN VALUE: {}", value));
            self.returned = true;
        }
        self.gen_epilogue();
        Ok(())
    }

    fn gen_expr(&mut self, table: &mut SymbolTable, expr: &Expr) -> CodegenResult<()> {
        match expr {
            Expr::Number(n) => {
                self.exec(Instruction::load_imm(*n), format!("load constant {}", n));
                self.set_reg(Reg::Rax, *n);
            }
            Expr::Boolean(b) => {
                let word = *b as i64;
                self.exec(
                    Instruction::load_imm(word),
                    format!("load {} ({})", b, word),
                );
                self.set_reg(Reg::Rax, word);
            }
            Expr::Variable(name) => {
                let offset = Self::frame_slot(table, name)?;
                let word = table
                    .lookup(name)
                    .and_then(|entry| entry.value)
                    .map_or(0, |value| value.as_int());
                self.exec(
                    Instruction::Movq(Operand::Frame(offset), Reg::Rax.into()),
                    format!("load variable '{}' = {}", name, word),
                );
                self.set_reg(Reg::Rax, word);
            }
            Expr::BinaryOp { left, op, right } => self.gen_binary(table, left, *op, right)?,
            Expr::Comparison { left, op, right } => self.gen_comparison(table, left, *op, right)?,
            Expr::LogicalOp { left, op, right } => match (op, right) {
                (LogicalOpKind::And | LogicalOpKind::Or, Some(right)) => {
                    self.gen_logical(table, left, *op, right)?
                }
                _ => self.gen_not(table, left)?,
            },
            Expr::FunctionCall { name, args } => self.gen_call(table, name, args)?,
        }
        Ok(())
    }

    /// Evaluates both operands, leaving the left one in rax and the right one in rbx.
    fn gen_operands(&mut self, table: &mut SymbolTable, left: &Expr, right: &Expr) -> CodegenResult<(i64, i64)> {
        self.gen_expr(table, left)?;
        let lhs = self.rax();
        self.exec(
            Instruction::Push(Reg::Rax),
            format!("save left operand ({})", lhs),
        );

        self.gen_expr(table, right)?;
        let rhs = self.rax();
        self.exec(
            Instruction::Movq(Reg::Rax.into(), Reg::Rbx.into()),
            format!("move right operand to rbx ({})", rhs),
        );
        self.exec(
            Instruction::Pop(Reg::Rax),
            format!("restore left operand ({})", lhs),
        );
        self.set_reg(Reg::Rbx, rhs);
        self.set_reg(Reg::Rax, lhs);
        Ok((lhs, rhs))
    }

    fn gen_binary(&mut self, table: &mut SymbolTable, left: &Expr, op: BinOpKind, right: &Expr) -> CodegenResult<()> {
        if op == BinOpKind::Div && matches!(right, Expr::Number(0)) {
            return Err(CodegenError::DivisionByZero(format!("{} / 0", describe(left))));
        }

        let (lhs, rhs) = self.gen_operands(table, left, right)?;
        let result = match op {
            BinOpKind::Add => {
                let result = lhs.wrapping_add(rhs);
                self.exec(
                    Instruction::Addq(Reg::Rbx.into(), Reg::Rax.into()),
                    format!("{} + {} = {}", lhs, rhs, result),
                );
                result
            }
            BinOpKind::Sub => {
                let result = lhs.wrapping_sub(rhs);
                self.exec(
                    Instruction::Subq(Reg::Rbx.into(), Reg::Rax.into()),
                    format!("{} - {} = {}", lhs, rhs, result),
                );
                result
            }
            BinOpKind::Mul => {
                let result = lhs.wrapping_mul(rhs);
                self.exec(
                    Instruction::Imulq(Reg::Rbx, Reg::Rax),
                    format!("{} * {} = {}", lhs, rhs, result),
                );
                result
            }
            BinOpKind::Div => {
                if self.simulate && rhs == 0 {
                    return Err(CodegenError::DivisionByZero(format!(
                        "{} / {}",
                        describe(left),
                        describe(right)
                    )));
                }
                self.uses_division = true;
                self.emit(Instruction::Testq(Reg::Rbx, Reg::Rbx));
                self.emit(Instruction::Je(DIV_BY_ZERO_LABEL.to_string()));
                self.exec(Instruction::Cqto, "sign-extend rax into rdx");
                self.set_reg(Reg::Rdx, if lhs < 0 { -1 } else { 0 });

                let (result, remainder) = match rhs {
                    0 => (0, 0),
                    _ => (lhs.wrapping_div(rhs), lhs.wrapping_rem(rhs)),
                };
                self.exec(
                    Instruction::Idivq(Reg::Rbx),
                    format!("{} / {} = {} remainder {}", lhs, rhs, result, remainder),
                );
                self.set_reg(Reg::Rdx, remainder);
                result
            }
        };

        self.set_reg(Reg::Rax, result);
        self.note(format!("rax = {}", result));
        Ok(())
    }

    fn gen_comparison(&mut self, table: &mut SymbolTable, left: &Expr, op: CmpOpKind, right: &Expr) -> CodegenResult<()> {
        let (lhs, rhs) = self.gen_operands(table, left, right)?;
        let result = op.evaluate(lhs, rhs);

        self.exec(
            Instruction::Cmpq(Reg::Rbx.into(), Reg::Rax.into()),
            format!("{} {} {} → {}", lhs, op, rhs, result),
        );
        self.emit(Instruction::Set(op.into()));
        self.emit(Instruction::Movzbl);

        self.set_reg(Reg::Rax, result as i64);
        self.note(format!("rax = {}", result as i64));
        Ok(())
    }

    fn gen_not(&mut self, table: &mut SymbolTable, operand: &Expr) -> CodegenResult<()> {
        self.gen_expr(table, operand)?;
        let value = self.rax();
        let result = (value == 0) as i64;

        self.emit(Instruction::Cmpq(Operand::Imm(0), Reg::Rax.into()));
        self.exec(Instruction::Set(Cond::E), format!("!{} → {}", value, result));
        self.emit(Instruction::Movzbl);

        self.set_reg(Reg::Rax, result);
        self.note(format!("rax = {}", result));
        Ok(())
    }

    fn gen_logical(&mut self, table: &mut SymbolTable, left: &Expr, op: LogicalOpKind, right: &Expr) -> CodegenResult<()> {
        self.gen_expr(table, left)?;
        let lhs = self.rax() != 0;
        let short_label = self.new_label();
        let end_label = self.new_label();

        // `&&` stops on a false left operand, `||` on a true one.
        let is_and = op == LogicalOpKind::And;
        let short_circuits = lhs != is_and;

        self.emit(Instruction::Cmpq(Operand::Imm(0), Reg::Rax.into()));
        if is_and {
            self.exec(
                Instruction::Je(short_label.clone()),
                "short-circuit AND if left is false",
            );
        } else {
            self.exec(
                Instruction::Jne(short_label.clone()),
                "short-circuit OR if left is true",
            );
        }

        let simulate = self.simulate;
        self.simulate = simulate && !short_circuits;
        self.gen_expr(table, right)?;
        let rhs = self.rax() != 0;
        self.emit(Instruction::Cmpq(Operand::Imm(0), Reg::Rax.into()));
        self.exec(
            Instruction::Set(Cond::Ne),
            format!("{} {} {} → {}", lhs as i64, op, rhs as i64, rhs),
        );
        self.emit(Instruction::Movzbl);
        self.simulate = simulate;

        let result = if short_circuits {
            self.trace_short_circuit(lhs, op);
            !is_and
        } else {
            rhs
        };

        self.emit(Instruction::Jmp(end_label.clone()));
        self.emit(Instruction::Label(short_label));
        if is_and {
            self.emit(Instruction::Xorq(Reg::Rax, Reg::Rax));
        } else {
            self.emit(Instruction::Movl(1));
        }
        self.emit(Instruction::Label(end_label));

        self.set_reg(Reg::Rax, result as i64);
        self.note(format!("rax = {}", result as i64));
        Ok(())
    }

    fn trace_short_circuit(&mut self, lhs: bool, op: LogicalOpKind) {
        let (instr, result) = match op {
            LogicalOpKind::And => (Instruction::Xorq(Reg::Rax, Reg::Rax), false),
            _ => (Instruction::Movl(1), true),
        };
        if self.simulate {
            self.trace.step(
                instr,
                format!("{} {} ? → {} (right operand skipped)", lhs as i64, op, result),
            );
        }
    }

    fn gen_call(&mut self, table: &mut SymbolTable, name: &str, args: &[Expr]) -> CodegenResult<()> {
        let callee = self
            .functions
            .get(name)
            .copied()
            .ok_or_else(|| CodegenError::UnknownFunction(name.to_string()))?;

        self.marker(format!("CALL {}", name));
        let mut values = vec![0; args.len()];
        for (i, arg) in args.iter().enumerate().rev() {
            self.gen_expr(table, arg)?;
            values[i] = self.rax();
            self.exec(
                Instruction::Push(Reg::Rax),
                format!("push argument {} = {}", i + 1, values[i]),
            );
        }

        self.exec(
            Instruction::Call(name.to_string()),
            format!("call {} with {} argument(s)", name, args.len()),
        );
        if !args.is_empty() {
            let cleanup = (args.len() * WORD) as i64;
            self.exec(
                Instruction::Addq(Operand::Imm(cleanup), Reg::Rsp.into()),
                "drop the pushed arguments",
            );
        }

        if self.simulate {
            let result = self.simulate_call(table, callee, &values)?;
            self.machine.set(Reg::Rax, result);
            self.trace.note(format!("{}(...) returned {}", name, result));
        }
        Ok(())
    }

    fn gen_call_body(&mut self, table: &mut SymbolTable, func: &FunctionDecl) -> CodegenResult<()> {
        for decl in &func.locals {
            self.gen_var_decl(table, decl)?;
        }
        self.gen_stmts(table, &func.body)
    }

    /// Runs a function body against fresh parameter bindings with emission
    /// switched off, in a scope that is discarded afterwards.
    fn simulate_call(&mut self, table: &mut SymbolTable, callee: Callee<'p>, args: &[i64]) -> CodegenResult<i64> {
        let func = callee.decl;
        if self.call_depth >= self.options.max_call_depth {
            return Err(CodegenError::CallDepthExceeded(self.options.max_call_depth));
        }

        let parent = self.program_scope.unwrap_or_else(|| table.root());
        let saved_offset = table.stack_offset();
        let mut scope = table.enter_transient_scope_under(parent, &format!("call_{}", func.name));
        scope.reset_stack_offset();

        let saved = (self.emit, self.returned, self.label_index);
        self.emit = false;
        self.returned = false;
        self.label_index = callee.label_base;
        self.call_depth += 1;
        trace!("simulating call to {} (depth {})", func.name, self.call_depth);

        for (i, (param, &word)) in func.params.iter().zip(args).enumerate() {
            let offset = FIRST_PARAM_OFFSET + (i * WORD) as i64;
            let storage = Storage::parameter(offset, WORD).at(param.pos);
            scope.declare_with_storage(&param.name, param.ty, storage);
            if let (Some(entry), Some(value)) = (scope.lookup_mut(&param.name), param.ty.from_word(word)) {
                entry.set_value(value);
            }
            self.trace.note(format!("parameter {} = {}", param.name, word));
        }

        let outcome = self.gen_call_body(&mut scope, func);

        let result = match func.return_type {
            Ty::Void => 0,
            _ => self.rax(),
        };

        self.call_depth -= 1;
        (self.emit, self.returned, self.label_index) = saved;
        drop(scope);
        table.set_stack_offset(saved_offset);

        outcome.map(|()| result)
    }
}

/// Short source-like rendering of an operand for error messages.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Number(n) => n.to_string(),
        Expr::Boolean(b) => b.to_string(),
        Expr::Variable(name) => name.clone(),
        Expr::FunctionCall { name, .. } => format!("{}(...)", name),
        _ => "(...)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_is_16_byte_aligned() {
        assert_eq!(frame_size(0), 0);
        assert_eq!(frame_size(1), 16);
        assert_eq!(frame_size(2), 16);
        assert_eq!(frame_size(3), 32);
    }

    #[test]
    fn literal_zero_divisor_is_rejected() {
        let program = Program {
            return_type: Ty::Int,
            functions: vec![],
            main: MainFunction {
                locals: vec![],
                body: vec![Stmt::Return(Some(Expr::binary(
                    Expr::Number(1),
                    BinOpKind::Div,
                    Expr::Number(0),
                )))],
            },
        };
        let err = Codegen::new(CodegenOptions::default())
            .generate(&program)
            .unwrap_err();
        assert_eq!(err, CodegenError::DivisionByZero("1 / 0".to_string()));
    }
}
