use toyc::analyzer::{Diagnostic, SymbolError, SymbolTable, Ty};
use toyc::codegen::{Assembly, CodegenError, CodegenOptions, FlowState, Instruction, Reg, TraceEvent};
use toyc::parser::print_tree;
use toyc::value::Value;
use toyc::{check, compile, interpret, parse, CompileError};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn wrap_in_main(input: &str) -> String {
    format!("int main() {{{}}}", input)
}

fn generate(input: &str) -> Assembly {
    init();
    compile(input, CodegenOptions::default()).unwrap()
}

fn diagnostics(input: &str) -> Vec<Diagnostic> {
    init();
    let program = parse(input).unwrap();
    match check(&program) {
        Err(CompileError::Semantic(diagnostics)) => diagnostics,
        other => panic!("expected semantic errors, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn declared_before_use_passes_analysis() {
    init();
    let program = parse(&wrap_in_main("int x; bool b; x = 1; b = x < 2; return x;")).unwrap();
    assert!(check(&program).is_ok());
}

#[test]
fn undeclared_variable_is_reported() {
    let diagnostics = diagnostics(&wrap_in_main("int x; x = y + 1; return x;"));
    assert_eq!(diagnostics.len(), 1);
    assert!(matches!(
        &diagnostics[0],
        Diagnostic::Undeclared { name, .. } if name == "y"
    ));
    assert!(diagnostics[0].to_string().contains("'y'"));
}

#[test]
fn redeclaration_only_fails_in_the_same_scope() {
    init();
    let nested = wrap_in_main("int x; if (true) { int x; x = 3; } return x;");
    assert!(check(&parse(&nested).unwrap()).is_ok());

    let diagnostics = diagnostics(&wrap_in_main("int x; int x; return x;"));
    assert!(matches!(
        &diagnostics[..],
        [Diagnostic::Redeclared { name, .. }] if name == "x"
    ));
}

#[test]
fn call_problems_are_reported() {
    let diagnostics = diagnostics(
        "int add(int a, int b) { return a + b; }
         int main() { int r; r = add(1); r = missing(); return r; }",
    );
    assert_eq!(
        diagnostics,
        vec![
            Diagnostic::ArityMismatch {
                name: "add".to_string(),
                expected: 2,
                found: 1,
            },
            Diagnostic::UndeclaredFunction {
                name: "missing".to_string(),
            },
        ]
    );
}

#[test]
fn matched_scope_guards_restore_the_cursor() {
    let mut table = SymbolTable::new();
    let before = table.current();
    {
        let mut a = table.enter_scope("a");
        let mut b = a.enter_scope("b");
        let c = b.enter_scope("c");
        assert_eq!(c.current_level(), 3);
    }
    assert_eq!(table.current(), before);
    assert_eq!(
        table.exit_scope(),
        Err(SymbolError::NoParentScope("global".to_string()))
    );
}

#[test]
fn addition_is_stored_and_returned() {
    let asm = generate(&wrap_in_main("int x; x = 10 + 5; return x;"));
    assert_eq!(asm.return_value(), 15);
    assert_eq!(asm.variable("x"), Some(15));

    let listing = asm.to_string();
    assert!(listing.contains("#   x = 15"));
    assert!(listing.contains("# RESULT (return value): 15"));
}

#[test]
fn boolean_assignment_stores_one() {
    let asm = generate(&wrap_in_main("bool flag; flag = true; return 0;"));
    assert_eq!(asm.variable("flag"), Some(1));
}

#[test]
fn only_the_taken_branch_is_simulated() {
    let asm = generate(&wrap_in_main(
        "int x; if (false) { x = 1; } else { x = 2; } return x;",
    ));
    assert!(asm.trace.contains_marker("THEN BLOCK (not executed)"));
    assert!(asm.trace.contains_marker("ELSE BLOCK (executed)"));
    assert_eq!(asm.variable("x"), Some(2));

    // Both blocks are still in the listing.
    assert!(asm.contains(&Instruction::Movl(1)));
    assert!(asm.contains(&Instruction::Movl(2)));
}

#[test]
fn false_loop_condition_runs_zero_iterations() {
    let asm = generate(&wrap_in_main(
        "int i; while (false) { i = i + 1; } return i;",
    ));
    assert!(asm.trace.contains_marker("END WHILE (0 iterations)"));
    assert_eq!(asm.variable("i"), Some(0));
    assert!(asm.contains(&Instruction::Jmp(".L0".to_string())));
}

#[test]
fn loop_body_is_emitted_once_and_simulated_until_false() {
    let asm = generate(&wrap_in_main(
        "int i; int sum;
         i = 0; sum = 0;
         while (i < 5) { sum = sum + i; i = i + 1; }
         return sum;",
    ));
    assert!(asm.trace.contains_marker("END WHILE (5 iterations)"));
    assert_eq!(asm.variable("sum"), Some(10));
    assert_eq!(asm.return_value(), 10);

    let loop_labels = asm
        .lines
        .iter()
        .filter(|line| matches!(line, Instruction::Label(l) if l == ".L0"))
        .count();
    assert_eq!(loop_labels, 1);
}

#[test]
fn loop_simulation_stops_at_the_cap() {
    init();
    let options = CodegenOptions {
        max_loop_iterations: 10,
        ..Default::default()
    };
    let asm = compile(
        &wrap_in_main("int i; while (true) { i = i + 1; } return i;"),
        options,
    )
    .unwrap();
    assert_eq!(asm.variable("i"), Some(10));
    assert!(asm.render_trace().contains("iteration limit of 10 reached"));
}

#[test]
fn zero_iteration_cap_skips_the_body() {
    init();
    let options = CodegenOptions {
        max_loop_iterations: 0,
        ..Default::default()
    };
    let asm = compile(
        &wrap_in_main("int i; while (true) { i = i + 1; } return i;"),
        options,
    )
    .unwrap();
    assert_eq!(asm.variable("i"), Some(0));
    assert!(asm.trace.contains_marker("END WHILE (0 iterations)"));
    assert!(asm.render_trace().contains("iteration limit of 0 reached"));
}

#[test]
fn flow_states_follow_branches_and_loops() {
    let asm = generate(&wrap_in_main(
        "int i;
         if (i != 0) { i = 5; }
         if (i == 0) { i = 0; }
         while (i < 2) { i = i + 1; }
         return i;",
    ));
    let flow: Vec<FlowState> = asm
        .trace
        .events()
        .iter()
        .filter_map(|event| match event {
            TraceEvent::Flow(state) => Some(*state),
            _ => None,
        })
        .collect();

    use FlowState::*;
    assert_eq!(
        flow,
        vec![
            ConditionEval,
            BranchNotTaken,
            ConditionEval,
            BranchTaken,
            ConditionEval,
            Iterating,
            ConditionEval,
            Iterating,
            ConditionEval,
            Exit,
        ]
    );
    assert!(asm.trace.contains_marker("END WHILE (2 iterations)"));
}

#[test]
fn block_locals_stay_out_of_the_final_state() {
    let asm = generate(&wrap_in_main(
        "int i;
         while (i < 2) { int t; t = i + 1; i = t; }
         return i;",
    ));
    assert_eq!(asm.variable("i"), Some(2));
    assert_eq!(asm.variable("t"), None);
    assert!(!asm.to_string().contains("#   t = "));
}

#[test]
fn division_leaves_the_remainder_in_rdx() {
    let asm = generate(&wrap_in_main("int x; x = 7 / 2; return x;"));
    assert_eq!(asm.variable("x"), Some(3));
    assert_eq!(asm.machine.get(Reg::Rdx), 1);
    assert!(asm.to_string().contains("#   rdx = 1"));
}

#[test]
fn symbol_tables_keep_declaration_positions() {
    init();
    let source = "int main() {\n    int x;\n    x = 1;\n    return x;\n}";

    let entry_line = |dump: String| {
        dump.lines()
            .find(|line| line.contains("└─ x "))
            .map(str::to_string)
            .unwrap()
    };

    let table = check(&parse(source).unwrap()).unwrap();
    assert!(entry_line(table.dump()).ends_with("int      (line 2, col 9)"));

    let asm = compile(source, CodegenOptions::default()).unwrap();
    let line = entry_line(asm.symbol_table.dump());
    assert!(line.contains("@-8(%rbp)"));
    assert!(line.ends_with("= 1 (line 2, col 9)"));
}

#[test]
fn literal_zero_divisor_is_fatal() {
    init();
    let err = compile(&wrap_in_main("int x; x = 4 / 0; return x;"), CodegenOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        CompileError::Codegen(CodegenError::DivisionByZero(_))
    ));
}

#[test]
fn zero_divisor_seen_while_simulating_is_fatal() {
    init();
    let err = compile(
        &wrap_in_main("int x; int y; x = 4 / y; return x;"),
        CodegenOptions::default(),
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        CodegenError::DivisionByZero("4 / y".to_string()).to_string()
    );
}

#[test]
fn short_circuited_operands_are_not_simulated() {
    let asm = generate(
        "bool f() { return true; }
         int main() {
             bool a; bool b;
             a = false && f();
             b = true || f();
             return 0;
         }",
    );
    assert!(!asm.trace.contains_marker("CALL f"));
    assert!(asm.contains(&Instruction::Call("f".to_string())));
    assert_eq!(asm.variable("a"), Some(0));
    assert_eq!(asm.variable("b"), Some(1));
}

#[test]
fn function_calls_are_simulated() {
    let asm = generate(
        "int add(int a, int b) { return a + b; }
         int main() { int r; r = add(2, 3); return r; }",
    );
    assert!(asm.trace.contains_marker("CALL add"));
    assert_eq!(asm.variable("r"), Some(5));
    // Callee locals do not leak into the final state.
    assert_eq!(asm.variable("a"), None);
}

#[test]
fn recursion_agrees_with_the_interpreter() {
    init();
    let source = "int fact(int n) {
                      if (n <= 1) { return 1; }
                      return n * fact(n - 1);
                  }
                  int main() { return fact(5); }";

    let asm = compile(source, CodegenOptions::default()).unwrap();
    assert_eq!(asm.return_value(), 120);

    let outcome = interpret(source, CodegenOptions::default()).unwrap();
    assert_eq!(outcome.return_value, Some(Value::Int(120)));
}

#[test]
fn functions_can_call_later_definitions() {
    let asm = generate("int a() { return b(); } int b() { return 7; } int main() { return a(); }");
    assert_eq!(asm.return_value(), 7);
    assert!(asm.contains(&Instruction::Call("b".to_string())));
}

#[test]
fn mutual_recursion_is_simulated() {
    init();
    let source = "bool even(int n) { if (n == 0) { return true; } return odd(n - 1); }
                  bool odd(int n) { if (n == 0) { return false; } return even(n - 1); }
                  int main() { bool r; bool s; r = even(10); s = odd(7); return r; }";

    let asm = compile(source, CodegenOptions::default()).unwrap();
    assert_eq!(asm.variable("r"), Some(1));
    assert_eq!(asm.variable("s"), Some(1));

    let outcome = interpret(source, CodegenOptions::default()).unwrap();
    assert_eq!(outcome.variables.get("r"), Some(&Value::Bool(true)));
    assert_eq!(outcome.variables.get("s"), Some(&Value::Bool(true)));
}

#[test]
fn unbounded_recursion_hits_the_depth_cap() {
    init();
    let options = CodegenOptions {
        max_call_depth: 16,
        ..Default::default()
    };
    let err = compile(
        "int f(int n) { return f(n + 1); } int main() { return f(0); }",
        options,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CompileError::Codegen(CodegenError::CallDepthExceeded(16))
    ));
}

#[test]
fn void_program_has_no_result() {
    let asm = generate("void main() { int x; x = 3; }");
    assert_eq!(asm.return_type, Ty::Void);
    assert!(asm.to_string().contains("# RESULT: void"));
}

#[test]
fn interpreter_reports_final_variables() {
    init();
    let outcome = interpret(
        &wrap_in_main(
            "int i; bool done;
             while (!done) { i = i + 2; done = i >= 6; }
             return -i;",
        ),
        CodegenOptions::default(),
    )
    .unwrap();
    assert_eq!(outcome.return_value, Some(Value::Int(-6)));
    assert_eq!(outcome.variables.get("i"), Some(&Value::Int(6)));
    assert_eq!(outcome.variables.get("done"), Some(&Value::Bool(true)));
}

#[test]
fn syntax_errors_surface_as_parse_errors() {
    init();
    let err = parse(&wrap_in_main("int x; x = 1 return x;")).unwrap_err();
    assert!(matches!(err, CompileError::Parse(_)));
}

#[test]
fn tree_printer_names_nodes() {
    init();
    let program = parse(&wrap_in_main("int x; x = 1 + 2; return x;")).unwrap();
    let tree = print_tree(&program);
    assert!(tree.contains("ASSIGNMENT ➤ Variable: x"));
    assert!(tree.contains("BINARY_OPERATION ➤ Operator: +"));
    assert!(tree.contains("VARIABLE_DECLARATION"));
}
