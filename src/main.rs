use std::error::Error;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use clap::Parser;
use clap_stdin::FileOrStdin;
use log::info;

use toyc::analyzer::SemanticVisitor;
use toyc::codegen::{Codegen, CodegenOptions};
use toyc::interpreter::Interpreter;
use toyc::lexer::Lexer;
use toyc::parser::{self, print_tree};
use toyc::CompileError;

/// Compiler for a small C-like language
///
/// Lowers the program to x86-64 flavoured assembly annotated with a
/// simulated execution trace.
#[derive(Parser, Debug)]
#[command(name = "toyc", version, about)]
struct Args {
    /// Source file (use "-" for stdin)
    #[arg(value_name = "INPUT", default_value = "-")]
    input: FileOrStdin,

    /// Print the token stream
    #[arg(long)]
    tokens: bool,

    /// Print the syntax tree
    #[arg(long)]
    tree: bool,

    /// Print the symbol table and its statistics
    #[arg(long)]
    symbols: bool,

    /// Print the generated assembly and trace (default)
    #[arg(long)]
    asm: bool,

    /// Run the program with the tree-walking interpreter
    #[arg(long)]
    interpret: bool,

    /// Enable every stage above
    #[arg(long)]
    all: bool,

    /// Write the output to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Maximum simulated iterations of a single loop
    #[arg(long, value_name = "N", default_value_t = CodegenOptions::default().max_loop_iterations)]
    max_iterations: usize,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn asm(&self) -> bool {
        self.all || self.asm || !(self.tokens || self.tree || self.symbols || self.interpret)
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let emit_asm = args.asm();
    let user_input = args.input.contents()?;
    let options = CodegenOptions {
        max_loop_iterations: args.max_iterations,
        ..Default::default()
    };
    let mut out = String::new();

    let tokens = Lexer::tokenize(&user_input).map_err(CompileError::from)?;
    if args.all || args.tokens {
        writeln!(out, "TOKENS")?;
        for token in &tokens {
            writeln!(out, "{:>4}  {:?}", token.pos.to_string(), token.kind)?;
        }
        writeln!(out)?;
    }

    let program = parser::Parser::new(tokens)
        .parse()
        .map_err(CompileError::from)?;
    if args.all || args.tree {
        writeln!(out, "{}", print_tree(&program))?;
    }

    let mut visitor = SemanticVisitor::new();
    if !visitor.analyze(&program) {
        return Err(CompileError::Semantic(visitor.into_diagnostics()).into());
    }
    info!("semantic analysis passed");

    if args.all || args.symbols {
        let table = visitor.symbol_table();
        writeln!(out, "SYMBOL TABLE")?;
        write!(out, "{}", table.dump())?;
        writeln!(out, "{}\n", table.statistics())?;
    }

    if args.all || args.interpret {
        let outcome = Interpreter::new(options.max_call_depth)
            .run(&program)
            .map_err(CompileError::from)?;
        writeln!(out, "INTERPRETER")?;
        for (name, value) in &outcome.variables {
            writeln!(out, "  {} = {}", name, value)?;
        }
        match outcome.return_value {
            Some(value) => writeln!(out, "  return value: {}", value)?,
            None => writeln!(out, "  return value: void")?,
        }
        writeln!(out)?;
    }

    if emit_asm {
        let assembly = Codegen::new(options)
            .generate(&program)
            .map_err(CompileError::from)?;
        write!(out, "{}", assembly)?;
    }

    match &args.output {
        Some(path) => {
            fs::write(path, &out)?;
            info!("wrote {}", path.display());
        }
        None => print!("{}", out),
    }
    Ok(())
}
