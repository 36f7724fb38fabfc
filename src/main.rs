//! The `itmoscript` binary: lex/parse/run a script file, or drop into a
//! REPL when no file is given (spec.md §6.2).

use clap::Parser as ClapParser;
use colored::Colorize;
use crossterm::tty::IsTty;
use dialoguer::BasicHistory;
use itmoscript::{interpret, start_repl, Diagnostic, Evaluator, ReplMode};
use itmoscript_parser::Lexer;
use std::fs;
use std::io;
use std::process::ExitCode;

#[derive(ClapParser, Debug)]
#[command(name = "itmoscript", about = "A small dynamically-typed scripting language", version)]
struct Cli {
    /// Script to run. Omit to start the REPL.
    file: Option<String>,

    /// Print the token stream instead of evaluating.
    #[arg(short = 'l', long = "lexer")]
    lexer: bool,

    /// Print the parsed AST instead of evaluating.
    #[arg(short = 'p', long = "parser")]
    parser: bool,

    /// Seed the `rnd` builtin's RNG for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// Disable ANSI coloring in diagnostic output.
    #[arg(long = "no-color")]
    no_color: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).with_writer(io::stderr).init();

    let cli = Cli::parse();
    let color = !cli.no_color && io::stdout().is_tty();

    match &cli.file {
        Some(path) => run_file(&cli, path, color),
        None => run_repl(&cli),
    }
}

fn run_file(cli: &Cli, path: &str, color: bool) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            return ExitCode::FAILURE;
        }
    };

    if cli.lexer {
        return print_tokens(&source);
    }
    if cli.parser {
        return print_ast(&source);
    }

    tracing::debug!(path, "running script");
    match interpret(&source, io::stdin().lock(), io::stdout(), cli.seed) {
        Ok(_) => ExitCode::SUCCESS,
        Err(diagnostic) => {
            eprint!("{}", diagnostic.render(color));
            ExitCode::FAILURE
        }
    }
}

fn run_repl(cli: &Cli) -> ExitCode {
    let mode = if cli.lexer {
        ReplMode::Lexer
    } else if cli.parser {
        ReplMode::Parser
    } else {
        ReplMode::Eval
    };
    // Line editing with history only makes sense against a real terminal;
    // piped input (scripts, test harnesses) goes through the plain
    // line-at-a-time path the library exposes directly.
    if mode == ReplMode::Eval && io::stdin().is_tty() {
        return run_interactive_repl(cli);
    }
    match start_repl(mode, io::stdin().lock(), io::stdout(), cli.seed) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run_interactive_repl(cli: &Cli) -> ExitCode {
    let color = !cli.no_color;
    let mut evaluator = Evaluator::new(Box::new(io::stdout()), Box::new(io::stdin().lock()), cli.seed);
    let mut history = BasicHistory::new().max_entries(200);
    loop {
        let line: String = match dialoguer::Input::<String>::new().with_prompt(">>>").history_with(&mut history).allow_empty(true).interact_text() {
            Ok(line) => line,
            Err(_) => return ExitCode::SUCCESS,
        };
        if line.trim().is_empty() {
            continue;
        }
        match itmoscript_parser::parse_source(&line) {
            Ok(program) => match evaluator.run(&program) {
                Ok(value) => println!("{value}"),
                Err(error) => eprint!("{}", Diagnostic::Runtime { error, call_stack: evaluator.call_stack().to_vec() }.render(color)),
            },
            Err(e) => eprintln!("{e}"),
        }
    }
}

fn print_tokens(source: &str) -> ExitCode {
    match Lexer::new(source).tokenize() {
        Ok(tokens) => {
            for token in &tokens {
                println!("{} {:?} {}", token.kind, token.text, token.span);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", Diagnostic::from(e));
            ExitCode::FAILURE
        }
    }
}

fn print_ast(source: &str) -> ExitCode {
    match itmoscript_parser::parse_source(source) {
        Ok(program) => {
            println!("{program:#?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

