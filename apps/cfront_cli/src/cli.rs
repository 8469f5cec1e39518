//! Command-line argument parsing and dispatch for `cfrontc`.
//!
//! Built on [`clap`]'s derive API, the same shape the `largo` CLI uses:
//! a top-level [`Cli`] struct with one `run_cli` entry point that parses
//! arguments and dispatches to compile each input file in turn.

use std::path::PathBuf;

use clap::Parser;
use log::info;

use cfront_core::error::{Diagnostic, Severity};
use cfront_core::session::Session;

/// Command-line interface for the cfront C front end.
#[derive(Parser)]
#[command(name = "cfrontc")]
#[command(about = "C front end: preprocessor and parser over C89 source", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Input source files to compile.
    pub files: Vec<PathBuf>,

    /// Adds a directory to the `#include` search path. Repeatable.
    #[arg(short = 'I', long = "include")]
    pub include: Vec<PathBuf>,

    /// Raises logging verbosity (trace-level preprocessor/parser events).
    #[arg(short, long)]
    pub verbose: bool,

    /// Prints the post-preprocessing token stream instead of parsing.
    #[arg(long)]
    pub dump_tokens: bool,

    /// Prints the parsed AST's top-level items instead of just diagnostics.
    #[arg(long)]
    pub dump_ast: bool,
}

/// Parses arguments and compiles each input file, returning the process
/// exit code (§6): `0` on success, `1` on lexical/syntactic errors or
/// failed file I/O, `2` on an internal/fatal error.
pub fn run_cli() -> i32 {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if cli.files.is_empty() {
        eprintln!("cfrontc: no input files");
        return 1;
    }

    let mut exit_code = 0;
    for file in &cli.files {
        let code = compile_one(file, &cli);
        exit_code = exit_code.max(code);
    }
    exit_code
}

fn compile_one(path: &PathBuf, cli: &Cli) -> i32 {
    let mut session = Session::with_search_path(cli.include.clone());

    if cli.dump_tokens {
        return dump_tokens(&mut session, path);
    }

    let tu = match session.compile_file(path) {
        Ok(tu) => tu,
        Err(err @ cfront_core::CoreError::Internal(_)) => {
            eprintln!("{}: error: {}", path.display(), err);
            return 2;
        }
        Err(err) => {
            eprintln!("{}: error: {}", path.display(), err);
            return 1;
        }
    };

    for diag in session.diags.entries() {
        print_diagnostic(&session, diag);
    }

    if cli.dump_ast {
        println!("{:#?}", tu);
    }

    if cli.verbose {
        info!(
            "{}: {} error(s), {} warning(s)",
            path.display(),
            session.diags.error_count(),
            session.diags.warning_count()
        );
    }

    if session.diags.has_errors() {
        1
    } else {
        0
    }
}

fn dump_tokens(session: &mut Session, path: &PathBuf) -> i32 {
    use cfront_core::file::FileContents;
    use cfront_core::preprocessor::Preprocessor;
    use cfront_core::file::StdFileLoader;

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("{}: error: {}", path.display(), e);
            return 1;
        }
    };
    let file_id = session.store.add(path.clone(), FileContents::from_bytes(&bytes));
    let mut pp = Preprocessor::new(file_id, Vec::new(), Box::new(StdFileLoader));

    while let Some(tok) = pp.next_token(&mut session.store, &mut session.interner, &mut session.diags) {
        println!("{:?} {:?}", tok.kind, tok.payload);
    }

    for diag in session.diags.entries() {
        print_diagnostic(session, diag);
    }

    if session.diags.has_errors() {
        1
    } else {
        0
    }
}

fn print_diagnostic(session: &Session, diag: &Diagnostic) {
    let path = session.store.path(diag.primary_span.file_id());
    let loc = diag.primary_span.start;
    let severity = match diag.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Note => "note",
    };
    eprintln!(
        "{}:{}:{}: {}: {}",
        path.display(),
        loc.line + 1,
        loc.column + 1,
        severity,
        diag.message
    );
    if let Some(expansion_span) = diag.expansion_span {
        let exp_loc = expansion_span.start;
        eprintln!(
            "{}:{}:{}: note: in macro expansion",
            path.display(),
            exp_loc.line + 1,
            exp_loc.column + 1
        );
    }
}
