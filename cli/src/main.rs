use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use lumen_core::chunk::NativeRegistry;
use lumen_core::diag::{self, Diagnostic};
use lumen_core::{compiler, BytecodeFile, Vm};

/// Run Lumen scripts.
#[derive(Parser, Debug)]
#[command(name = "lumen")]
#[command(about = "Compile and run a Lumen script", long_about = None)]
struct Args {
    /// Script to compile and execute. Omit to read an interactive prompt stub from stdin.
    path: Option<PathBuf>,

    /// Print the compiled chunk's disassembly before running it.
    #[arg(long)]
    debug_print: bool,
}

fn main() -> ExitCode {
    let filter = tracing_subscriber::EnvFilter::try_from_env("LUMEN_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{e}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprint!("{e}");
            return ExitCode::from(64);
        }
    };

    match args.path {
        Some(path) => run_file(&path, args.debug_print),
        None => {
            repl();
            ExitCode::SUCCESS
        }
    }
}

/// Literal prompt stub: echo each line back, stop at the first blank line.
fn repl() {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        use std::io::Write;
        let _ = std::io::stdout().flush();

        let Some(Ok(line)) = lines.next() else {
            println!();
            return;
        };
        if line.is_empty() {
            println!();
            return;
        }
        println!("{line}");
    }
}

fn run_file(path: &PathBuf, debug_print: bool) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("could not open file \"{}\": {e}", path.display());
            return ExitCode::from(74);
        }
    };

    let source_name = path.display().to_string();

    let stmts = match lumen_syntax::parse_source(&source) {
        Ok(stmts) => stmts,
        Err(err) => {
            report_source_error(&source_name, &source, &err);
            return ExitCode::from(65);
        }
    };

    let file = match compiler::compile(&stmts, NativeRegistry::with_standard_library()) {
        Ok(file) => file,
        Err(err) => {
            diag::render(&source_name, &source, &Diagnostic::from_compile_error(&err, &source));
            return ExitCode::from(65);
        }
    };

    if debug_print {
        eprint!("{}", lumen_core::disassemble_program(&file.functions, &file.constants, &file.strings));
    }

    let dump_path = std::path::Path::new("bytecode.dat");
    if let Err(e) = file.write_to(dump_path) {
        eprintln!("could not write {}: {e}", dump_path.display());
        return ExitCode::from(74);
    }

    let file = match BytecodeFile::read_from(dump_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("could not read {}: {e}", dump_path.display());
            return ExitCode::from(74);
        }
    };

    let mut vm = Vm::new(file, NativeRegistry::with_standard_library());
    match vm.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            diag::render(&source_name, &source, &Diagnostic::from_runtime_error(&err, &source));
            ExitCode::from(70)
        }
    }
}

fn report_source_error(source_name: &str, source: &str, err: &lumen_syntax::SourceError) {
    let diagnostic = match err {
        lumen_syntax::SourceError::Lex(e) => Diagnostic::from(e),
        lumen_syntax::SourceError::Parse(e) => Diagnostic::from(e),
    };
    diag::render(source_name, source, &diagnostic);
}
