use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use simple_logger::SimpleLogger;

use cscript::diagnostics::{Diagnostic, Severity};
use cscript::{compile, CompileOptions};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Source file to compile.
    file: PathBuf,

    /// Size of the code buffer in bytes.
    #[arg(long, default_value_t = 65536)]
    code_size: usize,

    /// Print the symbol table as JSON after a successful compile.
    #[arg(long)]
    dump_symbols: bool,

    /// Verbose logging (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    if SimpleLogger::new().with_level(level).init().is_err() {
        eprintln!("warning: could not initialize the logger");
    }

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}: {err:#}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let source = fs::read_to_string(&cli.file)
        .with_context(|| format!("could not read '{}'", cli.file.display()))?;
    let file_name = cli.file.to_string_lossy();
    let mut code = vec![0u8; cli.code_size];

    let mut print = |diagnostic: &Diagnostic| {
        let rendered = match diagnostic.severity {
            Severity::Error => {
                diagnostic
                    .rendered
                    .replacen("error", &"error".red().bold().to_string(), 1)
            }
            Severity::Warning => {
                diagnostic
                    .rendered
                    .replacen("warning", &"warning".yellow().bold().to_string(), 1)
            }
        };
        eprintln!("{rendered}\n");
    };

    let mut options = CompileOptions::new(&file_name);
    options.sink = Some(&mut print);
    let output = compile(&source, &mut code, options);

    if cli.dump_symbols && output.errors == 0 {
        println!("{}", serde_json::to_string_pretty(&output.symbols)?);
    }

    if output.errors > 0 {
        eprintln!(
            "{}: {} error(s)",
            "compilation failed".red().bold(),
            output.errors
        );
        return Ok(ExitCode::FAILURE);
    }
    eprintln!(
        "{}: {} byte(s) of code, {} symbol(s)",
        "ok".green().bold(),
        output.code_len,
        output.symbols.len()
    );
    Ok(ExitCode::SUCCESS)
}
