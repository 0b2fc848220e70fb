//! Console: run patterns from a file or interactively.
//!
//! Usage: console [--file <pattern>] [--dict <ron>]... [--config <ron>] [--seed <n>]
//!
//! Without `--file`, reads one pattern per line. Each run uses the current
//! seed and then advances it by one.
//!
//! Commands:
//!   :seed <n>   set the seed
//!   :src        show the last pattern run
//!   :help       list commands
//!   :quit       exit

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use textloom::{Engine, Failure, Output, Visibility};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "console")]
#[command(about = "Run textloom patterns from a file or a prompt")]
struct Args {
    /// Pattern file to run once
    #[arg(long, short = 'f')]
    file: Option<PathBuf>,

    /// Dictionary file (can be given several times)
    #[arg(long, short = 'd')]
    dict: Vec<PathBuf>,

    /// Engine configuration in RON
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Run seed
    #[arg(long, short = 's', default_value = "0")]
    seed: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut builder = Engine::builder();
    if let Some(path) = &args.config {
        builder = builder.config_path(path);
    }
    for path in &args.dict {
        builder = builder.dictionary_path(path);
    }
    let engine = match builder.build() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    match &args.file {
        Some(path) => run_file(&engine, path, args.seed),
        None => repl(&engine, args.seed),
    }
}

fn run_file(engine: &Engine, path: &PathBuf, seed: u64) {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("ERROR: cannot read '{}': {}", path.display(), e);
            process::exit(1);
        }
    };
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "main".to_string());

    let pattern = match engine.compile(&name, &source) {
        Ok(pattern) => pattern,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };
    if !report(engine.run(&pattern, seed)) {
        process::exit(1);
    }
}

fn repl(engine: &Engine, seed: u64) {
    println!("Seed: {}", seed);
    if !engine.has_vocabulary() {
        println!("No dictionary loaded; queries will fail.");
    }
    println!("Type ':help' for commands.\n");

    let mut seed = seed;
    let mut last = String::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("loom> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }

        let mut parts = line.split_whitespace();
        match parts.next() {
            Some(":quit") | Some(":q") => break,
            Some(":help") | Some(":h") => print_help(),
            Some(":seed") => match parts.next().map(str::parse::<u64>) {
                Some(Ok(n)) => {
                    seed = n;
                    println!("Seed set to {}", seed);
                }
                Some(Err(_)) => println!("Invalid seed"),
                None => println!("Current seed: {}", seed),
            },
            Some(":src") => println!("{}", last),
            _ => {
                report(engine.run_str(line, seed));
                seed = seed.wrapping_add(1);
                last = line.to_string();
            }
        }
    }
}

/// Print a run's channels. Returns whether the run succeeded.
fn report(result: Result<Output, Failure>) -> bool {
    match result {
        Ok(output) => {
            print_output(&output);
            true
        }
        Err(failure) => {
            print_output(&failure.partial);
            eprintln!("ERROR: {}", failure.error);
            false
        }
    }
}

fn print_output(output: &Output) {
    println!("{}", output.main());
    for channel in output.iter().filter(|c| c.name != "main") {
        let visibility = match channel.visibility {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Internal => "internal",
        };
        println!("  [{} ({})] {}", channel.name, visibility, channel.text);
    }
}

fn print_help() {
    println!("Enter a pattern to run it with the current seed.");
    println!("  :seed <n>   set the seed (no argument shows it)");
    println!("  :src        show the last pattern run");
    println!("  :help       this message");
    println!("  :quit       exit");
}
