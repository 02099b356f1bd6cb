//! Command-line driver for the storage engine (§6).
//!
//! SQL lexing/parsing is an external collaborator this crate does not
//! implement (§1); what lives here is the ambient CLI plumbing around it —
//! argument parsing, exit codes, data-directory bootstrap, and stdin-line
//! dispatch through a pluggable [`StatementDispatcher`]. The only
//! dispatcher shipped in this crate, [`NullDispatcher`], handles nothing
//! but reports `@ fail` for every non-empty line, since there is no SQL
//! grammar behind it; a real parser crate would plug in here instead.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use dbcore::catalog::SystemManager;
use dbcore::common::config::DATA_ROOT;
use dbcore::error::{DbError, Result};

#[derive(Parser, Debug)]
#[command(
    name = "dbcore-cli",
    about = "Single-node relational storage engine core: REPL, batch runner, and CSV loader"
)]
struct Args {
    /// Wipe the data directory and recreate the global catalog, then exit.
    #[arg(long)]
    init: bool,

    /// Run statements from stdin, one per line, until `exit`.
    #[arg(short = 'b', long = "batch")]
    batch: bool,

    /// Load a CSV file into a table (requires -t/--table) and exit.
    #[arg(long = "file")]
    file: Option<PathBuf>,

    /// Table name for --file.
    #[arg(short = 't', long = "table")]
    table: Option<String>,

    /// Select the active database at startup.
    #[arg(long = "database")]
    database: Option<String>,
}

/// The extension point for a textual-statement front end (§9 "Parser
/// interface"). This crate never implements SQL grammar; it only defines
/// the call shape a parser crate would plug into.
trait StatementDispatcher {
    fn dispatch(&mut self, system: &mut SystemManager, statement: &str) -> Result<String>;
}

/// The only dispatcher shipped here: it recognizes nothing and always
/// fails, since no SQL grammar lives in this crate.
struct NullDispatcher;

impl StatementDispatcher for NullDispatcher {
    fn dispatch(&mut self, _system: &mut SystemManager, statement: &str) -> Result<String> {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            return Ok(String::new());
        }
        Err(DbError::Validation(format!(
            "no SQL parser registered for statement: {trimmed}"
        )))
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if args.init {
        return match run_init() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("!ERROR\n{e}");
                ExitCode::FAILURE
            }
        };
    }

    let mut system = match SystemManager::new() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("!ERROR\n{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(db) = &args.database {
        if let Err(e) = system.use_database(db) {
            eprintln!("!ERROR\n{e}");
            return ExitCode::FAILURE;
        }
    }

    if let Some(path) = &args.file {
        let table = match &args.table {
            Some(t) => t,
            None => {
                eprintln!("!ERROR\n--file requires -t/--table");
                return ExitCode::FAILURE;
            }
        };
        return match system.load_csv_into_table(table, path, ',') {
            Ok(count) => {
                println!("rows\n{count}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("!ERROR\n{e}");
                ExitCode::FAILURE
            }
        };
    }

    let mut dispatcher = NullDispatcher;
    if args.batch {
        run_batch(&mut system, &mut dispatcher);
    } else {
        run_repl(&mut system, &mut dispatcher);
    }
    ExitCode::SUCCESS
}

fn run_init() -> Result<()> {
    if std::path::Path::new(DATA_ROOT).exists() {
        std::fs::remove_dir_all(DATA_ROOT)?;
    }
    SystemManager::new()?;
    Ok(())
}

/// `--batch`: one statement per stdin line, emitting `@ success`/`@ fail`
/// per line, until a line of exactly `exit` (§6).
fn run_batch(system: &mut SystemManager, dispatcher: &mut dyn StatementDispatcher) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim() == "exit" {
            break;
        }
        match dispatcher.dispatch(system, &line) {
            Ok(_) => println!("@ success"),
            Err(_) => println!("@ fail"),
        }
    }
}

/// Interactive REPL: accumulate input until a `;`-terminated statement,
/// dispatch it, print the result, repeat until `exit` (§6).
fn run_repl(system: &mut SystemManager, dispatcher: &mut dyn StatementDispatcher) {
    let stdin = io::stdin();
    let mut buffer = String::new();
    loop {
        print!("{}", if buffer.is_empty() { "dbcore> " } else { "    -> " });
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(_) => break,
        }

        if buffer.is_empty() && line.trim() == "exit" {
            break;
        }

        buffer.push_str(&line);
        if let Some(idx) = buffer.find(';') {
            let statement = buffer[..idx].to_string();
            buffer = buffer[idx + 1..].to_string();
            match dispatcher.dispatch(system, &statement) {
                Ok(out) if !out.is_empty() => println!("{out}"),
                Ok(_) => {}
                Err(e) => println!("!ERROR\n{e}"),
            }
        }
    }
}
