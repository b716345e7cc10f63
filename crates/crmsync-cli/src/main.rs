//! crmsync command-line tools.
//!
//! Inspects the macro library and shortcut preferences persisted in a
//! crmsync SQLite database, and moves single macros in and out of it as
//! JSON. The database path defaults to `CRMSYNC_DB_PATH` (or `crmsync.db`).
//!
//! Exit codes: 0 = success, 1 = bad input or unknown macro, 3 = I/O or
//! database error.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crmsync_core::{MacroId, SyncConfig};
use crmsync_engine::{MacroError, MacroLibrary, ShortcutPreferences};
use crmsync_storage::SqliteStore;

/// crmsync storage tools.
#[derive(Parser)]
#[command(name = "crmsync", about = "Inspect and exchange persisted crmsync data")]
struct Cli {
    /// Path to the database file (default: $CRMSYNC_DB_PATH or crmsync.db).
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Work with recorded macros.
    Macros {
        #[command(subcommand)]
        command: MacroCommand,
    },
    /// Work with shortcut preferences.
    Prefs {
        #[command(subcommand)]
        command: PrefsCommand,
    },
}

#[derive(Subcommand)]
enum MacroCommand {
    /// List stored macros, oldest first.
    List,
    /// Print one macro as JSON.
    Show { id: MacroId },
    /// Export one macro as JSON.
    Export {
        id: MacroId,
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import a macro from a JSON file ("-" reads stdin).
    Import { file: PathBuf },
    /// Delete a macro.
    Delete { id: MacroId },
}

#[derive(Subcommand)]
enum PrefsCommand {
    /// Print the stored shortcut preferences.
    Show,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = match cli.db {
        Some(path) => path,
        None => match SyncConfig::from_env() {
            Ok(config) => config.db_path,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
    };

    let store = match SqliteStore::new(&db_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: failed to open database '{}': {}", db_path, e);
            process::exit(3);
        }
    };

    let mut out = io::stdout().lock();
    let exit_code = match cli.command {
        Commands::Macros { command } => run_macros(store, command, &mut out),
        Commands::Prefs { command: PrefsCommand::Show } => run_prefs_show(&store, &mut out),
    };
    process::exit(exit_code);
}

fn run_macros(store: SqliteStore, command: MacroCommand, out: &mut impl io::Write) -> i32 {
    let mut library = MacroLibrary::load(store);

    let result = match command {
        MacroCommand::List => {
            for mac in library.list() {
                let shortcut = mac.shortcut.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".into());
                let line = format!(
                    "{}  {:<24}  {:<12}  {:>3} steps  used {}x",
                    mac.id,
                    mac.name,
                    shortcut,
                    mac.actions.len(),
                    mac.times_used
                );
                if let Err(e) = writeln!(out, "{}", line) {
                    return io_error(e);
                }
            }
            Ok(())
        }
        MacroCommand::Show { id } | MacroCommand::Export { id, output: None } => {
            library.export(id).map(|json| print(out, &json))
        }
        MacroCommand::Export { id, output: Some(path) } => match library.export(id) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json) {
                    return io_error(e);
                }
                eprintln!("Exported {} to {}", id, path.display());
                Ok(())
            }
            Err(e) => Err(e),
        },
        MacroCommand::Import { file } => {
            let json = match read_input(&file) {
                Ok(json) => json,
                Err(e) => return io_error(e),
            };
            library.import(&json).map(|id| print(out, &id.to_string()))
        }
        MacroCommand::Delete { id } => library.delete(id).map(|mac| eprintln!("Deleted '{}'", mac.name)),
    };

    match result {
        Ok(()) => 0,
        Err(MacroError::Storage(e)) => {
            eprintln!("Error: {}", e);
            3
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn run_prefs_show(store: &SqliteStore, out: &mut impl io::Write) -> i32 {
    let prefs = ShortcutPreferences::load(store);
    match serde_json::to_string_pretty(&prefs) {
        Ok(json) => {
            print(out, &json);
            0
        }
        Err(e) => {
            eprintln!("Error: failed to serialize preferences: {}", e);
            1
        }
    }
}

fn print(out: &mut impl io::Write, text: &str) {
    if let Err(e) = writeln!(out, "{}", text) {
        tracing::warn!(error = %e, "failed to write output");
    }
}

fn read_input(path: &Path) -> io::Result<String> {
    if path == Path::new("-") {
        let mut json = String::new();
        io::stdin().read_to_string(&mut json)?;
        Ok(json)
    } else {
        fs::read_to_string(path)
    }
}

fn io_error(e: io::Error) -> i32 {
    eprintln!("I/O error: {}", e);
    3
}
