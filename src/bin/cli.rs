//! appendkv CLI
//!
//! Opens a data directory, runs one command against it, and exits.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::ops::ControlFlow;
use std::process::ExitCode;

use appendkv::codec::Op;
use appendkv::{Config, Engine, Error, ErrorKind, SyncMode};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// appendkv CLI
#[derive(Parser, Debug)]
#[command(name = "appendkv-cli")]
#[command(about = "Append-only key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./appendkv_data")]
    data_dir: String,

    /// Durability per write: none, sync or async
    #[arg(short, long, default_value = "none")]
    sync: SyncMode,

    /// Open without write access; mutations fail
    #[arg(short, long)]
    read_only: bool,

    /// Worker id stamped into record IDs (0..=1023)
    #[arg(short, long, default_value = "0")]
    worker_id: i64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Check whether a key may exist
    Exists {
        /// The key to check
        key: String,
    },

    /// Count live keys
    Len,

    /// Copy the committed log to a file
    Snapshot {
        /// Output path
        out: String,
    },

    /// Print every record in the log
    Dump,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,appendkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .sync_mode(args.sync)
        .read_only(args.read_only)
        .worker_id(args.worker_id)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open storage: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&engine, args.command);
    let closed = engine.close();

    match result.and(closed) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            eprintln!("(not found)");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(engine: &Engine, command: Commands) -> Result<(), Error> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Get { key } => {
            let value = engine.get(key.as_bytes())?;
            out.write_all(&value)?;
            writeln!(out)?;
        }
        Commands::Set { key, value } => {
            engine.set(key.as_bytes(), value.as_bytes())?;
            writeln!(out, "OK")?;
        }
        Commands::Del { key } => {
            engine.delete(key.as_bytes())?;
            writeln!(out, "OK")?;
        }
        Commands::Exists { key } => {
            writeln!(out, "{}", engine.exists(key.as_bytes())?)?;
        }
        Commands::Len => {
            writeln!(out, "{}", engine.len()?)?;
        }
        Commands::Snapshot { out: path } => {
            let file = File::create(&path)
                .map_err(|e| Error::io("error creating snapshot file", e))?;
            let bytes = engine.snapshot(BufWriter::new(file))?;
            writeln!(out, "{} bytes written to {}", bytes, path)?;
        }
        Commands::Dump => {
            let written = engine.for_each(|_, record, err| {
                let line = match (record, err) {
                    (Some(r), _) => {
                        let op = match r.op {
                            Op::Set => "SET",
                            Op::Delete => "DEL",
                        };
                        writeln!(
                            out,
                            "{}\t{}\t{}\t{}",
                            r.id,
                            op,
                            String::from_utf8_lossy(&r.key),
                            r.value_len()
                        )
                    }
                    (None, Some(e)) => writeln!(out, "error: {}", e),
                    (None, None) => Ok(()),
                };
                match line {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(e) => ControlFlow::Break(e),
                }
            })?;

            if let Some(e) = written {
                return Err(e.into());
            }
        }
    }

    Ok(())
}
