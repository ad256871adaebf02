use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use farecard_transit::ReadConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod formatters;
use formatters::FormatMode;

#[derive(Parser)]
#[command(name = "farecard")]
#[command(about = "Transit Card Reader - Reconstruct travel history from contactless fare cards")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to farecard.toml in the config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read every sector of the card on the first reader
    Read {
        /// Save the card as a JSON dump
        #[arg(short, long)]
        save: Option<PathBuf>,

        /// Output format mode
        #[arg(short, long, value_enum, default_value_t = FormatMode::Human)]
        format: FormatMode,
    },
    /// Show trips, balance, top-ups and passes
    History {
        /// Analyse a saved dump instead of reading a card
        #[arg(short, long)]
        dump: Option<PathBuf>,

        /// Output format mode
        #[arg(short, long, value_enum, default_value_t = FormatMode::Human)]
        format: FormatMode,
    },
    /// List the entries of a key file without their secrets
    Keys {
        /// Tab-separated key file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    // Set RUST_LOG=debug for per-sector logs, RUST_LOG=trace for every APDU
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ReadConfig::load(path),
        None => ReadConfig::load_default(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let result = match args.command {
        Command::Read { save, format } => commands::read::cmd_read(&config, save.as_deref(), format),
        Command::History { dump, format } => {
            commands::history::cmd_history(&config, dump.as_deref(), format)
        }
        Command::Keys { file } => commands::keys::cmd_keys(&file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err);
            if let Some(hint) = err.hint() {
                eprintln!("{}", hint);
            }
            ExitCode::FAILURE
        }
    }
}
