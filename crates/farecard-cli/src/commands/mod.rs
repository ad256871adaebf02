pub mod history;
pub mod keys;
pub mod read;

use std::io::Write;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use farecard_card::{Card, CardReader, DumpError, PcscError, ReadError};
use farecard_keys::{KeyFile, KeyFileError};
use farecard_transit::{formats, ReadConfig, ReadEvent, ReadTask};
use thiserror::Error;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why a command gave up
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to establish PC/SC context: {0}")]
    Context(PcscError),

    #[error("Failed to connect to card: {0}")]
    Connect(PcscError),

    #[error("Failed to read card: {0}")]
    Read(#[from] ReadError),

    #[error("Failed to read card: {0}")]
    Session(String),

    #[error("Card read was cancelled")]
    Cancelled,

    #[error(transparent)]
    Dump(#[from] DumpError),

    #[error(transparent)]
    Keys(#[from] KeyFileError),

    #[error("Card is locked: {sectors} sector(s) could not be opened")]
    Locked { sectors: usize },

    #[error("Card format not recognized")]
    Unrecognized,
}

impl CliError {
    /// Extra advice printed after the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CliError::Connect(_) => Some("Please ensure a card is present on the reader"),
            CliError::Locked { .. } => Some("Add the card's keys to a key file and set keys_file in the configuration"),
            _ => None,
        }
    }
}

/// Key file named by the configuration, or no stored keys
pub(crate) fn load_keys(config: &ReadConfig) -> Result<KeyFile, CliError> {
    match &config.keys_file {
        Some(path) => Ok(KeyFile::load(path)?),
        None => Ok(KeyFile::default()),
    }
}

/// Read the card on the first reader on a worker thread, showing progress.
///
/// Ctrl+C cancels the read.
pub(crate) fn read_live_card(config: &ReadConfig) -> Result<Card, CliError> {
    let keys = load_keys(config)?;
    let reader = CardReader::new().map_err(CliError::Context)?;
    let (mut transceiver, reader_name) = reader.connect_first().map_err(CliError::Connect)?;
    println!("Reader: {}", reader_name);

    let uid = farecard_card::read_uid(&mut transceiver)?;
    let card_type = transceiver.card_type();
    println!("Card: {} ({:?})\n", hex::encode_upper(&uid), card_type);

    let interrupt = interrupt_channel();
    let task = ReadTask::spawn(transceiver, uid, card_type, keys, formats::all(), config);
    let card = drive_read(task, &interrupt, config.cancel_timeout());
    eprintln!();
    card
}

/// Fires once when the user presses Ctrl+C
fn interrupt_channel() -> Receiver<()> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "Ctrl+C handling unavailable");
                return;
            }
        };
        if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
            info!("Received Ctrl+C, cancelling read...");
            let _ = tx.send(());
        }
    });
    rx
}

/// Follow a running read until it ends or `interrupt` fires
fn drive_read(task: ReadTask, interrupt: &Receiver<()>, cancel_timeout: Duration) -> Result<Card, CliError> {
    loop {
        if interrupt.try_recv().is_ok() {
            if !task.cancel(cancel_timeout) {
                warn!("Card read did not stop cleanly");
            }
            return Err(CliError::Cancelled);
        }

        match task.recv_timeout(POLL_INTERVAL) {
            Ok(ReadEvent::Progress { current, total }) => {
                eprint!("\rReading sector {}/{}", current, total);
                let _ = std::io::stderr().flush();
            }
            Ok(ReadEvent::CardGuess { format }) => {
                info!(format, "Looks like a known card");
            }
            Ok(ReadEvent::Finished(outcome)) => return Ok(outcome.card),
            Ok(ReadEvent::Failed { message }) => return Err(CliError::Session(message)),
            Ok(ReadEvent::Cancelled) | Err(RecvTimeoutError::Disconnected) => {
                return Err(CliError::Cancelled)
            }
            Err(RecvTimeoutError::Timeout) => continue,
        }
    }
}
