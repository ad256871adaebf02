//! Farecard Card - Sector-oriented transit card access
//!
//! This crate talks to MIFARE Classic style cards through a PC/SC reader (or
//! any other [`Transceiver`]), authenticates each sector with the best key it
//! can find, and collects the result into an immutable [`Card`] that can be
//! saved as a JSON dump and analysed later.

pub mod apdu;
pub mod dump;
pub mod emulator;
pub mod model;
pub mod reader;
pub mod session;
pub mod transceiver;

pub use dump::{CardDump, DumpError};
pub use emulator::{Fault, VirtualCard};
pub use model::{Block, BlockAddress, Card, CardType, Sector, SectorState, BLOCK_SIZE};
pub use reader::{CardReader, PcscTransceiver};
pub use session::{read_card, read_uid, AccessOptions, NoopObserver, ReadObserver, SectorAccessor};
pub use transceiver::{TransceiveError, Transceiver};

use thiserror::Error;

/// Errors that end a read session
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Communication with card failed: {0}")]
    Communication(#[from] TransceiveError),

    #[error("Card reader error: {0}")]
    Reader(#[from] pcsc::Error),

    #[error("Card did not report a UID (status {0})")]
    NoUid(String),

    #[error(transparent)]
    Dump(#[from] DumpError),
}

impl ReadError {
    /// Whether the read stopped because it was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Communication(TransceiveError::Cancelled))
    }
}

/// Re-export commonly used types
pub use pcsc::Error as PcscError;
