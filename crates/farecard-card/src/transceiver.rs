//! The byte-level boundary between the card protocol and the radio

use thiserror::Error;

/// Transport failures reported by a [`Transceiver`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransceiveError {
    #[error("Tag was removed from the field")]
    TagLost,

    #[error("Card did not answer in time")]
    Timeout,

    #[error("Transport error: {0}")]
    Io(String),

    #[error("Read was cancelled")]
    Cancelled,
}

impl TransceiveError {
    /// Whether the whole session has to be abandoned.
    ///
    /// Non-fatal errors only spoil the sector being read.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TagLost | Self::Cancelled)
    }
}

impl From<pcsc::Error> for TransceiveError {
    fn from(err: pcsc::Error) -> Self {
        match err {
            pcsc::Error::RemovedCard
            | pcsc::Error::ResetCard
            | pcsc::Error::NoSmartcard
            | pcsc::Error::ReaderUnavailable
            | pcsc::Error::UnpoweredCard => Self::TagLost,
            pcsc::Error::Timeout => Self::Timeout,
            pcsc::Error::Cancelled => Self::Cancelled,
            other => Self::Io(other.to_string()),
        }
    }
}

/// Sends one command frame and returns the card's raw answer.
///
/// Implementations are used strictly sequentially: one transceive at a time.
pub trait Transceiver {
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransceiveError>;
}

impl<T: Transceiver + ?Sized> Transceiver for &mut T {
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransceiveError> {
        (**self).transceive(command)
    }
}

impl<T: Transceiver + ?Sized> Transceiver for Box<T> {
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransceiveError> {
        (**self).transceive(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(TransceiveError::TagLost.is_fatal());
        assert!(TransceiveError::Cancelled.is_fatal());
        assert!(!TransceiveError::Timeout.is_fatal());
        assert!(!TransceiveError::Io("crc".into()).is_fatal());
    }

    #[test]
    fn test_pcsc_error_mapping() {
        assert_eq!(TransceiveError::from(pcsc::Error::RemovedCard), TransceiveError::TagLost);
        assert_eq!(TransceiveError::from(pcsc::Error::Timeout), TransceiveError::Timeout);
        assert!(matches!(
            TransceiveError::from(pcsc::Error::CommError),
            TransceiveError::Io(_)
        ));
    }
}
