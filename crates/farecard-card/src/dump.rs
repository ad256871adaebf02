//! JSON card dumps
//!
//! A dump holds the raw sectors of one read so the card can be re-analysed
//! later without the card present. Decoded fields are never stored; they
//! are recomputed from the block bytes on load.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::Card;

/// Current dump layout version
pub const DUMP_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("Failed to access dump file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed dump: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported dump version {0}")]
    UnsupportedVersion(u32),
}

/// Versioned wrapper around a [`Card`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDump {
    version: u32,
    card: Card,
}

impl CardDump {
    pub fn new(card: Card) -> Self {
        Self {
            version: DUMP_VERSION,
            card,
        }
    }

    pub fn card(&self) -> &Card {
        &self.card
    }

    pub fn into_card(self) -> Card {
        self.card
    }

    pub fn to_json(&self) -> Result<String, DumpError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, DumpError> {
        let dump: Self = serde_json::from_str(text)?;
        if dump.version != DUMP_VERSION {
            return Err(DumpError::UnsupportedVersion(dump.version));
        }
        Ok(dump)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DumpError> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        debug!(path = %path.as_ref().display(), "Saved card dump");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DumpError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }
}
