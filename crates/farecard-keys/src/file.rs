//! Tab-separated key files
//!
//! One key per line with its four columns separated by tabs (spaces do not
//! separate columns). `#` starts a comment:
//!
//! ```text
//! # uid	sector	type	key
//! 04A1B2C3	1	A	A0A1A2A3A4A5
//! 04A1B2C3	*	B	B0B1B2B3B4B5
//! *	0	A	A0A1A2A3A4A5
//! ```
//!
//! A `*` uid applies to every card; a `*` sector marks a key shared by
//! several sectors.

use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::{CardKeys, Key, KeyResolver, KeyType, KEY_LEN};

/// Errors that can occur while loading a key file
#[derive(Debug, Error)]
pub enum KeyFileError {
    #[error("Failed to read key file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: expected 4 tab-separated columns, found {found}")]
    ColumnCount { line: usize, found: usize },

    #[error("Line {line}: invalid uid '{value}'")]
    InvalidUid { line: usize, value: String },

    #[error("Line {line}: invalid sector '{value}'")]
    InvalidSector { line: usize, value: String },

    #[error("Line {line}: key type must be A or B, found '{value}'")]
    InvalidKeyType { line: usize, value: String },

    // Never echoes the key text.
    #[error("Line {line}: key must be 6 bytes of hex")]
    InvalidKey { line: usize },
}

/// One parsed line of a key file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFileEntry {
    /// `None` matches any card
    pub uid: Option<Vec<u8>>,
    /// `None` for keys shared across sectors
    pub sector: Option<u8>,
    pub key: Key,
}

impl KeyFileEntry {
    fn applies_to(&self, tag_id: &[u8]) -> bool {
        self.uid.as_deref().map_or(true, |uid| uid == tag_id)
    }
}

/// Keys loaded from a tab-separated key file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFile {
    entries: Vec<KeyFileEntry>,
}

impl KeyFile {
    /// Read and parse a key file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KeyFileError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let file = Self::parse(&text)?;
        debug!(
            path = %path.as_ref().display(),
            entries = file.entries.len(),
            "Loaded key file"
        );
        Ok(file)
    }

    /// Parse key file contents
    pub fn parse(text: &str) -> Result<Self, KeyFileError> {
        let mut entries = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let content = raw.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }

            let parts: Vec<&str> = content.split('\t').map(str::trim).filter(|p| !p.is_empty()).collect();
            if parts.len() != 4 {
                return Err(KeyFileError::ColumnCount {
                    line,
                    found: parts.len(),
                });
            }

            let uid = match parts[0] {
                "*" => None,
                value => Some(hex::decode(value).map_err(|_| KeyFileError::InvalidUid {
                    line,
                    value: value.to_string(),
                })?),
            };

            let sector = match parts[1] {
                "*" => None,
                value => Some(value.parse::<u8>().map_err(|_| KeyFileError::InvalidSector {
                    line,
                    value: value.to_string(),
                })?),
            };

            let key_type = match parts[2] {
                "A" | "a" => KeyType::A,
                "B" | "b" => KeyType::B,
                value => {
                    return Err(KeyFileError::InvalidKeyType {
                        line,
                        value: value.to_string(),
                    })
                }
            };

            let mut bytes = [0u8; KEY_LEN];
            hex::decode_to_slice(parts[3], &mut bytes).map_err(|_| KeyFileError::InvalidKey { line })?;

            entries.push(KeyFileEntry {
                uid,
                sector,
                key: Key::new(key_type, bytes),
            });
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[KeyFileEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyResolver for KeyFile {
    /// Card-specific lines first, then wildcard lines, each in file order
    fn candidates_for(&self, tag_id: &[u8]) -> CardKeys {
        let mut keys = CardKeys::new();
        let specific = self.entries.iter().filter(|e| e.uid.is_some());
        let wildcard = self.entries.iter().filter(|e| e.uid.is_none());
        for entry in specific.chain(wildcard).filter(|e| e.applies_to(tag_id)) {
            keys.push(entry.sector, entry.key);
        }
        keys
    }
}
