//! Farecard Keys - Sector key material and key resolution
//!
//! Sector-based transit cards protect every sector with a pair of 6-byte keys
//! (Key A and Key B). This crate holds those keys, the built-in fallback keys
//! tried when nothing better is known, and the [`KeyResolver`] seam through
//! which a reader asks for the keys of a particular card.
//!
//! Key bytes never appear in `Debug` or `Display` output.
//!
//! # Example
//! ```
//! use farecard_keys::{CardKeys, Key, KeyResolver, KeyType};
//!
//! let mut keys = CardKeys::new();
//! keys.push(Some(1), Key::new(KeyType::B, [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]));
//!
//! let resolved = keys.candidates_for(&[0x04, 0x11, 0x22, 0x33]);
//! assert_eq!(resolved.for_sector(1).map(|k| k.key_type()), Some(KeyType::B));
//! assert!(resolved.for_sector(2).is_none());
//! ```

pub mod file;

pub use file::{KeyFile, KeyFileError};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of a sector key in bytes
pub const KEY_LEN: usize = 6;

/// Which of the two sector keys a [`Key`] is used as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyType {
    A,
    B,
}

impl KeyType {
    /// Authentication command code for this key type
    pub fn auth_code(self) -> u8 {
        match self {
            KeyType::A => 0x60,
            KeyType::B => 0x61,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::A => write!(f, "A"),
            KeyType::B => write!(f, "B"),
        }
    }
}

/// A sector key: the secret and the slot it authenticates as
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    #[serde(rename = "type")]
    key_type: KeyType,
    #[serde(with = "hex")]
    bytes: [u8; KEY_LEN],
}

impl Key {
    pub const fn new(key_type: KeyType, bytes: [u8; KEY_LEN]) -> Self {
        Self { key_type, bytes }
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Raw secret, for sending to the reader only
    pub fn bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("key_type", &self.key_type)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key {} (******)", self.key_type)
    }
}

/// All-zero key
pub const ZERO_KEY: [u8; KEY_LEN] = [0x00; KEY_LEN];

/// Factory default transport key
pub const FACTORY_KEY: [u8; KEY_LEN] = [0xFF; KEY_LEN];

/// Built-in fallback keys in the order they are tried
pub const DEFAULT_KEYS: [Key; 4] = [
    Key::new(KeyType::A, ZERO_KEY),
    Key::new(KeyType::B, ZERO_KEY),
    Key::new(KeyType::A, FACTORY_KEY),
    Key::new(KeyType::B, FACTORY_KEY),
];

/// A key together with the sector it is known to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEntry {
    /// `None` when the key is not tied to a sector
    pub sector: Option<u8>,
    pub key: Key,
}

/// Ordered candidate keys known for one card
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardKeys {
    entries: Vec<KeyEntry>,
}

impl CardKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sector: Option<u8>, key: Key) {
        self.entries.push(KeyEntry { sector, key });
    }

    /// The sector-specific key: Key A if known, otherwise Key B
    pub fn for_sector(&self, sector: u8) -> Option<&Key> {
        let mut for_this = self.entries.iter().filter(|e| e.sector == Some(sector));
        let first = for_this.clone().find(|e| e.key.key_type() == KeyType::A);
        first.or_else(|| for_this.next()).map(|e| &e.key)
    }

    /// Every candidate key, in insertion order
    pub fn all(&self) -> impl Iterator<Item = &Key> {
        self.entries.iter().map(|e| &e.key)
    }

    pub fn entries(&self) -> &[KeyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Source of candidate keys for a card, looked up by tag identifier
pub trait KeyResolver {
    /// Candidate keys for the card with `tag_id`; may be empty
    fn candidates_for(&self, tag_id: &[u8]) -> CardKeys;
}

/// A fixed key set applies to every card
impl KeyResolver for CardKeys {
    fn candidates_for(&self, _tag_id: &[u8]) -> CardKeys {
        self.clone()
    }
}

/// Resolver with no stored keys; only the built-in defaults will be tried
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKeys;

impl KeyResolver for NoKeys {
    fn candidates_for(&self, _tag_id: &[u8]) -> CardKeys {
        CardKeys::new()
    }
}
