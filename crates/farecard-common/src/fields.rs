//! Decoded field values

use std::fmt;

use crate::schema::TimeUnit;

/// A decoded field value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    /// `bits` bits, right-aligned in `ceil(bits / 8)` bytes
    Hex { bits: usize, bytes: Vec<u8> },
    /// Raw counter relative to a format epoch
    Date { unit: TimeUnit, raw: u64 },
}

impl Value {
    /// Integer view of numeric and date values
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned(v) => Some(*v),
            Self::Signed(v) => u64::try_from(*v).ok(),
            Self::Date { raw, .. } => Some(*raw),
            Self::Hex { .. } => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Signed(v) => Some(*v),
            Self::Unsigned(v) => i64::try_from(*v).ok(),
            Self::Date { raw, .. } => i64::try_from(*raw).ok(),
            Self::Hex { .. } => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Hex { bytes, .. } => Some(bytes),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Hex { bytes, .. } => write!(f, "{}", hex::encode_upper(bytes)),
            Self::Date { unit, raw } => write!(f, "{raw} {unit:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: &'static str,
    // Index path of the leaf inside its schema; `None` for hand-built values.
    path: Option<Vec<u16>>,
    value: Value,
}

/// Insertion-ordered field values produced by decoding a buffer.
///
/// A field absent from the buffer (its bitmap bit was clear) has no entry at
/// all, which keeps it distinct from a present zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFields {
    entries: Vec<Entry>,
}

impl ParsedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value by name, for building records to encode by hand
    pub fn insert(&mut self, name: &'static str, value: Value) {
        self.entries.push(Entry {
            name,
            path: None,
            value,
        });
    }

    pub(crate) fn push_at(&mut self, name: &'static str, path: Vec<u16>, value: Value) {
        self.entries.push(Entry {
            name,
            path: Some(path),
            value,
        });
    }

    /// First value recorded under `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn int(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    pub fn signed(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn hex(&self, name: &str) -> Option<&[u8]> {
        self.get(name).and_then(Value::as_bytes)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs in decode order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.entries.iter().map(|e| (e.name, &e.value))
    }

    /// Value for the leaf at `path`, falling back to a hand-built value by name
    pub(crate) fn lookup(&self, name: &str, path: &[u16]) -> Option<&Value> {
        self.entries
            .iter()
            .find(|e| e.path.as_deref() == Some(path))
            .or_else(|| self.entries.iter().find(|e| e.path.is_none() && e.name == name))
            .map(|e| &e.value)
    }

    /// Whether any decoded leaf lives under `prefix`
    pub(crate) fn has_under(&self, prefix: &[u16]) -> bool {
        self.entries
            .iter()
            .filter_map(|e| e.path.as_deref())
            .any(|p| p.starts_with(prefix))
    }

    /// Whether any hand-built value matches one of the names for which `declared` holds
    pub(crate) fn has_loose(&self, declared: impl Fn(&str) -> bool) -> bool {
        self.entries
            .iter()
            .any(|e| e.path.is_none() && declared(e.name))
    }
}
