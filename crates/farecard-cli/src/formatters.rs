//! Output formatting for sectors, fields and amounts

use clap::ValueEnum;
use farecard_card::{Block, Sector, SectorState};
use farecard_common::Value;

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatMode {
    /// Raw hex output
    Raw,
    /// Human-readable formatted output
    Human,
}

impl FormatMode {
    pub fn description(&self) -> &'static str {
        match self {
            FormatMode::Raw => "Raw",
            FormatMode::Human => "Human-Readable",
        }
    }
}

/// One line per block: index, hex, and the record kind when known
pub fn format_block(block: &Block, kind: Option<&str>, mode: FormatMode) -> String {
    let data = hex::encode_upper(block.data());
    match (mode, kind) {
        (FormatMode::Human, Some(kind)) => format!("  {:>2}: {}  {}", block.index(), data, kind),
        (FormatMode::Human, None) if block.is_blank() => {
            format!("  {:>2}: {}  (blank)", block.index(), data)
        }
        _ => format!("  {:>2}: {}", block.index(), data),
    }
}

/// Header line for a sector
pub fn format_sector(sector: &Sector, mode: FormatMode) -> String {
    let state = match (sector.state(), mode) {
        (SectorState::Authorized { .. }, FormatMode::Raw) => "ok".to_string(),
        (SectorState::Authorized { .. }, FormatMode::Human) => match sector.key() {
            // Type only; the secret never leaves the key.
            Some(key) => format!("read with key {}", key.key_type()),
            None => "read".to_string(),
        },
        (SectorState::Unauthorized, FormatMode::Raw) => "unauthorized".to_string(),
        (SectorState::Unauthorized, FormatMode::Human) => "locked (no key worked)".to_string(),
        (SectorState::Invalid { reason }, _) => format!("invalid: {}", reason),
    };
    format!("Sector {:>2}: {}", sector.index(), state)
}

/// A decoded field value
pub fn format_value(value: &Value, mode: FormatMode) -> String {
    match (value, mode) {
        (Value::Hex { bytes, .. }, _) => hex::encode_upper(bytes),
        (Value::Unsigned(v), FormatMode::Raw) => format!("0x{:X}", v),
        (Value::Signed(v), FormatMode::Raw) => format!("{}", v),
        (Value::Date { raw, .. }, FormatMode::Raw) => format!("{}", raw),
        (other, FormatMode::Human) => other.to_string(),
    }
}
