//! Turning authorized blocks into typed records

use farecard_card::{Block, BlockAddress, Card};
use farecard_common::{decode, CodecError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::format::CardFormat;
use crate::record::{field, Record, RecordData, RecordKind};

/// Why a block did not become a record
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record truncated: needed {needed} bits, only {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("malformed record: {reason}")]
    Malformed { reason: String },
}

impl From<CodecError> for RecordError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::TruncatedBuffer { needed, available } => {
                RecordError::Truncated { needed, available }
            }
            other => RecordError::Malformed {
                reason: other.to_string(),
            },
        }
    }
}

/// A block that looked like a record but was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dropped {
    pub address: BlockAddress,
    pub kind: RecordKind,
    pub error: RecordError,
}

/// Output of [`classify`]
#[derive(Debug, Clone, Default)]
pub struct Classified {
    pub records: Vec<Record>,
    pub dropped: Vec<Dropped>,
    /// Copies of the classified blocks tagged with their record kind
    pub blocks: Vec<(BlockAddress, Block)>,
}

/// Decode one block as a record of `kind`
pub fn classify_block(
    address: BlockAddress,
    block: &Block,
    kind: RecordKind,
    format: &CardFormat,
) -> Result<Record, RecordError> {
    let schema = (format.schema)(kind).ok_or_else(|| RecordError::Malformed {
        reason: format!("{} has no {} layout", format.name, kind),
    })?;
    let fields = decode(schema, block.data())?;
    (format.validate)(kind, &fields).map_err(|reason| RecordError::Malformed { reason })?;

    let timestamp = fields
        .get(field::TIMESTAMP)
        .and_then(|v| format.epoch.resolve_value(v));
    let expiry = fields
        .get(field::EXPIRY)
        .and_then(|v| format.epoch.resolve_value(v));
    let data = RecordData::new(address, fields)
        .with_timestamp(timestamp)
        .with_expiry(expiry);
    Ok(Record::new(kind, data))
}

/// Classify every readable block of `card` with `format`'s dispatch table.
///
/// Blank blocks are skipped. Blocks that fail to decode or validate are
/// logged and listed in [`Classified::dropped`]; they never fail the card.
pub fn classify(card: &Card, format: &CardFormat) -> Classified {
    let mut out = Classified::default();

    for (address, block) in card.blocks() {
        let Some(kind) = (format.record_kind)(address) else {
            continue;
        };
        if block.is_blank() {
            continue;
        }

        match classify_block(address, block, kind, format) {
            Ok(record) => {
                out.blocks.push((address, block.with_kind(kind.as_str())));
                out.records.push(record);
            }
            Err(error) => {
                warn!(block = %address, %kind, %error, "Dropping record");
                out.dropped.push(Dropped {
                    address,
                    kind,
                    error,
                });
            }
        }
    }

    debug!(
        format = format.name,
        records = out.records.len(),
        dropped = out.dropped.len(),
        "Classified card"
    );
    out
}
