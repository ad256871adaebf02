//! Card formats as plain values, and card identification

use chrono::{DateTime, Utc};
use farecard_card::{BlockAddress, Card, Sector, BLOCK_SIZE};
use farecard_common::{encode, ParsedFields, Schema};
use tracing::debug;

use crate::classifier::{classify, Classified, RecordError};
use crate::lookup::{Epoch, Lookup};
use crate::reconcile::{reconcile, ReconcileOptions, Reconciliation};
use crate::record::{Record, RecordKind};
use crate::service_day::{same_service_day, ServiceDayRule};

/// Decides whether `off` is the tap-off closing the trip `on` opened
pub type MergePolicy = fn(on: &Record, off: &Record, rule: &ServiceDayRule) -> bool;

/// Fare of a paired trip
pub type FareCombiner = fn(on: &Record, off: &Record) -> i64;

/// Version counters at or above `high` next to one at or below `low` have wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceThresholds {
    pub high: u64,
    pub low: u64,
}

impl Default for BalanceThresholds {
    fn default() -> Self {
        Self { high: 240, low: 10 }
    }
}

/// Everything the engine needs to know about one card format
pub struct CardFormat {
    pub name: &'static str,
    /// Sectors `sniff` needs to see
    pub early_sectors: usize,
    pub sniff: fn(&[Sector]) -> bool,
    /// Dispatch table: which record, if any, lives at an address
    pub record_kind: fn(BlockAddress) -> Option<RecordKind>,
    pub schema: fn(RecordKind) -> Option<&'static Schema>,
    /// Sanity check run after decoding; `Err` drops the record
    pub validate: fn(RecordKind, &ParsedFields) -> Result<(), String>,
    pub merge_policy: MergePolicy,
    pub fare_combiner: FareCombiner,
    pub epoch: Epoch,
    pub service_day: ServiceDayRule,
    /// Purse records are stored most recent first
    pub records_newest_first: bool,
    pub balance_thresholds: BalanceThresholds,
    pub lookup: &'static dyn Lookup,
}

impl std::fmt::Debug for CardFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardFormat")
            .field("name", &self.name)
            .field("early_sectors", &self.early_sectors)
            .field("epoch", &self.epoch)
            .field("service_day", &self.service_day)
            .field("records_newest_first", &self.records_newest_first)
            .finish_non_exhaustive()
    }
}

/// Classified records and the history built from them
#[derive(Debug, Clone)]
pub struct History {
    pub classified: Classified,
    pub reconciliation: Reconciliation,
}

impl CardFormat {
    /// Whether this format claims the card
    pub fn matches(&self, sectors: &[Sector]) -> bool {
        (self.sniff)(sectors)
    }

    pub fn reconcile_options(&self, as_of: Option<DateTime<Utc>>) -> ReconcileOptions {
        ReconcileOptions {
            newest_first: self.records_newest_first,
            service_day: self.service_day,
            balance_thresholds: self.balance_thresholds,
            as_of,
        }
    }

    /// Lay out `fields` as one block of this format's `kind` record,
    /// zero-padded to the block size
    pub fn encode_record(
        &self,
        kind: RecordKind,
        fields: &ParsedFields,
    ) -> Result<[u8; BLOCK_SIZE], RecordError> {
        let schema = (self.schema)(kind).ok_or_else(|| RecordError::Malformed {
            reason: format!("{} has no {} layout", self.name, kind),
        })?;
        let bytes = encode(schema, fields)?;
        if bytes.len() > BLOCK_SIZE {
            return Err(RecordError::Malformed {
                reason: format!("{} record needs {} bytes", kind, bytes.len()),
            });
        }
        let mut block = [0u8; BLOCK_SIZE];
        block[..bytes.len()].copy_from_slice(&bytes);
        Ok(block)
    }

    /// Classify and reconcile a card of this format, as of its scan time
    pub fn analyse(&self, card: &Card) -> History {
        let classified = classify(card, self);
        let options = self.reconcile_options(Some(card.scanned_at()));
        let reconciliation = reconcile(
            &classified.records,
            self.merge_policy,
            self.fare_combiner,
            &options,
        );
        History {
            classified,
            reconciliation,
        }
    }
}

/// What a card turned out to be
#[derive(Debug, Clone, Copy)]
pub enum CardIdentity<'a> {
    Recognized(&'a CardFormat),
    /// No format matched and some sectors stayed closed: more keys needed
    Locked,
    /// No format matched although every sector could be read
    Unrecognized,
}

impl<'a> CardIdentity<'a> {
    pub fn format(&self) -> Option<&'a CardFormat> {
        match self {
            CardIdentity::Recognized(format) => Some(*format),
            _ => None,
        }
    }
}

/// Find the format of a fully read card
pub fn identify<'a>(card: &Card, formats: &[&'a CardFormat]) -> CardIdentity<'a> {
    if let Some(format) = formats.iter().copied().find(|f| f.matches(card.sectors())) {
        debug!(format = format.name, "Card identified");
        return CardIdentity::Recognized(format);
    }
    if card.has_unauthorized() {
        CardIdentity::Locked
    } else {
        CardIdentity::Unrecognized
    }
}

/// Guess the format from the first sectors of a read still in progress
pub fn guess_early<'a>(sectors: &[Sector], formats: &[&'a CardFormat]) -> Option<&'a CardFormat> {
    formats
        .iter()
        .find(|f| sectors.len() >= f.early_sectors && f.matches(&sectors[..f.early_sectors]))
        .copied()
}

/// Pair taps that share a journey id within one service day
pub fn journey_id_merge(on: &Record, off: &Record, rule: &ServiceDayRule) -> bool {
    let (Some(on_id), Some(off_id)) = (on.journey_id(), off.journey_id()) else {
        return false;
    };
    let (Some(on_at), Some(off_at)) = (on.timestamp(), off.timestamp()) else {
        return false;
    };
    on_id == off_id
        && !off.is_credit()
        && off_at >= on_at
        && same_service_day(on_at.naive_local(), off_at.naive_local(), rule)
}

/// For agencies that only record tap-ons
pub fn never_merge(_on: &Record, _off: &Record, _rule: &ServiceDayRule) -> bool {
    false
}

/// Tap-on charge plus tap-off adjustment
pub fn sum_fares(on: &Record, off: &Record) -> i64 {
    on.value() + off.value()
}
