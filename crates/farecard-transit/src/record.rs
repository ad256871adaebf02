//! Typed records classified out of card blocks
//!
//! Every record wraps the fields decoded from one block. Accessors read the
//! conventional field names listed in [`field`]; a format's schemas use those
//! names for anything the reconciler needs to see.

use chrono::DateTime;
use chrono_tz::Tz;
use farecard_card::BlockAddress;
use farecard_common::ParsedFields;

use crate::trip::TransportMode;

/// Field names with a meaning to the reconciler
pub mod field {
    pub const VERSION: &str = "version";
    pub const TIMESTAMP: &str = "timestamp";
    pub const EXPIRY: &str = "expiry";
    /// Signed amount in minor currency units
    pub const VALUE: &str = "value";
    pub const CREDIT: &str = "credit";
    pub const TRIP: &str = "trip";
    pub const COMPLETED: &str = "completed";
    pub const CONTINUATION: &str = "continuation";
    pub const STATION: &str = "station";
    pub const ROUTE: &str = "route";
    pub const AGENCY: &str = "agency";
    pub const MODE: &str = "mode";
    pub const JOURNEY_ID: &str = "journey_id";
    pub const PASS_TYPE: &str = "pass_type";
    pub const TRIPS_REMAINING: &str = "trips_remaining";
}

/// The closed set of record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Balance,
    Purse,
    Topup,
    TravelPass,
    Metadata,
    Config,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Balance => "balance",
            RecordKind::Purse => "purse",
            RecordKind::Topup => "topup",
            RecordKind::TravelPass => "travel_pass",
            RecordKind::Metadata => "metadata",
            RecordKind::Config => "config",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded block contents shared by every record kind
#[derive(Debug, Clone, PartialEq)]
pub struct RecordData {
    address: BlockAddress,
    fields: ParsedFields,
    timestamp: Option<DateTime<Tz>>,
    expiry: Option<DateTime<Tz>>,
}

impl RecordData {
    pub fn new(address: BlockAddress, fields: ParsedFields) -> Self {
        Self {
            address,
            fields,
            timestamp: None,
            expiry: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Tz>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_expiry(mut self, expiry: Option<DateTime<Tz>>) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn address(&self) -> BlockAddress {
        self.address
    }

    pub fn fields(&self) -> &ParsedFields {
        &self.fields
    }

    pub fn timestamp(&self) -> Option<DateTime<Tz>> {
        self.timestamp
    }

    pub fn expiry(&self) -> Option<DateTime<Tz>> {
        self.expiry
    }
}

/// A classified record
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Balance(RecordData),
    Purse(RecordData),
    Topup(RecordData),
    TravelPass(RecordData),
    Metadata(RecordData),
    Config(RecordData),
}

impl Record {
    pub fn new(kind: RecordKind, data: RecordData) -> Self {
        match kind {
            RecordKind::Balance => Record::Balance(data),
            RecordKind::Purse => Record::Purse(data),
            RecordKind::Topup => Record::Topup(data),
            RecordKind::TravelPass => Record::TravelPass(data),
            RecordKind::Metadata => Record::Metadata(data),
            RecordKind::Config => Record::Config(data),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Balance(_) => RecordKind::Balance,
            Record::Purse(_) => RecordKind::Purse,
            Record::Topup(_) => RecordKind::Topup,
            Record::TravelPass(_) => RecordKind::TravelPass,
            Record::Metadata(_) => RecordKind::Metadata,
            Record::Config(_) => RecordKind::Config,
        }
    }

    pub fn data(&self) -> &RecordData {
        match self {
            Record::Balance(d)
            | Record::Purse(d)
            | Record::Topup(d)
            | Record::TravelPass(d)
            | Record::Metadata(d)
            | Record::Config(d) => d,
        }
    }

    pub fn address(&self) -> BlockAddress {
        self.data().address
    }

    pub fn fields(&self) -> &ParsedFields {
        &self.data().fields
    }

    pub fn timestamp(&self) -> Option<DateTime<Tz>> {
        self.data().timestamp
    }

    pub fn expiry(&self) -> Option<DateTime<Tz>> {
        self.data().expiry
    }

    pub fn version(&self) -> Option<u64> {
        self.fields().int(field::VERSION)
    }

    /// Signed amount; zero when the record carries none
    pub fn value(&self) -> i64 {
        self.fields().signed(field::VALUE).unwrap_or(0)
    }

    fn flag(&self, name: &str) -> Option<bool> {
        self.fields().int(name).map(|v| v != 0)
    }

    /// Money added to the card rather than spent
    pub fn is_credit(&self) -> bool {
        match self {
            Record::Topup(_) => true,
            Record::Purse(_) => self.flag(field::CREDIT).unwrap_or(false),
            _ => false,
        }
    }

    /// Marked by the validator as part of a trip
    pub fn is_trip(&self) -> bool {
        self.flag(field::TRIP).unwrap_or(false)
    }

    /// Completed unless the record says otherwise
    pub fn is_completed(&self) -> bool {
        self.flag(field::COMPLETED).unwrap_or(true)
    }

    pub fn is_continuation(&self) -> bool {
        self.flag(field::CONTINUATION).unwrap_or(false)
    }

    pub fn station(&self) -> Option<u64> {
        self.fields().int(field::STATION)
    }

    pub fn route(&self) -> Option<u64> {
        self.fields().int(field::ROUTE)
    }

    pub fn agency(&self) -> Option<u64> {
        self.fields().int(field::AGENCY)
    }

    pub fn journey_id(&self) -> Option<u64> {
        self.fields().int(field::JOURNEY_ID)
    }

    pub fn mode(&self) -> TransportMode {
        self.fields()
            .int(field::MODE)
            .map(TransportMode::from_code)
            .unwrap_or(TransportMode::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farecard_common::Value;

    fn purse(entries: &[(&'static str, Value)]) -> Record {
        let mut fields = ParsedFields::new();
        for (name, value) in entries {
            fields.insert(*name, value.clone());
        }
        Record::new(RecordKind::Purse, RecordData::new(BlockAddress::new(2, 0), fields))
    }

    #[test]
    fn test_kind_round_trips_through_constructor() {
        let data = RecordData::new(BlockAddress::new(1, 0), ParsedFields::new());
        for kind in [
            RecordKind::Balance,
            RecordKind::Purse,
            RecordKind::Topup,
            RecordKind::TravelPass,
            RecordKind::Metadata,
            RecordKind::Config,
        ] {
            assert_eq!(Record::new(kind, data.clone()).kind(), kind);
        }
    }

    #[test]
    fn test_accessors_read_conventional_fields() {
        let record = purse(&[
            (field::VALUE, Value::Signed(-120)),
            (field::CREDIT, Value::Unsigned(0)),
            (field::TRIP, Value::Unsigned(1)),
            (field::STATION, Value::Unsigned(77)),
            (field::MODE, Value::Unsigned(2)),
        ]);
        assert_eq!(record.value(), -120);
        assert!(!record.is_credit());
        assert!(record.is_trip());
        assert!(record.is_completed());
        assert_eq!(record.station(), Some(77));
        assert_eq!(record.route(), None);
        assert_eq!(record.mode(), TransportMode::Train);
    }

    #[test]
    fn test_topup_records_are_credits() {
        let data = RecordData::new(BlockAddress::new(1, 2), ParsedFields::new());
        assert!(Record::Topup(data.clone()).is_credit());
        assert!(!Record::Balance(data).is_credit());
    }
}
