//! Nextfare-style stored-value cards
//!
//! Layout of a 1K card:
//!
//! | Sector | Blocks | Record |
//! |--------|--------|--------|
//! | 0 | 1 | metadata, starts with the `NF` magic |
//! | 0 | 2 | config |
//! | 1 | 0, 1 | balance slots, highest version wins |
//! | 1 | 2 | last top-up |
//! | 2–4 | 0–2 | purse ring of taps and credits |
//! | 5 | 0–2 | travel passes |
//!
//! Times count minutes, dates count days, both from 2000-01-01 in Brisbane.

use chrono::{NaiveDate, NaiveTime};
use farecard_card::{BlockAddress, Sector};
use farecard_common::{Field, ParsedFields, Schema};
use once_cell::sync::Lazy;

use crate::format::{journey_id_merge, sum_fares, BalanceThresholds, CardFormat};
use crate::lookup::{Currency, Epoch, StaticLookup};
use crate::record::{field, RecordKind};
use crate::service_day::ServiceDayRule;

/// `NF`
pub const MAGIC: u64 = 0x4E46;

pub const MAGIC_FIELD: &str = "magic";
pub const RESERVED_FIELD: &str = "reserved";

/// Sectors holding the purse ring
pub const PURSE_SECTORS: std::ops::RangeInclusive<u8> = 2..=4;
pub const PASS_SECTOR: u8 = 5;

static METADATA: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        Field::int(MAGIC_FIELD, 16),
        Field::int(field::AGENCY, 16),
        Field::hex("serial", 32),
        Field::days(field::EXPIRY, 16),
        Field::hex("padding", 48),
    ])
});

static CONFIG: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        Field::int("concession", 8),
        Field::int(field::AGENCY, 16),
        Field::hex("padding", 104),
    ])
});

static BALANCE: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        Field::int(field::VERSION, 8),
        Field::signed(field::VALUE, 24),
        Field::minutes(field::TIMESTAMP, 32),
        Field::hex("padding", 64),
    ])
});

static TOPUP: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        Field::minutes(field::TIMESTAMP, 32),
        Field::signed(field::VALUE, 24),
        Field::int(field::STATION, 16),
        Field::int(field::AGENCY, 16),
        Field::int(field::COMPLETED, 1),
        Field::hex("padding", 39),
    ])
});

static PURSE: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        Field::minutes(field::TIMESTAMP, 32),
        Field::int(field::JOURNEY_ID, 16),
        Field::signed(field::VALUE, 24),
        Field::container(vec![
            Field::int(field::CREDIT, 1),
            Field::int(field::TRIP, 1),
            Field::int(field::CONTINUATION, 1),
            Field::int(field::COMPLETED, 1),
            Field::int(RESERVED_FIELD, 4),
        ]),
        Field::bitmap(vec![
            Field::int(field::STATION, 16),
            Field::int(field::ROUTE, 16),
            Field::int(field::MODE, 8),
        ]),
    ])
});

static TRAVEL_PASS: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        Field::int(field::PASS_TYPE, 8),
        Field::days(field::EXPIRY, 16),
        Field::int(field::TRIPS_REMAINING, 16),
        Field::int(field::AGENCY, 16),
        Field::hex("padding", 72),
    ])
});

static LOOKUP: StaticLookup = StaticLookup {
    agencies: &[(1, "TransLink"), (2, "Queensland Rail")],
    stations: &[
        (1, "Central"),
        (2, "Roma Street"),
        (3, "Fortitude Valley"),
        (4, "South Bank"),
        (5, "Cultural Centre"),
        (6, "King George Square"),
    ],
    routes: &[(61, "Airport Line"), (111, "Busway 111")],
    currency: Currency::new("AUD", 2),
};

static NEXTFARE: Lazy<CardFormat> = Lazy::new(|| {
    let epoch_date = NaiveDate::from_ymd_opt(2000, 1, 1).expect("2000-01-01 is a valid date");
    CardFormat {
        name: "Nextfare",
        early_sectors: 1,
        sniff,
        record_kind,
        schema,
        validate,
        merge_policy: journey_id_merge,
        fare_combiner: sum_fares,
        epoch: Epoch::new(epoch_date.and_time(NaiveTime::default()), chrono_tz::Australia::Brisbane),
        service_day: ServiceDayRule::until(4),
        records_newest_first: false,
        balance_thresholds: BalanceThresholds::default(),
        lookup: &LOOKUP,
    }
});

/// The Nextfare card format
pub fn nextfare() -> &'static CardFormat {
    &NEXTFARE
}

fn sniff(sectors: &[Sector]) -> bool {
    sectors
        .first()
        .and_then(|s| s.block(1))
        .map_or(false, |b| u64::from(u16::from_be_bytes([b.data()[0], b.data()[1]])) == MAGIC)
}

fn record_kind(address: BlockAddress) -> Option<RecordKind> {
    match (address.sector, address.block) {
        (0, 1) => Some(RecordKind::Metadata),
        (0, 2) => Some(RecordKind::Config),
        (1, 0) | (1, 1) => Some(RecordKind::Balance),
        (1, 2) => Some(RecordKind::Topup),
        (s, 0..=2) if PURSE_SECTORS.contains(&s) => Some(RecordKind::Purse),
        (PASS_SECTOR, 0..=2) => Some(RecordKind::TravelPass),
        _ => None,
    }
}

fn schema(kind: RecordKind) -> Option<&'static Schema> {
    let schema: &'static Schema = match kind {
        RecordKind::Metadata => &METADATA,
        RecordKind::Config => &CONFIG,
        RecordKind::Balance => &BALANCE,
        RecordKind::Topup => &TOPUP,
        RecordKind::Purse => &PURSE,
        RecordKind::TravelPass => &TRAVEL_PASS,
    };
    Some(schema)
}

fn validate(kind: RecordKind, fields: &ParsedFields) -> Result<(), String> {
    match kind {
        RecordKind::Metadata => match fields.int(MAGIC_FIELD) {
            Some(MAGIC) => Ok(()),
            other => Err(format!("bad magic {:04X}", other.unwrap_or(0))),
        },
        RecordKind::Purse => match fields.int(RESERVED_FIELD) {
            Some(0) | None => Ok(()),
            Some(bits) => Err(format!("reserved flag bits set: {bits:04b}")),
        },
        _ => Ok(()),
    }
}
