//! End-to-end: an emulated Nextfare card read, identified and reconciled

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use farecard_card::{CardType, NoopObserver, SectorAccessor, VirtualCard};
use farecard_common::{ParsedFields, TimeUnit, Value};
use farecard_keys::{CardKeys, Key, KeyType, NoKeys};
use farecard_transit::formats::{self, nextfare};
use farecard_transit::record::field;
use farecard_transit::{identify, CardIdentity, ReadConfig, RecordKind, TripDisplay, TripKind};

const UID: [u8; 4] = [0x04, 0xA1, 0xB2, 0xC3];

fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

fn date(unit: TimeUnit, at: NaiveDateTime) -> Value {
    let raw = nextfare::nextfare().epoch.raw_for(unit, at).unwrap();
    Value::Date { unit, raw }
}

fn pad(bits: usize) -> Value {
    Value::Hex {
        bits,
        bytes: vec![0; bits.div_ceil(8)],
    }
}

fn encode(kind: RecordKind, fields: &ParsedFields) -> [u8; 16] {
    nextfare().encode_record(kind, fields).unwrap()
}

fn metadata() -> [u8; 16] {
    let mut f = ParsedFields::new();
    f.insert(nextfare::MAGIC_FIELD, Value::Unsigned(nextfare::MAGIC));
    f.insert(field::AGENCY, Value::Unsigned(1));
    f.insert("serial", Value::Hex { bits: 32, bytes: vec![0x10, 0x20, 0x30, 0x40] });
    f.insert(field::EXPIRY, date(TimeUnit::Days, local(2030, 1, 1, 0, 0)));
    f.insert("padding", pad(48));
    encode(RecordKind::Metadata, &f)
}

fn balance(version: u64, value: i64) -> [u8; 16] {
    let mut f = ParsedFields::new();
    f.insert(field::VERSION, Value::Unsigned(version));
    f.insert(field::VALUE, Value::Signed(value));
    f.insert(field::TIMESTAMP, date(TimeUnit::Minutes, local(2024, 3, 5, 0, 10)));
    f.insert("padding", pad(64));
    encode(RecordKind::Balance, &f)
}

fn topup_slot(at: NaiveDateTime, value: i64) -> [u8; 16] {
    let mut f = ParsedFields::new();
    f.insert(field::TIMESTAMP, date(TimeUnit::Minutes, at));
    f.insert(field::VALUE, Value::Signed(value));
    f.insert(field::STATION, Value::Unsigned(1));
    f.insert(field::AGENCY, Value::Unsigned(1));
    f.insert(field::COMPLETED, Value::Unsigned(1));
    f.insert("padding", pad(39));
    encode(RecordKind::Topup, &f)
}

struct Tap {
    at: NaiveDateTime,
    journey: u64,
    value: i64,
    credit: bool,
    station: Option<u64>,
}

fn purse(tap: &Tap) -> [u8; 16] {
    let mut f = ParsedFields::new();
    f.insert(field::TIMESTAMP, date(TimeUnit::Minutes, tap.at));
    f.insert(field::JOURNEY_ID, Value::Unsigned(tap.journey));
    f.insert(field::VALUE, Value::Signed(tap.value));
    f.insert(field::CREDIT, Value::Unsigned(tap.credit as u64));
    f.insert(field::TRIP, Value::Unsigned(!tap.credit as u64));
    f.insert(field::CONTINUATION, Value::Unsigned(0));
    f.insert(field::COMPLETED, Value::Unsigned(1));
    f.insert(nextfare::RESERVED_FIELD, Value::Unsigned(0));
    if let Some(station) = tap.station {
        f.insert(field::STATION, Value::Unsigned(station));
        f.insert(field::MODE, Value::Unsigned(2));
    }
    encode(RecordKind::Purse, &f)
}

fn pass(kind: u64, expiry: NaiveDateTime) -> [u8; 16] {
    let mut f = ParsedFields::new();
    f.insert(field::PASS_TYPE, Value::Unsigned(kind));
    f.insert(field::EXPIRY, date(TimeUnit::Days, expiry));
    f.insert(field::TRIPS_REMAINING, Value::Unsigned(10));
    f.insert(field::AGENCY, Value::Unsigned(1));
    f.insert("padding", pad(72));
    encode(RecordKind::TravelPass, &f)
}

fn taps() -> Vec<Tap> {
    let tap = |at, journey, value, station| Tap {
        at,
        journey,
        value,
        credit: false,
        station: Some(station),
    };
    vec![
        Tap {
            at: local(2024, 3, 4, 6, 45),
            journey: 0,
            value: 2000,
            credit: true,
            station: None,
        },
        tap(local(2024, 3, 4, 7, 0), 1, 450, 1),
        tap(local(2024, 3, 4, 7, 25), 1, -200, 2),
        tap(local(2024, 3, 4, 23, 50), 2, 450, 2),
        tap(local(2024, 3, 5, 0, 10), 2, -150, 4),
        tap(local(2024, 3, 5, 17, 30), 3, 450, 4),
    ]
}

fn issued_card() -> VirtualCard {
    let mut card = VirtualCard::new(UID.to_vec(), CardType::Classic1K);
    card.set_block(0, 1, metadata());
    card.set_block(1, 0, balance(250, 1200));
    card.set_block(1, 1, balance(3, 1950));
    card.set_block(1, 2, topup_slot(local(2024, 3, 4, 6, 45), 2000));

    // Stored out of order on purpose
    let mut taps = taps();
    taps.rotate_left(2);
    for (i, tap) in taps.iter().enumerate() {
        card.set_block(2 + (i / 3) as u8, (i % 3) as u8, purse(tap));
    }

    card.set_block(5, 0, pass(7, local(2099, 12, 31, 0, 0)));
    card.set_block(5, 1, pass(8, local(2020, 1, 1, 0, 0)));
    card
}

#[test]
fn test_full_history_from_emulated_card() {
    let mut virtual_card = issued_card();
    let config = ReadConfig::default();
    let card = SectorAccessor::new(&mut virtual_card, &NoKeys, config.access_options())
        .read_card(&UID, CardType::Classic1K, &mut NoopObserver)
        .unwrap();

    let identity = identify(&card, &formats::all());
    let format = identity.format().expect("card should be recognized");
    assert_eq!(format.name, "Nextfare");

    let history = format.analyse(&card);
    assert!(history.classified.dropped.is_empty());
    let result = history.reconciliation;

    assert_eq!(result.trips.len(), 3);
    let kinds: Vec<TripKind> = result.trips.iter().map(|t| t.kind()).collect();
    assert_eq!(
        kinds,
        vec![TripKind::Complete, TripKind::Complete, TripKind::InProgress]
    );

    let morning = &result.trips[0];
    assert_eq!(morning.fare(), 250);
    assert_eq!((morning.start_station(), morning.end_station()), (Some(1), Some(2)));

    let late = &result.trips[1];
    assert_eq!(late.duration(), Some(chrono::Duration::minutes(20)));
    assert_eq!(late.end().unwrap().hour(), 0);

    let balance = result.balance.unwrap();
    assert_eq!(balance.version, Some(3));
    assert_eq!(balance.value, 1950);

    assert_eq!(result.topups.len(), 1);
    assert_eq!(result.topups[0].amount, 2000);

    assert_eq!(result.subscriptions.len(), 1);
    assert_eq!(result.subscriptions[0].pass_type, Some(7));

    let line = TripDisplay::new(morning, format.lookup).to_string();
    assert!(line.contains("Central -> Roma Street"), "{line}");
    assert!(line.ends_with("AUD 2.50"), "{line}");
}

#[test]
fn test_missing_key_reports_locked_card() {
    let secret = Key::new(KeyType::A, [0x4E, 0x46, 0x00, 0x11, 0x22, 0x33]);
    let mut virtual_card = issued_card();
    virtual_card.lock_sector(0);

    let card = SectorAccessor::new(&mut virtual_card, &NoKeys, ReadConfig::default().access_options())
        .read_card(&UID, CardType::Classic1K, &mut NoopObserver)
        .unwrap();
    assert!(matches!(identify(&card, &formats::all()), CardIdentity::Locked));

    let mut keys = CardKeys::new();
    keys.push(Some(0), secret);
    let mut virtual_card = issued_card();
    virtual_card.lock_sector(0);
    virtual_card.set_key(0, secret);
    let card = SectorAccessor::new(&mut virtual_card, &keys, ReadConfig::default().access_options())
        .read_card(&UID, CardType::Classic1K, &mut NoopObserver)
        .unwrap();
    assert!(matches!(identify(&card, &formats::all()), CardIdentity::Recognized(_)));
}
