//! Turning tap and purse records into trips, top-ups and a balance
//!
//! [`reconcile`] is pure: the same records and strategies always give the
//! same [`Reconciliation`].

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use farecard_card::BlockAddress;
use tracing::debug;

use crate::format::{BalanceThresholds, FareCombiner, MergePolicy};
use crate::record::{field, Record};
use crate::service_day::ServiceDayRule;
use crate::trip::Trip;

/// Format-supplied knobs for [`reconcile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileOptions {
    /// Purse records are stored most recent first
    pub newest_first: bool,
    pub service_day: ServiceDayRule,
    pub balance_thresholds: BalanceThresholds,
    /// Passes expiring before this instant are not active
    pub as_of: Option<DateTime<Utc>>,
}

/// The stored-value snapshot judged current
#[derive(Debug, Clone, PartialEq)]
pub struct Balance {
    pub address: BlockAddress,
    pub version: Option<u64>,
    /// Minor currency units
    pub value: i64,
    pub timestamp: Option<DateTime<Tz>>,
}

impl Balance {
    fn from_record(record: &Record) -> Self {
        Self {
            address: record.address(),
            version: record.version(),
            value: record.value(),
            timestamp: record.timestamp(),
        }
    }
}

/// Money added to the card
#[derive(Debug, Clone, PartialEq)]
pub struct Topup {
    pub address: BlockAddress,
    pub timestamp: Option<DateTime<Tz>>,
    /// Minor currency units
    pub amount: i64,
    pub station: Option<u64>,
    pub agency: Option<u64>,
}

impl Topup {
    fn from_record(record: &Record) -> Self {
        Self {
            address: record.address(),
            timestamp: record.timestamp(),
            amount: record.value(),
            station: record.station(),
            agency: record.agency(),
        }
    }

    fn same_event(&self, other: &Topup) -> bool {
        self.timestamp == other.timestamp && self.amount == other.amount
    }
}

/// A travel pass stored on the card
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub address: BlockAddress,
    pub pass_type: Option<u64>,
    pub expiry: DateTime<Tz>,
    pub trips_remaining: Option<u64>,
}

/// Everything reconstructed from one card's records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Chronological
    pub trips: Vec<Trip>,
    pub balance: Option<Balance>,
    /// Chronological
    pub topups: Vec<Topup>,
    pub subscriptions: Vec<Subscription>,
}

/// Ties between taps stamped with the same time
fn tie_rank(record: &Record) -> u8 {
    if record.is_credit() && record.is_completed() && record.value() != 0 {
        0
    } else if record.is_trip() {
        1
    } else {
        2
    }
}

/// Canonical tap order: time, then tie rank, then ascending value
pub fn tap_order(a: &Record, b: &Record) -> Ordering {
    a.timestamp()
        .cmp(&b.timestamp())
        .then_with(|| tie_rank(a).cmp(&tie_rank(b)))
        .then_with(|| a.value().cmp(&b.value()))
}

/// Pick the current balance among redundant slots.
///
/// Highest version wins, unless the versions straddle the wrap-around
/// thresholds; then the highest of the low versions is the newest.
pub fn select_balance<'a>(
    balances: &[&'a Record],
    thresholds: &BalanceThresholds,
) -> Option<&'a Record> {
    let versioned = || balances.iter().copied().filter_map(|r| Some((r.version()?, r)));

    let wrapped = versioned().any(|(v, _)| v >= thresholds.high)
        && versioned().any(|(v, _)| v <= thresholds.low);
    let newest = if wrapped {
        versioned()
            .filter(|(v, _)| *v <= thresholds.low)
            .max_by_key(|(v, _)| *v)
    } else {
        versioned().max_by_key(|(v, _)| *v)
    };

    newest
        .map(|(_, r)| r)
        .or_else(|| balances.first().copied())
}

/// Rebuild the card's history from its records.
///
/// `merge_policy` decides whether the next tap closes the trip the current
/// one opened; `fare_combiner` prices a closed trip. A debit with a negative
/// value that closes nothing becomes an orphaned tap-off trip.
pub fn reconcile(
    records: &[Record],
    merge_policy: MergePolicy,
    fare_combiner: FareCombiner,
    options: &ReconcileOptions,
) -> Reconciliation {
    let mut balances = Vec::new();
    let mut taps = Vec::new();
    let mut slot_topups = Vec::new();
    let mut passes = Vec::new();

    for record in records {
        match record {
            Record::Balance(_) => balances.push(record),
            Record::Purse(_) => taps.push(record),
            Record::Topup(_) => slot_topups.push(record),
            Record::TravelPass(_) => passes.push(record),
            Record::Metadata(_) | Record::Config(_) => {}
        }
    }

    let undated = taps.iter().filter(|r| r.timestamp().is_none()).count();
    if undated > 0 {
        debug!(undated, "Ignoring purse records without a timestamp");
    }
    taps.retain(|r| r.timestamp().is_some());
    if options.newest_first {
        taps.reverse();
    }
    taps.sort_by(|a, b| tap_order(a, b));

    let mut trips = Vec::new();
    let mut topups = Vec::new();
    let mut i = 0;
    while i < taps.len() {
        let tap = taps[i];
        if tap.is_credit() {
            if tap.is_completed() {
                topups.push(Topup::from_record(tap));
            } else {
                debug!(address = %tap.address(), "Skipping incomplete top-up");
            }
            i += 1;
            continue;
        }
        if tap.value() < 0 {
            trips.push(Trip::orphan(tap));
            i += 1;
            continue;
        }

        match taps.get(i + 1) {
            Some(&off) if !off.is_credit() && merge_policy(tap, off, &options.service_day) => {
                trips.push(Trip::paired(tap, off, fare_combiner(tap, off)));
                i += 2;
            }
            _ => {
                trips.push(Trip::tapped_on(tap));
                i += 1;
            }
        }
    }
    trips.sort_by(|a, b| a.sort_time().cmp(&b.sort_time()));

    for record in slot_topups.iter().filter(|r| r.is_completed()) {
        let topup = Topup::from_record(record);
        if !topups.iter().any(|t| t.same_event(&topup)) {
            topups.push(topup);
        }
    }
    topups.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    let balance = select_balance(&balances, &options.balance_thresholds).map(Balance::from_record);
    let subscriptions = active_subscriptions(&passes, options.as_of);

    debug!(
        trips = trips.len(),
        topups = topups.len(),
        subscriptions = subscriptions.len(),
        "Reconciled records"
    );

    Reconciliation {
        trips,
        balance,
        topups,
        subscriptions,
    }
}

/// Passes valid on or after `as_of`'s local date; all dated passes without it
fn active_subscriptions(passes: &[&Record], as_of: Option<DateTime<Utc>>) -> Vec<Subscription> {
    passes
        .iter()
        .filter_map(|pass| {
            let expiry = pass.expiry()?;
            let active = as_of.map_or(true, |now| {
                expiry.date_naive() >= now.with_timezone(&expiry.timezone()).date_naive()
            });
            active.then(|| Subscription {
                address: pass.address(),
                pass_type: pass.fields().int(field::PASS_TYPE),
                expiry,
                trips_remaining: pass.fields().int(field::TRIPS_REMAINING),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{journey_id_merge, never_merge, sum_fares};
    use crate::record::{RecordData, RecordKind};
    use crate::trip::TripKind;
    use chrono::{Duration, NaiveDate, TimeZone};
    use farecard_common::{ParsedFields, Value};

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Tz> {
        chrono_tz::Australia::Brisbane
            .with_ymd_and_hms(2024, 3, day, hour, minute, 0)
            .unwrap()
    }

    struct Tap {
        when: DateTime<Tz>,
        journey: u64,
        station: u64,
        value: i64,
        credit: bool,
        completed: bool,
    }

    impl Tap {
        fn on(when: DateTime<Tz>, journey: u64, station: u64) -> Self {
            Self {
                when,
                journey,
                station,
                value: 450,
                credit: false,
                completed: true,
            }
        }

        fn off(when: DateTime<Tz>, journey: u64, station: u64) -> Self {
            Self {
                value: -200,
                ..Self::on(when, journey, station)
            }
        }

        fn topup(when: DateTime<Tz>, value: i64) -> Self {
            Self {
                when,
                journey: 0,
                station: 1,
                value,
                credit: true,
                completed: true,
            }
        }

        fn record(&self, slot: u8) -> Record {
            let mut fields = ParsedFields::new();
            fields.insert(field::VALUE, Value::Signed(self.value));
            fields.insert(field::JOURNEY_ID, Value::Unsigned(self.journey));
            fields.insert(field::STATION, Value::Unsigned(self.station));
            fields.insert(field::CREDIT, Value::Unsigned(self.credit as u64));
            fields.insert(field::TRIP, Value::Unsigned(!self.credit as u64));
            fields.insert(field::COMPLETED, Value::Unsigned(self.completed as u64));
            Record::Purse(
                RecordData::new(BlockAddress::new(2 + slot / 3, slot % 3), fields)
                    .with_timestamp(Some(self.when)),
            )
        }
    }

    fn records(taps: &[Tap]) -> Vec<Record> {
        taps.iter().enumerate().map(|(i, t)| t.record(i as u8)).collect()
    }

    fn balance(version: u64, value: i64) -> Record {
        let mut fields = ParsedFields::new();
        fields.insert(field::VERSION, Value::Unsigned(version));
        fields.insert(field::VALUE, Value::Signed(value));
        Record::new(
            RecordKind::Balance,
            RecordData::new(BlockAddress::new(1, version as u8 % 2), fields),
        )
    }

    fn options() -> ReconcileOptions {
        ReconcileOptions {
            service_day: ServiceDayRule::until(4),
            ..ReconcileOptions::default()
        }
    }

    #[test]
    fn test_pairs_become_complete_trips() {
        let taps: Vec<Tap> = (0..4u32)
            .flat_map(|n| {
                let hour = 7 + n * 2;
                [
                    Tap::on(at(4, hour, 0), n as u64, 10),
                    Tap::off(at(4, hour, 30), n as u64, 20),
                ]
            })
            .collect();

        let result = reconcile(&records(&taps), journey_id_merge, sum_fares, &options());

        assert_eq!(result.trips.len(), 4);
        for trip in &result.trips {
            assert_eq!(trip.kind(), TripKind::Complete);
            assert!(trip.end().is_some());
            assert_eq!(trip.end_station(), Some(20));
            assert_eq!(trip.fare(), 250);
        }
    }

    #[test]
    fn test_trailing_tap_on_stays_open() {
        let taps = [
            Tap::on(at(4, 7, 0), 1, 10),
            Tap::off(at(4, 7, 30), 1, 20),
            Tap::on(at(4, 17, 0), 2, 20),
        ];
        let result = reconcile(&records(&taps), journey_id_merge, sum_fares, &options());

        assert_eq!(result.trips.len(), 2);
        assert_eq!(result.trips[0].kind(), TripKind::Complete);
        let open = &result.trips[1];
        assert_eq!(open.kind(), TripKind::InProgress);
        assert!(open.end().is_none());
        assert!(open.end_station().is_none());
        assert_eq!(open.start_station(), Some(20));
    }

    #[test]
    fn test_rollover_before_cutoff_merges() {
        let taps = [
            Tap::on(at(4, 23, 50), 9, 10),
            Tap::off(at(5, 0, 10), 9, 20),
        ];
        let result = reconcile(&records(&taps), journey_id_merge, sum_fares, &options());

        assert_eq!(result.trips.len(), 1);
        assert_eq!(result.trips[0].duration(), Some(Duration::minutes(20)));
    }

    #[test]
    fn test_no_merge_across_two_days() {
        let taps = [
            Tap::on(at(4, 23, 50), 9, 10),
            Tap::off(at(6, 0, 10), 9, 20),
        ];
        let result = reconcile(&records(&taps), journey_id_merge, sum_fares, &options());

        assert_eq!(result.trips.len(), 2);
        assert_eq!(result.trips[0].kind(), TripKind::InProgress);
        assert_eq!(result.trips[1].kind(), TripKind::OrphanTapOff);
    }

    #[test]
    fn test_orphan_tap_off_is_flagged_not_swapped() {
        let taps = [Tap::off(at(4, 9, 0), 3, 30)];
        let result = reconcile(&records(&taps), journey_id_merge, sum_fares, &options());

        let trip = &result.trips[0];
        assert_eq!(trip.kind(), TripKind::OrphanTapOff);
        assert_eq!(trip.end_station(), Some(30));
        assert!(trip.start_station().is_none());
        assert!(trip.start().is_none());
        assert_eq!(trip.fare(), -200);
    }

    #[test]
    fn test_newest_first_records_are_reordered() {
        let mut taps = vec![
            Tap::on(at(4, 7, 0), 1, 10),
            Tap::off(at(4, 7, 30), 1, 20),
            Tap::on(at(4, 9, 0), 2, 20),
            Tap::off(at(4, 9, 30), 2, 10),
        ];
        taps.reverse();
        let opts = ReconcileOptions {
            newest_first: true,
            ..options()
        };
        let result = reconcile(&records(&taps), journey_id_merge, sum_fares, &opts);

        assert_eq!(result.trips.len(), 2);
        assert!(result.trips[0].start() < result.trips[1].start());
        assert_eq!(result.trips[0].start_station(), Some(10));
    }

    #[test]
    fn test_same_timestamp_topup_sorts_first() {
        let when = at(4, 8, 0);
        let taps = [
            Tap::on(when, 1, 10),
            Tap::topup(when, 2000),
            Tap::off(at(4, 8, 20), 1, 20),
        ];
        let result = reconcile(&records(&taps), journey_id_merge, sum_fares, &options());

        assert_eq!(result.topups.len(), 1);
        assert_eq!(result.topups[0].amount, 2000);
        assert_eq!(result.trips.len(), 1);
        assert_eq!(result.trips[0].kind(), TripKind::Complete);
    }

    #[test]
    fn test_incomplete_credit_is_not_a_topup() {
        let pending = Tap {
            completed: false,
            ..Tap::topup(at(4, 8, 0), 2000)
        };
        let result = reconcile(&records(&[pending]), journey_id_merge, sum_fares, &options());
        assert!(result.topups.is_empty());
        assert!(result.trips.is_empty());
    }

    #[test]
    fn test_tie_break_by_value() {
        let when = at(4, 8, 0);
        let a = Tap::on(when, 1, 10).record(0);
        let b = Tap { value: 100, ..Tap::on(when, 1, 10) }.record(1);
        assert_eq!(tap_order(&b, &a), Ordering::Less);
    }

    #[test]
    fn test_never_merge_keeps_every_tap() {
        let taps = [Tap::on(at(4, 7, 0), 1, 10), Tap::on(at(4, 8, 0), 1, 11)];
        let result = reconcile(&records(&taps), never_merge, sum_fares, &options());
        assert_eq!(result.trips.len(), 2);
        assert!(result.trips.iter().all(|t| t.kind() == TripKind::InProgress));
    }

    #[test]
    fn test_balance_wraparound() {
        let records = vec![balance(250, 1000), balance(3, 750)];
        let result = reconcile(&records, never_merge, sum_fares, &options());
        let selected = result.balance.unwrap();
        assert_eq!(selected.version, Some(3));
        assert_eq!(selected.value, 750);
    }

    #[test]
    fn test_balance_wraparound_through_zero() {
        let records = vec![balance(255, 1200), balance(0, 1950)];
        let result = reconcile(&records, never_merge, sum_fares, &options());
        let selected = result.balance.unwrap();
        assert_eq!(selected.version, Some(0));
        assert_eq!(selected.value, 1950);
    }

    #[test]
    fn test_balance_highest_version() {
        let a = balance(17, 100);
        let b = balance(18, 200);
        let selected = select_balance(&[&a, &b], &BalanceThresholds::default()).unwrap();
        assert_eq!(selected.version(), Some(18));
        assert!(select_balance(&[], &BalanceThresholds::default()).is_none());
    }

    #[test]
    fn test_subscriptions_filtered_by_scan_time() {
        let pass = |day: u32| {
            let mut fields = ParsedFields::new();
            fields.insert(field::PASS_TYPE, Value::Unsigned(4));
            Record::TravelPass(
                RecordData::new(BlockAddress::new(5, 0), fields).with_expiry(Some(at(day, 0, 0))),
            )
        };
        let records = vec![pass(3), pass(10)];
        let scanned = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(2, 0, 0)
            .unwrap()
            .and_utc();

        let opts = ReconcileOptions {
            as_of: Some(scanned),
            ..options()
        };
        let active = reconcile(&records, never_merge, sum_fares, &opts).subscriptions;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].pass_type, Some(4));

        let all = reconcile(&records, never_merge, sum_fares, &options()).subscriptions;
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_slot_topup_not_counted_twice() {
        let when = at(4, 8, 0);
        let purse_credit = Tap::topup(when, 2000).record(0);
        let mut fields = ParsedFields::new();
        fields.insert(field::VALUE, Value::Signed(2000));
        fields.insert(field::COMPLETED, Value::Unsigned(1));
        let slot = Record::Topup(RecordData::new(BlockAddress::new(1, 2), fields).with_timestamp(Some(when)));

        let result = reconcile(&[purse_credit, slot], never_merge, sum_fares, &options());
        assert_eq!(result.topups.len(), 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_n_pairs_give_n_complete_trips(n in 1usize..12, trailing in any::<bool>()) {
                let mut taps = Vec::new();
                for i in 0..n {
                    let day = 1 + (i / 5) as u32;
                    let hour = 6 + 3 * (i % 5) as u32;
                    taps.push(Tap::on(at(day, hour, 0), i as u64, 10));
                    taps.push(Tap::off(at(day, hour, 45), i as u64, 20));
                }
                if trailing {
                    taps.push(Tap::on(at(28, 12, 0), 999, 10));
                }

                let result = reconcile(&records(&taps), journey_id_merge, sum_fares, &options());
                let complete = result.trips.iter().filter(|t| t.kind() == TripKind::Complete).count();
                let open = result.trips.iter().filter(|t| t.kind() == TripKind::InProgress).count();

                prop_assert_eq!(complete, n);
                prop_assert_eq!(open, usize::from(trailing));
                prop_assert!(result.trips.windows(2).all(|w| w[0].start() <= w[1].start()));
            }
        }
    }
}
