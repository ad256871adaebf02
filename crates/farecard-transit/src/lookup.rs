//! Turning raw codes and counters into display values

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use farecard_common::{TimeUnit, Value};

/// Zero point of a format's date counters, in the agency's local time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch {
    base: NaiveDateTime,
    tz: Tz,
}

impl Epoch {
    pub fn new(base: NaiveDateTime, tz: Tz) -> Self {
        Self { base, tz }
    }

    /// Epoch at local midnight of the given date
    pub fn midnight(year: i32, month: u32, day: u32, tz: Tz) -> Option<Self> {
        let base = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
        Some(Self::new(base, tz))
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn base(&self) -> NaiveDateTime {
        self.base
    }

    /// Local time `raw` units after the epoch
    pub fn resolve(&self, unit: TimeUnit, raw: u64) -> Option<DateTime<Tz>> {
        let raw = i64::try_from(raw).ok()?;
        let offset = match unit {
            TimeUnit::Days => Duration::try_days(raw)?,
            TimeUnit::Minutes => Duration::try_minutes(raw)?,
            TimeUnit::Seconds => Duration::try_seconds(raw)?,
        };
        let local = self.base.checked_add_signed(offset)?;
        self.tz.from_local_datetime(&local).earliest()
    }

    /// Resolve a decoded date field; other values yield `None`
    pub fn resolve_value(&self, value: &Value) -> Option<DateTime<Tz>> {
        match value {
            Value::Date { unit, raw } => self.resolve(*unit, *raw),
            _ => None,
        }
    }

    /// Counter value for a local time, rounded down to whole units
    pub fn raw_for(&self, unit: TimeUnit, local: NaiveDateTime) -> Option<u64> {
        let elapsed = local.signed_duration_since(self.base);
        let raw = match unit {
            TimeUnit::Days => elapsed.num_days(),
            TimeUnit::Minutes => elapsed.num_minutes(),
            TimeUnit::Seconds => elapsed.num_seconds(),
        };
        u64::try_from(raw).ok()
    }
}

/// ISO currency code with its minor-unit exponent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Currency {
    pub code: &'static str,
    pub exponent: u32,
}

impl Currency {
    pub const fn new(code: &'static str, exponent: u32) -> Self {
        Self { code, exponent }
    }

    /// Render an amount in minor units, e.g. `-1250` as `-AUD 12.50`
    pub fn format(&self, minor: i64) -> String {
        let sign = if minor < 0 { "-" } else { "" };
        let abs = minor.unsigned_abs();
        let scale = match 10u64.checked_pow(self.exponent) {
            Some(scale) if self.exponent > 0 => scale,
            _ => return format!("{sign}{} {abs}", self.code),
        };
        format!(
            "{sign}{} {}.{:0width$}",
            self.code,
            abs / scale,
            abs % scale,
            width = self.exponent as usize
        )
    }
}

impl Default for Currency {
    fn default() -> Self {
        // ISO 4217 "no currency"
        Self::new("XXX", 2)
    }
}

/// Operator-specific names for the numeric codes stored on a card
pub trait Lookup: Send + Sync {
    fn agency_name(&self, _agency: u64) -> Option<String> {
        None
    }

    fn station_name(&self, _station: u64) -> Option<String> {
        None
    }

    fn route_name(&self, _route: u64) -> Option<String> {
        None
    }

    fn currency(&self) -> Currency {
        Currency::default()
    }

    fn format_amount(&self, minor: i64) -> String {
        self.currency().format(minor)
    }
}

/// Lookup backed by compiled-in tables
#[derive(Debug, Clone, Copy)]
pub struct StaticLookup {
    pub agencies: &'static [(u64, &'static str)],
    pub stations: &'static [(u64, &'static str)],
    pub routes: &'static [(u64, &'static str)],
    pub currency: Currency,
}

fn find(table: &[(u64, &'static str)], code: u64) -> Option<String> {
    table
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| name.to_string())
}

impl Lookup for StaticLookup {
    fn agency_name(&self, agency: u64) -> Option<String> {
        find(self.agencies, agency)
    }

    fn station_name(&self, station: u64) -> Option<String> {
        find(self.stations, station)
    }

    fn route_name(&self, route: u64) -> Option<String> {
        find(self.routes, route)
    }

    fn currency(&self) -> Currency {
        self.currency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_epoch_resolves_units() {
        let epoch = Epoch::midnight(2000, 1, 1, chrono_tz::Australia::Brisbane).unwrap();
        let day = epoch.resolve(TimeUnit::Days, 1).unwrap();
        assert_eq!(day.naive_local().date(), NaiveDate::from_ymd_opt(2000, 1, 2).unwrap());

        let minutes = epoch.resolve(TimeUnit::Minutes, 90).unwrap();
        assert_eq!((minutes.hour(), minutes.minute()), (1, 30));

        let value = Value::Date {
            unit: TimeUnit::Seconds,
            raw: 61,
        };
        assert_eq!(epoch.resolve_value(&value).unwrap().second(), 1);
        assert_eq!(epoch.resolve_value(&Value::Unsigned(1)), None);
    }

    #[test]
    fn test_raw_for_inverts_resolve() {
        let epoch = Epoch::midnight(2000, 1, 1, chrono_tz::UTC).unwrap();
        let at = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(23, 50, 0)
            .unwrap();
        let raw = epoch.raw_for(TimeUnit::Minutes, at).unwrap();
        assert_eq!(epoch.resolve(TimeUnit::Minutes, raw).unwrap().naive_local(), at);
    }

    #[test]
    fn test_currency_format() {
        let aud = Currency::new("AUD", 2);
        assert_eq!(aud.format(1250), "AUD 12.50");
        assert_eq!(aud.format(-5), "-AUD 0.05");
        assert_eq!(Currency::new("JPY", 0).format(300), "JPY 300");
    }

    #[test]
    fn test_currency_exponent_too_large_renders_plain() {
        assert_eq!(Currency::new("XTS", 20).format(-42), "-XTS 42");
        assert_eq!(Currency::new("XTS", 19).format(5), "XTS 0.0000000000000000005");
    }

    #[test]
    fn test_static_lookup() {
        static LOOKUP: StaticLookup = StaticLookup {
            agencies: &[(1, "City Transit")],
            stations: &[(10, "Central"), (11, "Harbour")],
            routes: &[],
            currency: Currency::new("AUD", 2),
        };
        assert_eq!(LOOKUP.station_name(11).as_deref(), Some("Harbour"));
        assert_eq!(LOOKUP.route_name(1), None);
        assert_eq!(LOOKUP.format_amount(420), "AUD 4.20");
    }
}
