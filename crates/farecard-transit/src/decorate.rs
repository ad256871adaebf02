//! Display-time views over trips
//!
//! Trips are never rewritten. Obfuscation and formatting wrap a `&Trip` and
//! answer through [`TripView`].

use std::fmt;

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ObfuscationConfig;
use crate::lookup::Lookup;
use crate::trip::{Trip, TripKind, TripView};

/// Largest date shift, in days, either way
const MAX_DAY_SHIFT: i64 = 180;

/// Consistent random corrections for one card's trips
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obfuscator {
    day_shift: Option<Duration>,
    fare_factor: Option<f64>,
}

impl Obfuscator {
    /// Draw the corrections once; every trip of the card gets the same ones
    pub fn new(config: &ObfuscationConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let day_shift = config.dates.then(|| {
            let mut days = 0;
            while days == 0 {
                days = rng.gen_range(-MAX_DAY_SHIFT..=MAX_DAY_SHIFT);
            }
            Duration::days(days)
        });
        let fare_factor = config.fares.then(|| rng.gen_range(0.5..1.5));
        Self {
            day_shift,
            fare_factor,
        }
    }

    /// Leaves every trip as it is
    pub fn identity() -> Self {
        Self {
            day_shift: None,
            fare_factor: None,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.day_shift.is_none() && self.fare_factor.is_none()
    }

    pub fn day_shift(&self) -> Option<Duration> {
        self.day_shift
    }

    fn shift(&self, at: Option<DateTime<Tz>>) -> Option<DateTime<Tz>> {
        match self.day_shift {
            Some(shift) => at.and_then(|t| t.checked_add_signed(shift)),
            None => at,
        }
    }

    fn scale(&self, amount: i64) -> i64 {
        match self.fare_factor {
            Some(factor) => (amount as f64 * factor).round() as i64,
            None => amount,
        }
    }

    pub fn apply<'a>(&'a self, trip: &'a Trip) -> ObfuscatedTrip<'a> {
        ObfuscatedTrip {
            trip,
            obfuscator: self,
        }
    }
}

/// A trip seen through an [`Obfuscator`]
#[derive(Debug, Clone, Copy)]
pub struct ObfuscatedTrip<'a> {
    trip: &'a Trip,
    obfuscator: &'a Obfuscator,
}

impl TripView for ObfuscatedTrip<'_> {
    fn start(&self) -> Option<DateTime<Tz>> {
        self.obfuscator.shift(self.trip.start())
    }

    fn end(&self) -> Option<DateTime<Tz>> {
        self.obfuscator.shift(self.trip.end())
    }

    fn fare(&self) -> i64 {
        self.obfuscator.scale(self.trip.fare())
    }

    fn trip(&self) -> &Trip {
        self.trip
    }
}

/// One-line rendering of a trip with operator names and currency
pub struct TripDisplay<'a, V: TripView + ?Sized> {
    view: &'a V,
    lookup: &'a dyn Lookup,
}

impl<'a, V: TripView + ?Sized> TripDisplay<'a, V> {
    pub fn new(view: &'a V, lookup: &'a dyn Lookup) -> Self {
        Self { view, lookup }
    }

    fn station(&self, station: Option<u64>) -> String {
        match station {
            Some(code) => self
                .lookup
                .station_name(code)
                .unwrap_or_else(|| format!("#{code}")),
            None => "?".to_string(),
        }
    }
}

fn time(at: Option<DateTime<Tz>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "----------------".to_string())
}

impl<V: TripView + ?Sized> fmt::Display for TripDisplay<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trip = self.view.trip();
        let when = match trip.kind() {
            TripKind::OrphanTapOff => self.view.end(),
            _ => self.view.start(),
        };
        write!(f, "{}  {:<7}", time(when), trip.mode().to_string())?;

        match trip.kind() {
            TripKind::Complete => write!(
                f,
                "  {} -> {}",
                self.station(trip.start_station()),
                self.station(trip.end_station())
            )?,
            TripKind::InProgress => write!(f, "  {} -> ...", self.station(trip.start_station()))?,
            TripKind::OrphanTapOff => write!(
                f,
                "  (no tap-on) -> {}",
                self.station(trip.end_station())
            )?,
        }

        if let Some(route) = trip.route() {
            let name = self
                .lookup
                .route_name(route)
                .unwrap_or_else(|| format!("route {route}"));
            write!(f, "  [{name}]")?;
        }
        if trip.is_continuation() {
            write!(f, "  (transfer)")?;
        }
        write!(f, "  {}", self.lookup.format_amount(self.view.fare()))
    }
}
