//! Trips reconstructed from tap records

use chrono::{DateTime, Duration};
use chrono_tz::Tz;

use crate::record::Record;

/// Vehicle type of a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMode {
    Bus,
    Train,
    Tram,
    Metro,
    Ferry,
    Unknown,
}

impl TransportMode {
    /// Mode for a stored mode code: 1 bus, 2 train, 3 tram, 4 metro, 5 ferry
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => TransportMode::Bus,
            2 => TransportMode::Train,
            3 => TransportMode::Tram,
            4 => TransportMode::Metro,
            5 => TransportMode::Ferry,
            _ => TransportMode::Unknown,
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransportMode::Bus => "Bus",
            TransportMode::Train => "Train",
            TransportMode::Tram => "Tram",
            TransportMode::Metro => "Metro",
            TransportMode::Ferry => "Ferry",
            TransportMode::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// How much of a trip the card recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TripKind {
    /// Tap-on and tap-off were paired
    Complete,
    /// Only a tap-on: still travelling, or the agency never records tap-offs
    InProgress,
    /// A refunding tap-off with no tap-on; only end fields are known
    OrphanTapOff,
}

/// One reconstructed trip. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    start_station: Option<u64>,
    end_station: Option<u64>,
    start: Option<DateTime<Tz>>,
    end: Option<DateTime<Tz>>,
    fare: i64,
    mode: TransportMode,
    route: Option<u64>,
    agency: Option<u64>,
    continuation: bool,
    kind: TripKind,
}

impl Trip {
    /// Trip opened by `on` with no tap-off
    pub fn tapped_on(on: &Record) -> Self {
        Self {
            start_station: on.station(),
            end_station: None,
            start: on.timestamp(),
            end: None,
            fare: on.value(),
            mode: on.mode(),
            route: on.route(),
            agency: on.agency(),
            continuation: on.is_continuation(),
            kind: TripKind::InProgress,
        }
    }

    /// Trip from a paired tap-on and tap-off
    pub fn paired(on: &Record, off: &Record, fare: i64) -> Self {
        Self {
            end_station: off.station(),
            end: off.timestamp(),
            fare,
            kind: TripKind::Complete,
            ..Self::tapped_on(on)
        }
    }

    /// Tap-off that nothing opened
    pub fn orphan(off: &Record) -> Self {
        Self {
            start_station: None,
            end_station: off.station(),
            start: None,
            end: off.timestamp(),
            fare: off.value(),
            mode: off.mode(),
            route: off.route(),
            agency: off.agency(),
            continuation: off.is_continuation(),
            kind: TripKind::OrphanTapOff,
        }
    }

    pub fn start_station(&self) -> Option<u64> {
        self.start_station
    }

    pub fn end_station(&self) -> Option<u64> {
        self.end_station
    }

    pub fn start(&self) -> Option<DateTime<Tz>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Tz>> {
        self.end
    }

    /// Fare in minor currency units; negative for refunds
    pub fn fare(&self) -> i64 {
        self.fare
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn route(&self) -> Option<u64> {
        self.route
    }

    pub fn agency(&self) -> Option<u64> {
        self.agency
    }

    /// Continues an earlier trip (transfer)
    pub fn is_continuation(&self) -> bool {
        self.continuation
    }

    pub fn kind(&self) -> TripKind {
        self.kind
    }

    /// Time between tap-on and tap-off, for complete trips
    pub fn duration(&self) -> Option<Duration> {
        Some(self.end? - self.start?)
    }

    /// Start time, or end time for orphaned tap-offs
    pub fn sort_time(&self) -> Option<DateTime<Tz>> {
        self.start.or(self.end)
    }
}

/// Read-only view of a trip, possibly adjusted for display
pub trait TripView {
    fn start(&self) -> Option<DateTime<Tz>>;
    fn end(&self) -> Option<DateTime<Tz>>;
    fn fare(&self) -> i64;
    fn trip(&self) -> &Trip;
}

impl TripView for Trip {
    fn start(&self) -> Option<DateTime<Tz>> {
        self.start
    }

    fn end(&self) -> Option<DateTime<Tz>> {
        self.end
    }

    fn fare(&self) -> i64 {
        self.fare
    }

    fn trip(&self) -> &Trip {
        self
    }
}
