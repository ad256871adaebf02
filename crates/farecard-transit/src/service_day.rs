//! Whether a tap-on and a tap-off can belong to the same trip in time

use chrono::{NaiveDateTime, NaiveTime};

/// When an agency's service day ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDayRule {
    /// Service day of the previous date runs until this local time
    pub cutoff: Option<NaiveTime>,
    /// Whether trips are split at the end of the service day at all
    pub midnight_reset: bool,
}

impl ServiceDayRule {
    /// Plain calendar days
    pub const MIDNIGHT: Self = Self {
        cutoff: None,
        midnight_reset: true,
    };

    /// Service day that ends at `hour:00` the next morning
    pub fn until(hour: u32) -> Self {
        Self {
            cutoff: NaiveTime::from_hms_opt(hour, 0, 0),
            midnight_reset: true,
        }
    }
}

impl Default for ServiceDayRule {
    fn default() -> Self {
        Self::MIDNIGHT
    }
}

/// Local tap-on and tap-off times fall in one service day.
///
/// Same calendar date always qualifies. A tap-off on the next date qualifies
/// when it is before the cutoff, or when the agency has no reset. Any other
/// gap, including a tap-off before the tap-on date, never does.
pub fn same_service_day(on: NaiveDateTime, off: NaiveDateTime, rule: &ServiceDayRule) -> bool {
    let gap = off.date().signed_duration_since(on.date()).num_days();
    match gap {
        0 => true,
        1 => {
            let before_cutoff = rule.cutoff.map_or(false, |cutoff| off.time() < cutoff);
            before_cutoff || !rule.midnight_reset
        }
        _ => false,
    }
}
