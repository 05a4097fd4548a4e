use chrono::{DateTime, Days, NaiveDate, NaiveTime, SecondsFormat, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Calendar window used by ledger reports. Both ends are inclusive days.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn all() -> Self {
        Self::default()
    }

    /// First instant inside the window.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.from.map(start_of_day)
    }

    /// First instant after the window: midnight following the `to` day.
    pub fn end_exclusive(&self) -> Option<DateTime<Utc>> {
        self.to
            .map(|day| day.checked_add_days(Days::new(1)).unwrap_or(day))
            .map(start_of_day)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        if let Some(start) = self.start() {
            if ts < start {
                return false;
            }
        }
        if let Some(end) = self.end_exclusive() {
            if ts >= end {
                return false;
            }
        }
        true
    }
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

/// Fixed-width RFC 3339 rendering; lexical order equals chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Drop precision the store cannot keep, so recorded values equal reloaded ones.
pub fn storage_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_day_is_inclusive() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let range = DateRange::new(None, Some(day));
        let late = Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap();
        let next = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        assert!(range.contains(late));
        assert!(!range.contains(next));
    }

    #[test]
    fn start_day_is_inclusive() {
        let range = DateRange::new(NaiveDate::from_ymd_opt(2024, 1, 2), None);
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap()));
        assert!(DateRange::all().contains(Utc::now()));
    }

    #[test]
    fn timestamps_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 10, 2, 3, 4, 5).unwrap();
        assert!(format_timestamp(early) < format_timestamp(late));
        assert_eq!(format_timestamp(early), "2024-01-02T03:04:05.000000Z");
        let now = storage_precision(Utc::now());
        let reparsed = DateTime::parse_from_rfc3339(&format_timestamp(now)).unwrap();
        assert_eq!(reparsed.with_timezone(&Utc), now);
    }
}
