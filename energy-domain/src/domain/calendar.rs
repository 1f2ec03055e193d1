use std::fmt;

use serde::{Serialize, Serializer};
use time::{Date, PrimitiveDateTime, Time};

/// Calendar month key used by the monthly bucket families.
///
/// Ordering is chronological, so a `BTreeMap` keyed by `YearMonth` iterates
/// months in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u8,
}

impl YearMonth {
    pub fn new(year: i32, month: u8) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: Date) -> Self {
        Self {
            year: date.year(),
            month: u8::from(date.month()),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    /// The following calendar month; December rolls over into January of the next year.
    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Truncate a timestamp to the start of its hour.
pub fn hour_floor(ts: PrimitiveDateTime) -> PrimitiveDateTime {
    let time = Time::from_hms(ts.hour(), 0, 0).unwrap_or(Time::MIDNIGHT);
    PrimitiveDateTime::new(ts.date(), time)
}

pub fn date_label(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

pub fn hour_label(ts: PrimitiveDateTime) -> String {
    format!("{}T{:02}:00", date_label(ts.date()), ts.hour())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn next_month_rolls_over_december() {
        let dec = YearMonth::new(2024, 12).unwrap();
        assert_eq!(dec.next(), YearMonth::new(2025, 1).unwrap());
        assert_eq!(YearMonth::new(2025, 3).unwrap().next().to_string(), "2025-04");
    }

    #[test]
    fn rejects_invalid_month() {
        assert!(YearMonth::new(2024, 0).is_none());
        assert!(YearMonth::new(2024, 13).is_none());
    }

    #[test]
    fn months_order_chronologically() {
        let a = YearMonth::from_date(date!(2024 - 12 - 31));
        let b = YearMonth::from_date(date!(2025 - 01 - 01));
        assert!(a < b);
    }

    #[test]
    fn hour_floor_truncates_minutes_and_seconds() {
        let ts = datetime!(2024-03-05 13:47:12);
        assert_eq!(hour_floor(ts), datetime!(2024-03-05 13:00:00));
        assert_eq!(hour_label(ts), "2024-03-05T13:00");
    }

    #[test]
    fn serializes_as_label() {
        let m = YearMonth::new(2025, 2).unwrap();
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"2025-02\"");
    }
}
