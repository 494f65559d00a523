//! Month index calendar.
//!
//! Panel time ids are consecutive month numbers. A calendar pins month id 1
//! to a calendar month so ids can be shown as dates and date columns can be
//! converted into ids.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Maps month ids to calendar months. Month id 1 is `first_month`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthCalendar {
    pub first_month: NaiveDate,
}

impl Default for MonthCalendar {
    /// January 1980 is month 1.
    fn default() -> Self {
        Self {
            first_month: NaiveDate::from_ymd_opt(1980, 1, 1).unwrap_or_default(),
        }
    }
}

impl MonthCalendar {
    pub fn new(first_month: NaiveDate) -> Self {
        Self { first_month }
    }

    /// Month id of the month containing `date`.
    pub fn month_id(&self, date: NaiveDate) -> i64 {
        let years = (date.year() - self.first_month.year()) as i64;
        let months = date.month() as i64 - self.first_month.month() as i64;
        years * 12 + months + 1
    }

    /// First day of the month with the given id.
    pub fn date(&self, month_id: i64) -> Option<NaiveDate> {
        let first = self.first_month.year() as i64 * 12 + self.first_month.month0() as i64;
        let offset = first + month_id - 1;
        let year = i32::try_from(offset.div_euclid(12)).ok()?;
        let month = offset.rem_euclid(12) as u32 + 1;
        NaiveDate::from_ymd_opt(year, month, 1)
    }

    /// `YYYY-MM` label, or the raw id when out of range.
    pub fn label(&self, month_id: i64) -> String {
        match self.date(month_id) {
            Some(date) => date.format("%Y-%m").to_string(),
            None => month_id.to_string(),
        }
    }
}

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

/// Convert days since Unix epoch to NaiveDate. `None` outside chrono's range.
pub(crate) fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_CE_DAYS)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_origin() {
        let cal = MonthCalendar::default();
        assert_eq!(cal.label(1), "1980-01");
        assert_eq!(cal.label(13), "1981-01");
        assert_eq!(cal.label(0), "1979-12");
    }

    #[test]
    fn test_month_id_round_trip() {
        let cal = MonthCalendar::default();
        let date = NaiveDate::from_ymd_opt(2020, 7, 15).unwrap();
        let id = cal.month_id(date);
        assert_eq!(id, 487);
        assert_eq!(cal.date(id), NaiveDate::from_ymd_opt(2020, 7, 1));
    }

    #[test]
    fn test_custom_origin() {
        let cal = MonthCalendar::new(NaiveDate::from_ymd_opt(2000, 11, 1).unwrap());
        assert_eq!(cal.month_id(NaiveDate::from_ymd_opt(2001, 2, 28).unwrap()), 4);
        assert_eq!(cal.label(3), "2001-01");
    }

    #[test]
    fn test_date_from_days() {
        assert_eq!(date_from_days(18262), NaiveDate::from_ymd_opt(2020, 1, 1));
        assert_eq!(date_from_days(0), NaiveDate::from_ymd_opt(1970, 1, 1));
        assert_eq!(date_from_days(i32::MAX), None);
        assert_eq!(date_from_days(i32::MIN), None);
    }
}
