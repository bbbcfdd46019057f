use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use crate::error::TleError;
use crate::tle::field;

// Two-digit years below this pivot belong to the 2000s.
pub const CENTURY_PIVOT: u32 = 57;

const MICROS_PER_DAY: f64 = 86_400_000_000.0;

pub fn resolve_epoch(line1: &str) -> Result<DateTime<Utc>, TleError> {
    let year_token = field(line1, 19..=20);
    let day_token = field(line1, 21..=32);

    if year_token.len() != 2 || !year_token.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(TleError::InvalidEpoch(format!("year {year_token:?}")));
    }
    let two_digit: u32 = year_token
        .parse()
        .map_err(|_| TleError::InvalidEpoch(format!("year {year_token:?}")))?;
    let day_of_year: f64 = day_token
        .parse()
        .map_err(|_| TleError::InvalidEpoch(format!("day {day_token:?}")))?;
    if !(1.0..367.0).contains(&day_of_year) {
        return Err(TleError::InvalidEpoch(format!("day {day_token:?}")));
    }

    let year = full_year(two_digit);
    let start = NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| TleError::InvalidEpoch(format!("year {year}")))?
        .and_utc();

    let offset_micros = ((day_of_year - 1.0) * MICROS_PER_DAY).round() as i64;
    Ok(start + TimeDelta::microseconds(offset_micros))
}

pub fn full_year(two_digit: u32) -> i32 {
    let two_digit = (two_digit % 100) as i32;
    if two_digit < CENTURY_PIVOT as i32 {
        2000 + two_digit
    } else {
        1900 + two_digit
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    fn line1_with_epoch(epoch: &str) -> String {
        format!("1 25544U 98067A   {epoch} -.00002182  00000-0 -11606-4 0  2927")
    }

    #[test]
    fn century_pivot() {
        assert_eq!(full_year(56), 2056);
        assert_eq!(full_year(57), 1957);
        assert_eq!(full_year(99), 1999);
        assert_eq!(full_year(0), 2000);
    }

    #[test]
    fn resolves_iss_epoch() {
        let epoch = resolve_epoch(&line1_with_epoch("08264.51782528")).unwrap();
        assert_eq!(epoch.year(), 2008);
        assert_eq!(epoch.ordinal(), 264);
        assert_eq!(epoch.hour(), 12);
        assert_eq!(epoch.minute(), 25);
    }

    #[test]
    fn rejects_out_of_range_day() {
        assert!(resolve_epoch(&line1_with_epoch("24000.50000000")).is_err());
        assert!(resolve_epoch(&line1_with_epoch("24abc.50000000")).is_err());
    }
}
