//! The packed creation-date word.
//!
//! Sixteen bits: bits 0–4 hold the year since the epoch, bits 5–9 the day,
//! bits 10–13 the month, and bits 14–15 an "age" counting 32-year spans.
//! The epoch is 1972, so the representable range is 1972..=2099. A word of
//! zero means "no date recorded".

use chrono::{Datelike, Local, NaiveDate};

const EPOCH_YEAR: i32 = 1972;
const YEARS_PER_AGE: i32 = 32;
const MAX_YEAR: i32 = EPOCH_YEAR + 4 * YEARS_PER_AGE - 1;

/// Decode a packed date word.
///
/// Returns `None` for the zero word and for any packed value that does not
/// name a real calendar day (month 0 or 13+, day 31 in a 30-day month,
/// February 29 outside a leap year, and so on).
#[must_use]
pub fn decode_date(word: u16) -> Option<NaiveDate> {
    if word == 0 {
        return None;
    }

    let age = i32::from((word >> 14) & 0o3);
    let month = u32::from((word >> 10) & 0o17);
    let day = u32::from((word >> 5) & 0o37);
    let year = EPOCH_YEAR + age * YEARS_PER_AGE + i32::from(word & 0o37);

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Encode a calendar date into the packed word.
///
/// Returns `None` for dates outside 1972..=2099, which the format cannot
/// represent.
#[must_use]
pub fn encode_date(date: NaiveDate) -> Option<u16> {
    let year = date.year();
    if !(EPOCH_YEAR..=MAX_YEAR).contains(&year) {
        return None;
    }

    let offset = year - EPOCH_YEAR;
    let age = (offset / YEARS_PER_AGE) as u16;
    let year_in_age = (offset % YEARS_PER_AGE) as u16;
    let month = date.month() as u16;
    let day = date.day() as u16;

    Some((age << 14) | (month << 10) | (day << 5) | year_in_age)
}

/// The packed word for today's local date, or zero if the current year is
/// not representable.
#[must_use]
pub fn current_date_word() -> u16 {
    encode_date(Local::now().date_naive()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_word_means_no_date() {
        assert_eq!(decode_date(0), None);
    }

    #[test]
    fn encode_decode_round_trips() {
        for (y, m, d) in [(1972, 1, 1), (1985, 12, 31), (2003, 6, 15), (2099, 2, 28)] {
            let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
            let word = encode_date(date).unwrap();
            assert_eq!(decode_date(word), Some(date), "{y}-{m}-{d}");
        }
    }

    #[test]
    fn age_field_extends_past_2003() {
        let date = NaiveDate::from_ymd_opt(2004, 1, 1).unwrap();
        let word = encode_date(date).unwrap();
        assert_eq!(word >> 14, 1);
        assert_eq!(decode_date(word), Some(date));
    }

    #[test]
    fn leap_day_is_validated() {
        // 1976 is a leap year, 1977 is not.
        let feb29_1976 = (2 << 10) | (29 << 5) | 4;
        assert_eq!(
            decode_date(feb29_1976),
            Some(NaiveDate::from_ymd_opt(1976, 2, 29).unwrap())
        );

        let feb29_1977 = (2 << 10) | (29 << 5) | 5;
        assert_eq!(decode_date(feb29_1977), None);
    }

    #[test]
    fn nonsense_fields_decode_as_none() {
        // month 15
        assert_eq!(decode_date((15 << 10) | (1 << 5) | 1), None);
        // day 0
        assert_eq!(decode_date((6 << 10) | 1), None);
        // day 31 in June
        assert_eq!(decode_date((6 << 10) | (31 << 5) | 1), None);
    }

    #[test]
    fn out_of_range_years_do_not_encode() {
        assert_eq!(encode_date(NaiveDate::from_ymd_opt(1971, 12, 31).unwrap()), None);
        assert_eq!(encode_date(NaiveDate::from_ymd_opt(2100, 1, 1).unwrap()), None);
    }
}
