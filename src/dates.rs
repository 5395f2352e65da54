//! Calendar-date decoding for record payloads.
//!
//! Record dates normally arrive as `yyyy-MM-dd`, but some producers send
//! full timestamps. Decoding walks an ordered list of parsers and keeps the
//! first one that succeeds; each parser returns `None` instead of failing.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

type Attempt = fn(&str) -> Option<NaiveDate>;

const ATTEMPTS: [Attempt; 3] = [plain_date, offset_timestamp, local_timestamp];

/// Decode a calendar date, dropping any time-of-day component.
pub fn parse_calendar_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    ATTEMPTS.iter().find_map(|attempt| attempt(input))
}

fn plain_date(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input, DATE_FORMAT).ok()
}

/// RFC 3339, with or without fractional seconds. The date is taken in the
/// offset the timestamp was written in.
fn offset_timestamp(input: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|ts| ts.date_naive())
}

/// ISO 8601 timestamp without an offset, e.g. `2024-03-01T08:30:00.5`.
fn local_timestamp(input: &str) -> Option<NaiveDate> {
    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|ts| ts.date())
}

/// Serde adapter: lenient decode, `yyyy-MM-dd` encode.
pub mod lenient {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(super::DATE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_calendar_date(&raw)
            .ok_or_else(|| de::Error::custom(format!("cannot decode date: {raw}")))
    }
}

/// [`lenient`] for optional dates; `null` stays `None`.
pub mod lenient_opt {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        date: &Option<NaiveDate>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => serializer.collect_str(&date.format(super::DATE_FORMAT)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => super::parse_calendar_date(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("cannot decode date: {raw}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn plain_dates_parse_first() {
        assert_eq!(parse_calendar_date("2024-03-01"), Some(ymd(2024, 3, 1)));
        assert_eq!(parse_calendar_date(" 2024-03-01\n"), Some(ymd(2024, 3, 1)));
    }

    #[test]
    fn timestamps_fall_back() {
        assert_eq!(
            parse_calendar_date("2024-03-01T23:10:00.250Z"),
            Some(ymd(2024, 3, 1))
        );
        assert_eq!(
            parse_calendar_date("2024-03-01T23:10:00+09:00"),
            Some(ymd(2024, 3, 1))
        );
        assert_eq!(
            parse_calendar_date("2024-03-01T23:10:00"),
            Some(ymd(2024, 3, 1))
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(parse_calendar_date(""), None);
        assert_eq!(parse_calendar_date("03/01/2024"), None);
        assert_eq!(parse_calendar_date("2024-02-30"), None);
    }
}
