use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::{Date, Month, OffsetDateTime};

/// Simple "YYYY-MM" utility with safe arithmetic and ordering.
/// Doubles as the aggregation period key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: u16,
    pub month: u8, // 1..=12
}

impl YearMonth {
    pub fn new(year: u16, month: u8) -> Self {
        assert!((1..=12).contains(&month), "Month must be 1..=12");
        Self { year, month }
    }
    pub fn next(self) -> Option<Self> {
        if self.month < 12 {
            Some(Self { year: self.year, month: self.month + 1 })
        } else if self.year < u16::MAX {
            Some(Self { year: self.year + 1, month: 1 })
        } else {
            None
        }
    }
    pub fn prev(self) -> Option<Self> {
        if self.month > 1 {
            Some(Self { year: self.year, month: self.month - 1 })
        } else if self.year > 0 {
            Some(Self { year: self.year - 1, month: 12 })
        } else {
            None
        }
    }

    /// Step back `n` months, saturating at year 0.
    pub fn back(self, n: u32) -> Self {
        let mut ym = self;
        for _ in 0..n {
            match ym.prev() {
                Some(p) => ym = p,
                None => break,
            }
        }
        ym
    }

    /// Month containing `dt` (dt is normalized to UTC first).
    pub fn containing(dt: OffsetDateTime) -> Self {
        let utc = dt.to_offset(time::UtcOffset::UTC);
        Self { year: utc.year().clamp(0, u16::MAX as i32) as u16, month: u8::from(utc.month()) }
    }

    /// First instant of the month, UTC.
    pub fn first_instant(self) -> OffsetDateTime {
        // month is always 1..=12 and day 1 exists in every month
        let month = Month::try_from(self.month).unwrap_or(Month::January);
        match Date::from_calendar_date(self.year as i32, month, 1) {
            Ok(d) => d.midnight().assume_utc(),
            Err(_) => OffsetDateTime::UNIX_EPOCH,
        }
    }

    /// First instant of the following month, UTC. Saturates at the last representable month.
    pub fn end_instant(self) -> OffsetDateTime {
        self.next().unwrap_or(self).first_instant()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.split('-').collect();
        if parts.len() != 2 {
            return Err("expected YYYY-MM".into());
        }
        let year: u16 = parts[0].parse().map_err(|_| "invalid year")?;
        let month: u8 = parts[1].parse().map_err(|_| "invalid month")?;
        if !(1..=12).contains(&month) {
            return Err("month must be 01..12".into());
        }
        Ok(Self { year, month })
    }
}

/// Inclusive iteration from `start` to `end` (if `start` <= `end`), else empty.
pub fn iter_year_months(start: YearMonth, end: YearMonth) -> impl Iterator<Item = YearMonth> {
    let mut curr = if start <= end { Some(start) } else { None };
    std::iter::from_fn(move || {
        let ret = curr?;
        curr = ret.next().filter(|n| *n <= end);
        Some(ret)
    })
}

/// Render a timestamp the way every output table stores it (RFC 3339, UTC).
pub fn format_timestamp(dt: OffsetDateTime) -> String {
    let utc = dt.to_offset(time::UtcOffset::UTC);
    utc.format(&Rfc3339).unwrap_or_else(|_| utc.unix_timestamp().to_string())
}

/// Parse an RFC 3339 string back into a timestamp.
pub fn parse_rfc3339(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s.trim(), &Rfc3339).ok()
}

/// Read a document timestamp. Accepted shapes:
///   - RFC 3339 string
///   - extended JSON `{"$date": <string | millis | {"$numberLong": "<millis>"}>}`
///   - bare epoch milliseconds
pub fn timestamp_from_value(v: &Value) -> Option<OffsetDateTime> {
    match v {
        Value::String(s) => parse_rfc3339(s),
        Value::Number(n) => from_millis(n.as_i64()?),
        Value::Object(map) => {
            let inner = map.get("$date")?;
            match inner {
                Value::Object(o) => {
                    let ms = o.get("$numberLong")?.as_str()?.parse::<i64>().ok()?;
                    from_millis(ms)
                }
                other => timestamp_from_value(other),
            }
        }
        _ => None,
    }
}

fn from_millis(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).ok()
}

/// Event time of a source document: `timestamp` when present, otherwise the
/// legacy `timestampUsec` (microseconds as a string or number).
pub fn document_timestamp(doc: &Value) -> Option<OffsetDateTime> {
    if let Some(ts) = doc.get("timestamp").and_then(timestamp_from_value) {
        return Some(ts);
    }
    let usec = match doc.get("timestampUsec")? {
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    OffsetDateTime::from_unix_timestamp_nanos(usec as i128 * 1_000).ok()
}
