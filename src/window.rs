//! Month-aligned query windows over the chat collection.

use crate::date::YearMonth;
use time::OffsetDateTime;

/// Half-open range `[start, end)` fed to the document source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeRange {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl TimeRange {
    #[inline]
    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// One month of the sweep. `start` is the first day of `period` except for the
/// very first window, which starts wherever the requested range starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonthWindow {
    pub period: YearMonth,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl MonthWindow {
    pub fn range(&self) -> TimeRange {
        TimeRange { start: self.start, end: self.end }
    }
}

/// Lazily walks `[from, until)` month by month.
///
/// Windows are contiguous, never overlap and come out in ascending order.
/// Every window ends on a month boundary, so the last one may reach past `until`.
#[derive(Clone, Debug)]
pub struct Windows {
    cursor: OffsetDateTime,
    until: OffsetDateTime,
}

impl Windows {
    pub fn new(from: OffsetDateTime, until: OffsetDateTime) -> Self {
        Self { cursor: from, until }
    }

    /// Derive the sweep range from the CLI knobs.
    ///   - `recent = None | Some(0)`: full history from `genesis`
    ///   - `recent = Some(n)`: from the first day of the month `n` months before `now`
    ///   - `ignore_halfway`: stop at the first day of `now`'s month
    pub fn plan(genesis: OffsetDateTime, now: OffsetDateTime, recent: Option<u32>, ignore_halfway: bool) -> Self {
        let current = YearMonth::containing(now);
        let from = match recent {
            Some(n) if n > 0 => current.back(n).first_instant(),
            _ => genesis,
        };
        let until = if ignore_halfway { current.first_instant() } else { now };
        Self::new(from, until)
    }

    /// Exclusive end of the planned range.
    pub fn limit(&self) -> OffsetDateTime {
        self.until
    }

    pub fn until(mut self, until: OffsetDateTime) -> Self {
        self.until = until;
        self
    }
}

impl Iterator for Windows {
    type Item = MonthWindow;

    fn next(&mut self) -> Option<MonthWindow> {
        if self.cursor >= self.until {
            return None;
        }
        let period = YearMonth::containing(self.cursor);
        let end = period.end_instant();
        if end <= self.cursor {
            // last representable month
            return None;
        }
        let w = MonthWindow { period, start: self.cursor, end };
        self.cursor = end;
        Some(w)
    }
}
