//! Half-open time windows with second precision
//!
//! A `TimeWindow` is the unit of one statement query. The statement API
//! works in unix seconds, so windows are always aligned on whole seconds
//! and spans are halved in whole seconds as well.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fmt;

/// The interval `[start, end)`, never empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// `None` unless `start < end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Build from unix timestamps in seconds
    pub fn from_unix(start: i64, end: i64) -> Option<Self> {
        let start = Utc.timestamp_opt(start, 0).single()?;
        let end = Utc.timestamp_opt(end, 0).single()?;
        Self::new(start, end)
    }

    /// `self.start` accessor
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// `self.end` accessor
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Sub-window of `self` starting at `start` and lasting at most `span`
    ///
    /// The end is clamped to `self.end`. Returns `None` when `start` is
    /// already past the end of `self` or when `span` is not positive.
    pub fn sub(&self, start: DateTime<Utc>, span: Duration) -> Option<Self> {
        if start >= self.end || span <= Duration::zero() {
            return None;
        }
        let end = start
            .checked_add_signed(span)
            .map_or(self.end, |end| end.min(self.end));
        Self::new(start.max(self.start), end)
    }

    /// Same start, half the span (rounded down to the second)
    ///
    /// `None` if the result would be empty.
    pub fn halve(&self) -> Option<Self> {
        let half = Duration::seconds(self.span().num_seconds() / 2);
        self.sub(self.start, half)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} .. {}) ({}s)",
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S"),
            self.span().num_seconds(),
        )
    }
}
