//! Convert command line ranges and spans into time windows and durations

#![allow(clippy::upper_case_acronyms)]

use chrono::{DateTime, Duration, FixedOffset, Month, NaiveDate, NaiveTime, TimeZone, Utc};
use pest::Parser;
use pest_derive::*;

/// Wrapper around Pest's `Pair`
type Pair<'i> = pest::iterators::Pair<'i, Rule>;

use crate::lib::window::TimeWindow;
use crate::load::error;

/// Pest-generated parser
#[derive(Parser)]
#[grammar = "load/range.pest"]
pub struct RangeParser;

/// Longest span accepted, about a century
const MAX_SPAN_SECS: i64 = 100 * 366 * 86_400;

// extract contents of wrapper rule
macro_rules! subrule {
    ( $node:expr ) => {{
        let mut items = $node.into_inner();
        let fst = items.next().unwrap_or_else(|| panic!("No subrule"));
        if items.next().is_some() {
            panic!("Several subrules");
        }
        fst
    }};
}

// extract two-element inner
macro_rules! pair {
    ( $node:expr ) => {{
        let mut items = $node.into_inner();
        let fst = items.next().unwrap_or_else(|| panic!("No 1st"));
        let snd = items.next().unwrap_or_else(|| panic!("No 2nd"));
        assert!(items.next().is_none());
        (fst, snd)
    }};
}

// extract three-element inner
macro_rules! triplet {
    ( $node:expr ) => {{
        let mut items = $node.into_inner();
        let fst = items.next().unwrap_or_else(|| panic!("No 1st"));
        let snd = items.next().unwrap_or_else(|| panic!("No 2nd"));
        let thr = items.next().unwrap_or_else(|| panic!("No 3rd"));
        assert!(items.next().is_none());
        (fst, snd, thr)
    }};
}

// pair to u32 contents
macro_rules! parse_u32 {
    ( $node:expr ) => {
        // at most 4 digits, validated by the grammar
        $node.as_str().parse::<u32>().unwrap()
    };
}

/// Read a range `start .. end?`
///
/// Calendar dates are read in the timezone `offset`, a missing end means `now`.
/// `path` names the input in error messages (e.g. `"--range"`).
///
/// On failure the reasons are recorded in `errs` and `None` is returned.
pub fn range<'i>(
    path: &'i str,
    text: &'i str,
    offset: FixedOffset,
    now: DateTime<Utc>,
    errs: &mut error::Record,
) -> Option<TimeWindow> {
    let node = match RangeParser::parse(Rule::range, text) {
        Ok(mut nodes) => nodes.next().unwrap_or_else(|| panic!("No range")),
        Err(e) => {
            errs.make("Parsing failure")
                .from(e.with_path(path))
                .hint("ranges look like '2022-Dec-01 .. 2023-Jan-01 12:00' or '@1669845600 ..'");
            return None;
        }
    };
    let loc = (path, node.as_span());
    let mut bounds = node
        .into_inner()
        .filter(|item| item.as_rule() == Rule::instant);
    let start = instant(path, errs, bounds.next()?, offset)?;
    let end = match bounds.next() {
        Some(item) => instant(path, errs, item, offset)?,
        None => now,
    };
    if TimeWindow::new(start, end).is_none() {
        errs.make("Empty range")
            .span(&loc, "does not end after it starts")
            .text(format!("{} is not before {}", start, end))
            .hint("swap the two bounds or move the end later");
        return None;
    }
    if end <= now {
        return TimeWindow::new(start, end);
    }
    // nothing can be recorded after `now`
    match TimeWindow::new(start, now) {
        Some(window) => {
            errs.make("Range ends in the future")
                .nonfatal()
                .span(&loc, "ends after the current time")
                .text(format!("the range is cut at {}", now));
            Some(window)
        }
        None => {
            errs.make("Range starts in the future")
                .span(&loc, "has no past part")
                .text(format!("{} is after the current time {}", start, now));
            None
        }
    }
}

/// Read one bound of a range
fn instant<'i>(
    path: &'i str,
    errs: &mut error::Record,
    pair: Pair<'i>,
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    let loc = (path, pair.as_span());
    let inner = subrule!(pair);
    match inner.as_rule() {
        Rule::unix => {
            let secs = subrule!(inner).as_str().parse::<i64>().ok();
            match secs.and_then(|secs| Utc.timestamp_opt(secs, 0).single()) {
                Some(instant) => Some(instant),
                None => {
                    errs.make("Invalid timestamp")
                        .span(&loc, "provided here")
                        .text("this many seconds cannot be represented as a date");
                    None
                }
            }
        }
        Rule::calendar => {
            let mut items = inner.into_inner();
            let date = items.next().unwrap_or_else(|| panic!("No date"));
            let clock = items.next();
            let date = calendar_date(path, errs, date)?;
            let time = match clock {
                Some(clock) => clock_time(path, errs, clock)?,
                None => NaiveTime::MIN,
            };
            match offset.from_local_datetime(&date.and_time(time)).single() {
                Some(instant) => Some(instant.with_timezone(&Utc)),
                None => {
                    errs.make("Invalid date")
                        .span(&loc, "provided here")
                        .text("this date cannot be represented in the configured timezone");
                    None
                }
            }
        }
        _ => unreachable!(),
    }
}

/// `YYYY-Mmm-DD`
fn calendar_date<'i>(path: &'i str, errs: &mut error::Record, pair: Pair<'i>) -> Option<NaiveDate> {
    let loc = (path, pair.as_span());
    let (year, month, day) = triplet!(pair);
    let month_loc = (path, month.as_span());
    let month = match month.as_str().parse::<Month>() {
        Ok(month) => month,
        Err(_) => {
            errs.make("Invalid month")
                .span(&month_loc, "provided here")
                .hint("Months are 'Jan', 'Feb', ..., 'Dec'");
            return None;
        }
    };
    let (year, day) = (parse_u32!(year), parse_u32!(day));
    match NaiveDate::from_ymd_opt(year as i32, month.number_from_month(), day) {
        Some(date) => Some(date),
        None => {
            errs.make("Invalid date")
                .span(&loc, "provided here")
                .text(format!("{:?} {} has no day {}", month, year, day))
                .hint("choose a date that exists");
            None
        }
    }
}

/// `HH:MM` or `HH:MM:SS`
fn clock_time<'i>(path: &'i str, errs: &mut error::Record, pair: Pair<'i>) -> Option<NaiveTime> {
    let loc = (path, pair.as_span());
    let mut items = pair.into_inner();
    let hour = parse_u32!(items.next().unwrap_or_else(|| panic!("No hour")));
    let minute = parse_u32!(items.next().unwrap_or_else(|| panic!("No minute")));
    let second = items.next().map_or(0, |s| parse_u32!(s));
    match NaiveTime::from_hms_opt(hour, minute, second) {
        Some(time) => Some(time),
        None => {
            errs.make("Invalid time of day")
                .span(&loc, "provided here")
                .hint("hours are 0..=23, minutes and seconds 0..=59");
            None
        }
    }
}

/// Read the span of the first fetch window, raised to `min` if shorter
pub fn initial_span<'i>(
    path: &'i str,
    text: &'i str,
    min: Duration,
    errs: &mut error::Record,
) -> Option<Duration> {
    let requested = span(path, text, errs)?;
    if requested >= min {
        return Some(requested);
    }
    errs.make("Span below the minimum")
        .nonfatal()
        .text(format!(
            "{}s is shorter than the minimum window of {}s, using the minimum",
            requested.num_seconds(),
            min.num_seconds()
        ))
        .hint("lower fetch.min_span_secs to allow smaller windows");
    Some(min)
}

/// Read a span such as `12h`, `1d12h` or `90s`
pub fn span<'i>(path: &'i str, text: &'i str, errs: &mut error::Record) -> Option<Duration> {
    let node = match RangeParser::parse(Rule::span, text) {
        Ok(mut nodes) => nodes.next().unwrap_or_else(|| panic!("No span")),
        Err(e) => {
            errs.make("Parsing failure")
                .from(e.with_path(path))
                .hint("spans look like '12h', '30m', '1d12h'");
            return None;
        }
    };
    let loc = (path, node.as_span());
    let mut total = Some(0i64);
    for term in node
        .into_inner()
        .filter(|item| item.as_rule() == Rule::span_term)
    {
        let (count, unit) = pair!(term);
        let scale = match unit.as_str() {
            "d" => 86_400,
            "h" => 3_600,
            "m" => 60,
            "s" => 1,
            _ => unreachable!(),
        };
        let secs = count
            .as_str()
            .parse::<i64>()
            .ok()
            .and_then(|n| n.checked_mul(scale));
        total = total.zip(secs).and_then(|(t, s)| t.checked_add(s));
    }
    match total {
        Some(0) => {
            errs.make("Empty span")
                .span(&loc, "lasts zero seconds")
                .hint("windows must last at least one second");
            None
        }
        Some(secs) if secs <= MAX_SPAN_SECS => Some(Duration::seconds(secs)),
        _ => {
            errs.make("Span too long")
                .span(&loc, "provided here")
                .text(format!("spans are limited to {} seconds", MAX_SPAN_SECS));
            None
        }
    }
}
