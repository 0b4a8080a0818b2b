//! Complete retrieval of a statement over an arbitrary range
//!
//! The statement API has no cursor: a query is a time window, and the answer
//! is capped at `page_limit` records. A page that comes back full may have
//! lost records, so the window is halved until the answer is provably
//! complete. Accepted windows are then walked in order until the range is
//! exhausted.
//!
//! The loop is strictly sequential, each answer decides the bounds of the
//! next query.

use chrono::Duration;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::lib::{
    record::{Ledger, TransactionRecord},
    retry::{RetryPolicy, Sleeper, ThreadSleeper},
    window::TimeWindow,
};

/// Failure of a single statement query
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("rate limited by the statement source")]
    RateLimited,
    #[error("statement source answered with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not reach the statement source: {0}")]
    Transport(String),
    #[error("statement payload could not be decoded: {0}")]
    Decode(String),
}

impl SourceError {
    /// Failures that go away by waiting
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::RateLimited | SourceError::Transport(_) => true,
            SourceError::Status { status, .. } => *status >= 500,
            SourceError::Decode(_) => false,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, SourceError::Status { status, .. } if (400..500).contains(status))
    }
}

/// Anything that can answer a statement query for one window
pub trait StatementSource {
    /// Records of `window`, in any order, at most the source's page limit
    fn statement(&mut self, window: &TimeWindow) -> Result<Vec<TransactionRecord>, SourceError>;
}

impl<S: StatementSource + ?Sized> StatementSource for &mut S {
    fn statement(&mut self, window: &TimeWindow) -> Result<Vec<TransactionRecord>, SourceError> {
        (**self).statement(window)
    }
}

/// Fatal outcomes of a fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page limit must be at least 1")]
    ZeroPageLimit,
    #[error("invalid window spans: initial {initial}s, minimum {min}s (need 0 < minimum <= initial)")]
    InvalidSpan { initial: i64, min: i64 },
    #[error(
        "window {window} returned {page_len} records (page limit {limit}) \
         and cannot be halved below the minimum span of {min_span}s"
    )]
    WindowCollapse {
        window: TimeWindow,
        page_len: usize,
        limit: usize,
        min_span: i64,
    },
    #[error("gave up on window {window} after {attempts} attempts")]
    RetriesExhausted {
        window: TimeWindow,
        attempts: usize,
        #[source]
        source: SourceError,
    },
    #[error("statement source rejected window {window}")]
    Upstream {
        window: TimeWindow,
        #[source]
        source: SourceError,
    },
}

/// Window sizing for a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// span of the very first window
    pub initial_span: Duration,
    /// a full page on a window this small is fatal
    pub min_span: Duration,
    /// maximum number of records the source returns per query
    pub page_limit: usize,
}

impl FetchPolicy {
    pub const DEFAULT_PAGE_LIMIT: usize = 500;

    fn check(&self) -> Result<(), FetchError> {
        if self.page_limit == 0 {
            return Err(FetchError::ZeroPageLimit);
        }
        if self.min_span < Duration::seconds(1) || self.initial_span < self.min_span {
            return Err(FetchError::InvalidSpan {
                initial: self.initial_span.num_seconds(),
                min: self.min_span.num_seconds(),
            });
        }
        Ok(())
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            initial_span: Duration::hours(12),
            min_span: Duration::seconds(1),
            page_limit: Self::DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Walks a range window by window and collects every record in it
pub struct LedgerFetcher<S, Z = ThreadSleeper> {
    source: S,
    policy: FetchPolicy,
    retry: RetryPolicy,
    sleeper: Z,
}

impl<S> LedgerFetcher<S>
where
    S: StatementSource,
{
    pub fn new(source: S, policy: FetchPolicy, retry: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            retry,
            sleeper: ThreadSleeper,
        }
    }
}

impl<S, Z> LedgerFetcher<S, Z>
where
    S: StatementSource,
    Z: Sleeper,
{
    /// Replace the way the fetcher waits between attempts
    pub fn with_sleeper<Y: Sleeper>(self, sleeper: Y) -> LedgerFetcher<S, Y> {
        LedgerFetcher {
            source: self.source,
            policy: self.policy,
            retry: self.retry,
            sleeper,
        }
    }

    /// Every record of `range`, oldest first
    ///
    /// Blocks for as long as the retry policy allows the source to fail.
    pub fn fetch(&mut self, range: &TimeWindow) -> Result<Ledger, FetchError> {
        self.policy.check()?;
        let limit = self.policy.page_limit;
        let mut ledger = Ledger::new();
        let mut span = self.policy.initial_span;
        let mut next = range.sub(range.start(), span);
        let mut queries = 0usize;
        while let Some(window) = next {
            let mut page = self.page(&window)?;
            queries += 1;
            if page.len() >= limit {
                let halved = window
                    .halve()
                    .filter(|half| half.span() >= self.policy.min_span);
                match halved {
                    Some(half) => {
                        info!(window = %window, records = page.len(), "page is full, halving window");
                        span = half.span();
                        next = Some(half);
                        continue;
                    }
                    None => {
                        return Err(FetchError::WindowCollapse {
                            window,
                            page_len: page.len(),
                            limit,
                            min_span: self.policy.min_span.num_seconds(),
                        })
                    }
                }
            }
            let answered = page.len();
            // a record outside the window belongs to a neighbour and is fetched there
            page.retain(|rec| rec.timestamp().map_or(false, |t| window.contains(t)));
            if page.len() < answered {
                warn!(window = %window, dropped = answered - page.len(), "records outside the window");
            }
            debug!(window = %window, records = page.len(), "window complete");
            page.sort_by_key(|rec| rec.time);
            ledger.append(&mut page);
            next = range.sub(window.end(), span);
        }
        info!(range = %range, records = ledger.len(), queries, "statement fetched");
        Ok(ledger)
    }

    /// One answered query for `window`, waiting out transient failures
    fn page(&mut self, window: &TimeWindow) -> Result<Vec<TransactionRecord>, FetchError> {
        let started = Instant::now();
        let mut failures = 0usize;
        loop {
            let err = match self.source.statement(window) {
                Ok(page) => return Ok(page),
                Err(err) => err,
            };
            let retryable =
                err.is_transient() || (self.retry.retry_client_errors && err.is_client_error());
            if !retryable {
                return Err(FetchError::Upstream {
                    window: *window,
                    source: err,
                });
            }
            failures += 1;
            if !self.retry.allows(failures, started.elapsed()) {
                return Err(FetchError::RetriesExhausted {
                    window: *window,
                    attempts: failures,
                    source: err,
                });
            }
            warn!(
                window = %window,
                error = %err,
                failures,
                backoff_secs = self.retry.backoff.as_secs(),
                "statement query failed, backing off"
            );
            self.sleeper.sleep(self.retry.backoff);
        }
    }
}
