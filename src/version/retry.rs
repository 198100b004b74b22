//! Bounded concurrent execution with classified retries
//!
//! [`retry`] re-runs a single registry query while its failures look
//! transient. [`first_match`] runs a worker over an ordered list of items
//! with a fixed number in flight and commits results strictly in item
//! order, so the earliest matching item wins no matter which query
//! finishes first.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::{
    CrawlConfig, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY_MS, default_transient_markers,
};
use crate::version::error::RegistryError;

/// What to do with a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Abort,
}

/// How often and how patiently a failing query is retried
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub factor: u32,
    /// Substrings marking a failure as transient registry contention
    pub transient_markers: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            factor: 2,
            transient_markers: default_transient_markers(),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            retries: config.retries,
            base_delay: Duration::from_millis(config.retry_delay_ms),
            transient_markers: config.transient_markers.clone(),
            ..Self::default()
        }
    }

    /// Classify a failure as retryable or fatal
    pub fn classify(&self, error: &RegistryError) -> RetryDecision {
        if matches!(error, RegistryError::RateLimited { .. }) {
            return RetryDecision::Retry;
        }

        let message = error.to_string();
        if self
            .transient_markers
            .iter()
            .any(|marker| message.contains(marker.as_str()))
        {
            RetryDecision::Retry
        } else {
            RetryDecision::Abort
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(self.factor.saturating_pow(retry.saturating_sub(1)))
    }
}

/// Run `op` until it succeeds, fails fatally, or the retries are used up
///
/// The last error is returned once retries are exhausted.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RegistryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RegistryError>>,
{
    let mut retries = 0;
    loop {
        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if policy.classify(&error) == RetryDecision::Abort {
            debug!("{} failed with a fatal error: {}", label, error);
            return Err(error);
        }

        if retries >= policy.retries {
            warn!("{} failed after {} attempts: {}", label, retries + 1, error);
            return Err(error);
        }

        retries += 1;
        let delay = match &error {
            RegistryError::RateLimited {
                retry_after_secs: Some(secs),
            } => Duration::from_secs(*secs),
            _ => policy.delay_for(retries),
        };
        warn!(
            "{} attempt {} failed: {}, retrying in {:?}",
            label, retries, error, delay
        );
        sleep(delay).await;
    }
}

/// Handle given to each [`first_match`] worker
#[derive(Debug, Clone)]
pub struct Ticket {
    index: usize,
    best: Arc<AtomicUsize>,
}

impl Ticket {
    /// Position of the item in the input order
    pub fn index(&self) -> usize {
        self.index
    }

    /// True once an earlier item is known to match, which makes this
    /// item's outcome irrelevant
    pub fn is_superseded(&self) -> bool {
        self.best.load(Ordering::Acquire) < self.index
    }
}

/// Run `worker` over `items` with at most `concurrency` in flight and return
/// the first `Some` in item order.
///
/// All workers run on the calling task. Outcomes are committed in item
/// order, so a match is final the moment it is returned. Items after a
/// known match are never started, and the first `Err` is returned
/// immediately, dropping every in-flight worker.
pub async fn first_match<T, R, E, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    worker: F,
) -> Result<Option<R>, E>
where
    F: Fn(T, Ticket) -> Fut,
    Fut: Future<Output = Result<Option<R>, E>>,
{
    let concurrency = concurrency.max(1);
    let best = Arc::new(AtomicUsize::new(usize::MAX));
    let mut pending = items.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut completed: BTreeMap<usize, Option<R>> = BTreeMap::new();
    let mut next_commit = 0;

    loop {
        while in_flight.len() < concurrency {
            let Some((index, item)) = pending.next() else {
                break;
            };
            if index > best.load(Ordering::Acquire) {
                break;
            }
            let ticket = Ticket {
                index,
                best: Arc::clone(&best),
            };
            let work = worker(item, ticket);
            in_flight.push(async move { (index, work.await) });
        }

        let Some((index, outcome)) = in_flight.next().await else {
            return Ok(None);
        };

        let outcome = outcome?;
        if outcome.is_some() {
            best.fetch_min(index, Ordering::AcqRel);
        }
        completed.insert(index, outcome);

        while let Some(outcome) = completed.remove(&next_commit) {
            if outcome.is_some() {
                return Ok(outcome);
            }
            next_commit += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    #[rstest]
    #[case(RegistryError::Command("npm ERR! npm update check failed".into()), RetryDecision::Retry)]
    #[case(RegistryError::Contention("503 Service Unavailable".into()), RetryDecision::Retry)]
    #[case(RegistryError::RateLimited { retry_after_secs: None }, RetryDecision::Retry)]
    #[case(RegistryError::NotFound("react-scripts".into()), RetryDecision::Abort)]
    #[case(RegistryError::Command("npm ERR! code EINVALIDTAGNAME".into()), RetryDecision::Abort)]
    #[case(RegistryError::InvalidResponse("expected value".into()), RetryDecision::Abort)]
    fn classify_uses_transient_markers(
        #[case] error: RegistryError,
        #[case] expected: RetryDecision,
    ) {
        assert_eq!(RetryPolicy::default().classify(&error), expected);
    }

    #[test]
    fn delay_grows_by_factor() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);

        let result = retry(&fast_policy(), "query", || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RegistryError::Command("npm update check failed".into()))
            } else {
                Ok("{}")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "{}");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_aborts_on_first_fatal_failure() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = retry(&fast_policy(), "query", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(RegistryError::NotFound("missing".into()))
        })
        .await;

        assert!(matches!(result, Err(RegistryError::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_gives_up_after_configured_retries() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = retry(&fast_policy(), "query", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(RegistryError::Contention("502 Bad Gateway".into()))
        })
        .await;

        assert!(matches!(result, Err(RegistryError::Contention(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn first_match_returns_none_for_no_items() {
        let result: Result<Option<u32>, ()> =
            first_match(Vec::<u32>::new(), 5, |item, _| async move { Ok(Some(item)) }).await;

        assert_eq!(result, Ok(None));
    }

    #[tokio::test]
    async fn first_match_prefers_earlier_item_that_finishes_later() {
        let result: Result<Option<&str>, ()> =
            first_match(vec!["newest", "older", "oldest"], 5, |item, ticket| async move {
                if ticket.index() == 0 {
                    sleep(Duration::from_millis(50)).await;
                }
                Ok(Some(item))
            })
            .await;

        assert_eq!(result, Ok(Some("newest")));
    }

    #[tokio::test]
    async fn first_match_never_exceeds_concurrency() {
        let running = AtomicU32::new(0);
        let peak = AtomicU32::new(0);

        let result: Result<Option<()>, ()> =
            first_match((0..12).collect::<Vec<u32>>(), 3, |_, _| async {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(None)
            })
            .await;

        assert_eq!(result, Ok(None));
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn first_match_stops_starting_items_after_a_match() {
        let started = Mutex::new(Vec::new());

        let result: Result<Option<u32>, ()> =
            first_match((0..10).collect::<Vec<u32>>(), 1, |item, _| {
                started.lock().unwrap().push(item);
                async move { Ok((item == 2).then_some(item)) }
            })
            .await;

        assert_eq!(result, Ok(Some(2)));
        assert_eq!(*started.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn first_match_aborts_on_error() {
        let result: Result<Option<u32>, &str> =
            first_match((0..5).collect::<Vec<u32>>(), 5, |item, _| async move {
                match item {
                    2 => Err("boom"),
                    4 => {
                        sleep(Duration::from_millis(50)).await;
                        Ok(Some(item))
                    }
                    _ => Ok(None),
                }
            })
            .await;

        assert_eq!(result, Err("boom"));
    }

    #[tokio::test]
    async fn later_tickets_are_superseded_by_an_earlier_match() {
        let observed = Mutex::new(None);

        let result: Result<Option<u32>, ()> =
            first_match((0..4).collect::<Vec<u32>>(), 4, |item, ticket| {
                let observed = &observed;
                async move {
                    match item {
                        0 => {
                            sleep(Duration::from_millis(40)).await;
                            Ok(None)
                        }
                        1 => Ok(Some(1)),
                        3 => {
                            sleep(Duration::from_millis(10)).await;
                            *observed.lock().unwrap() = Some(ticket.is_superseded());
                            Ok(None)
                        }
                        _ => Ok(None),
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(Some(1)));
        assert_eq!(*observed.lock().unwrap(), Some(true));
    }
}
