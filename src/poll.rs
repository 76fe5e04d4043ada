//! Bounded polling with backoff, deadline and cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;

/// Cadence and overall budget for one polling stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Upper bound for the doubling interval. Equal to `interval` for a
    /// fixed cadence.
    pub max_interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            timeout,
        }
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval.max(self.interval);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_interval)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PollError<E> {
    TimedOut,
    Cancelled,
    Failed(E),
}

/// Calls `fetch` and hands each observation to `inspect` until `inspect`
/// yields `Some`, either of them fails, the policy's deadline passes or
/// `cancel` fires. A fetch still in flight at the deadline or on cancellation
/// is dropped.
pub async fn poll_until<R, T, E, F, Fut, I>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut fetch: F,
    mut inspect: I,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, E>>,
    I: FnMut(R) -> Result<Option<T>, E>,
{
    // A timeout too large to represent means no deadline at all.
    let deadline = Instant::now().checked_add(policy.timeout);
    let mut delay = policy.interval;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        let observed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = expire(deadline) => return Err(PollError::TimedOut),
            observed = fetch() => observed.map_err(PollError::Failed)?,
        };
        if let Some(value) = inspect(observed).map_err(PollError::Failed)? {
            return Ok(value);
        }

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(PollError::TimedOut);
                }
                delay.min(deadline - now)
            }
            None => delay,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = sleep(pause) => {}
        }
        delay = policy.next_interval(delay);
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn policy() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(100), Duration::from_secs(2))
    }

    #[test]
    fn interval_doubles_up_to_max() {
        let capped = policy().with_max_interval(Duration::from_millis(350));
        assert_eq!(
            capped.next_interval(Duration::from_millis(100)),
            Duration::from_millis(200)
        );
        assert_eq!(
            capped.next_interval(Duration::from_millis(200)),
            Duration::from_millis(350)
        );
        assert_eq!(policy().next_interval(policy().interval), policy().interval);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_accepted_observation() {
        let calls = &AtomicUsize::new(0);
        let result: Result<usize, PollError<()>> = poll_until(
            &policy(),
            &CancellationToken::new(),
            move || async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) },
            |n| Ok((n == 3).then_some(n)),
        )
        .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn inspect_can_keep_state_between_observations() {
        let mut seen = Vec::new();
        let result: Result<(), PollError<()>> = poll_until(
            &policy(),
            &CancellationToken::new(),
            || async { Ok("pending") },
            |value| {
                seen.push(value);
                Ok((seen.len() == 2).then_some(()))
            },
        )
        .await;
        assert_eq!(result, Ok(()));
        assert_eq!(seen, vec!["pending", "pending"]);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_error_is_returned_immediately() {
        let result: Result<(), PollError<&str>> = poll_until(
            &policy(),
            &CancellationToken::new(),
            || async { Err::<(), _>("gone") },
            |()| Ok(None),
        )
        .await;
        assert_eq!(result, Err(PollError::Failed("gone")));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_at_deadline() {
        let start = Instant::now();
        let result: Result<(), PollError<()>> = poll_until(
            &policy(),
            &CancellationToken::new(),
            || async { Ok(()) },
            |()| Ok(None),
        )
        .await;
        assert_eq!(result, Err(PollError::TimedOut));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_fetch_is_abandoned_at_deadline() {
        let result: Result<(), PollError<()>> = poll_until(
            &policy(),
            &CancellationToken::new(),
            std::future::pending::<Result<(), ()>>,
            |()| Ok(Some(())),
        )
        .await;
        assert_eq!(result, Err(PollError::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_within_one_interval() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(250)).await;
            trigger.cancel();
        });

        let calls = &AtomicUsize::new(0);
        let start = Instant::now();
        let result: Result<(), PollError<()>> = poll_until(
            &policy(),
            &cancel,
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            |()| Ok(None),
        )
        .await;

        assert_eq!(result, Err(PollError::Cancelled));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_millis(350));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_token_skips_polling() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = &AtomicUsize::new(0);
        let result: Result<(), PollError<()>> = poll_until(
            &policy(),
            &cancel,
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            |()| Ok(None),
        )
        .await;
        assert_eq!(result, Err(PollError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_with_doubling_interval_until_cap() {
        let policy = policy().with_max_interval(Duration::from_millis(400));
        let start = Instant::now();
        let mut offsets = Vec::new();
        let result: Result<(), PollError<()>> = poll_until(
            &policy,
            &CancellationToken::new(),
            || async { Ok(Instant::now()) },
            |at| {
                offsets.push((at - start).as_millis());
                Ok((offsets.len() == 6).then_some(()))
            },
        )
        .await;
        assert_eq!(result, Ok(()));
        assert_eq!(offsets, vec![0, 100, 300, 700, 1100, 1500]);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timeout_keeps_polling() {
        let policy = PollPolicy::new(Duration::from_millis(100), Duration::MAX);
        let calls = &AtomicUsize::new(0);
        let result: Result<usize, PollError<()>> = poll_until(
            &policy,
            &CancellationToken::new(),
            move || async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) },
            |n| Ok((n == 50).then_some(n)),
        )
        .await;
        assert_eq!(result, Ok(50));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timeout_still_honours_cancellation() {
        let policy = PollPolicy::new(Duration::from_millis(100), Duration::MAX);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(30)).await;
            trigger.cancel();
        });

        let result: Result<(), PollError<()>> =
            poll_until(&policy, &cancel, || async { Ok(()) }, |()| Ok(None)).await;
        assert_eq!(result, Err(PollError::Cancelled));
    }
}
