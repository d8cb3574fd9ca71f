//! Polling loops with pluggable back-off schedules

use crate::error::{EngineError, Result};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Cooperative cancellation flag, checked before every poll attempt
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// New, not-cancelled flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Back-off schedule for a polling loop
#[derive(Debug, Clone, Copy)]
pub enum PollSchedule {
    /// Fixed number of attempts with a constant delay between them
    Fixed { attempts: u32, delay: Duration },
    /// Delay grows by `step_ms` each attempt, starting at `base_ms`
    Increasing {
        attempts: u32,
        base_ms: u64,
        step_ms: u64,
    },
}

impl PollSchedule {
    /// Total attempts allowed
    pub fn attempts(&self) -> u32 {
        match self {
            PollSchedule::Fixed { attempts, .. } => *attempts,
            PollSchedule::Increasing { attempts, .. } => *attempts,
        }
    }

    /// Delay after attempt number `attempt` (zero-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            PollSchedule::Fixed { delay, .. } => *delay,
            PollSchedule::Increasing { base_ms, step_ms, .. } => {
                Duration::from_millis(base_ms + u64::from(attempt + 1) * step_ms)
            }
        }
    }
}

/// Repeatedly fetch a resource until `done` accepts it or the schedule is
/// exhausted. Returns `Ok(None)` when attempts ran out without a decision.
pub async fn poll_until<T, F, Fut, P>(
    mut fetch: F,
    done: P,
    schedule: PollSchedule,
    cancel: &CancelFlag,
) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    for attempt in 0..schedule.attempts() {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let value = fetch().await?;
        if done(&value) {
            return Ok(Some(value));
        }

        tracing::debug!(
            "Poll attempt {}/{} not settled, sleeping {:?}",
            attempt + 1,
            schedule.attempts(),
            schedule.delay(attempt)
        );
        tokio::time::sleep(schedule.delay(attempt)).await;
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_increasing_schedule_delays() {
        // First sleep 1.5 s, growing by 0.5 s per attempt up to 6 s.
        let schedule = PollSchedule::Increasing {
            attempts: 10,
            base_ms: 1000,
            step_ms: 500,
        };
        assert_eq!(schedule.delay(0), Duration::from_millis(1500));
        assert_eq!(schedule.delay(9), Duration::from_millis(6000));
    }

    #[tokio::test]
    async fn test_poll_until_stops_on_predicate() {
        let counter = AtomicU32::new(0);
        let cancel = CancelFlag::new();

        let result = poll_until(
            || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok(n) }
            },
            |n| *n >= 3,
            PollSchedule::Fixed {
                attempts: 10,
                delay: Duration::from_millis(1),
            },
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(result, Some(3));
    }

    #[tokio::test]
    async fn test_poll_until_exhausts_budget() {
        let cancel = CancelFlag::new();
        let result: Option<u32> = poll_until(
            || async { Ok(0) },
            |_| false,
            PollSchedule::Fixed {
                attempts: 3,
                delay: Duration::from_millis(1),
            },
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_poll_until_observes_cancel() {
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = poll_until(
            || async { Ok(0u32) },
            |_| false,
            PollSchedule::Fixed {
                attempts: 3,
                delay: Duration::from_millis(1),
            },
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, EngineError::Cancelled));
    }
}
