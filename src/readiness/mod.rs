//! Sink readiness gate
//!
//! The engine must not emit anything before the telemetry sink exists.
//! Bootstrap code polls a [`ReadinessGate`] at a fixed interval and starts
//! the engine once it reports ready.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Reports whether the telemetry sink can accept records
pub trait ReadinessGate {
    fn is_ready(&self) -> bool;
}

impl<F: Fn() -> bool> ReadinessGate for F {
    fn is_ready(&self) -> bool {
        self()
    }
}

/// Shared flag flipped once the sink is available
#[derive(Debug, Clone, Default)]
pub struct ReadinessFlag {
    ready: Arc<AtomicBool>,
}

impl ReadinessFlag {
    /// Create a flag that starts out not ready
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the sink as available
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }
}

impl ReadinessGate for ReadinessFlag {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

/// Why waiting for readiness ended without success
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessError {
    #[error("readiness wait cancelled")]
    Cancelled,
    #[error("sink not ready after {0:?}")]
    TimedOut(Duration),
}

/// Poll `gate` every `interval` until it is ready
///
/// The first check happens immediately. Returns the number of checks made.
pub async fn wait_until_ready<G: ReadinessGate + ?Sized>(
    gate: &G,
    interval: Duration,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<u32, ReadinessError> {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReadinessError::Cancelled),
            _ = ticker.tick() => {}
        }

        polls += 1;
        if gate.is_ready() {
            debug!("Sink ready after {} checks", polls);
            return Ok(polls);
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                return Err(ReadinessError::TimedOut(limit));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_ready_immediately() {
        let flag = ReadinessFlag::new();
        flag.mark_ready();
        let polls = wait_until_ready(&flag, Duration::from_millis(10), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(polls, 1);
    }

    #[tokio::test]
    async fn test_polls_until_ready() {
        let calls = AtomicU32::new(0);
        let gate = || calls.fetch_add(1, Ordering::SeqCst) >= 2;
        let polls = wait_until_ready(&gate, Duration::from_millis(5), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(polls, 3);
    }

    #[tokio::test]
    async fn test_flag_set_from_another_task() {
        let flag = ReadinessFlag::new();
        let setter = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.mark_ready();
        });
        let polls = wait_until_ready(&flag, Duration::from_millis(5), None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(polls > 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let gate = || false;
        let result = wait_until_ready(
            &gate,
            Duration::from_millis(5),
            Some(Duration::from_millis(20)),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result, Err(ReadinessError::TimedOut(Duration::from_millis(20))));
    }

    #[tokio::test]
    async fn test_cancel() {
        let gate = || false;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = wait_until_ready(&gate, Duration::from_millis(5), None, &cancel).await;
        assert_eq!(result, Err(ReadinessError::Cancelled));
    }
}
