//! Async test helpers
//!
//! Timeouts around channel receives and polling waits. Under a paused
//! tokio clock the sleeps auto-advance, so waits cost no wall time.

use std::future::Future;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout, Duration, Instant};

/// Default timeout duration for tests (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Short timeout for tests that should fail fast (100ms)
pub const SHORT_TEST_TIMEOUT: Duration = Duration::from_millis(100);

/// Poll interval of [`wait_until`]
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvTimeoutError {
    #[error("receive operation timed out")]
    Timeout,
    #[error("channel closed")]
    Closed,
}

/// Receive from an mpsc channel with a timeout
pub async fn recv_timeout<T>(rx: &mut mpsc::Receiver<T>, duration: Duration) -> Result<T, RecvTimeoutError> {
    timeout(duration, rx.recv())
        .await
        .map_err(|_| RecvTimeoutError::Timeout)?
        .ok_or(RecvTimeoutError::Closed)
}

/// Receive from a broadcast channel with a timeout, skipping lag notices
pub async fn recv_broadcast_timeout<T: Clone>(
    rx: &mut broadcast::Receiver<T>,
    duration: Duration,
) -> Result<T, RecvTimeoutError> {
    let deadline = Instant::now() + duration;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, rx.recv()).await {
            Err(_) => return Err(RecvTimeoutError::Timeout),
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => return Err(RecvTimeoutError::Closed),
        }
    }
}

/// Poll `condition` until it holds; false if `duration` elapses first
pub async fn wait_until<F>(duration: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + duration;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Helper to assert a future completes within duration
pub async fn assert_completes_within<F, T>(duration: Duration, future: F) -> T
where
    F: Future<Output = T>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => panic!("Future did not complete within {:?}", duration),
    }
}

/// Drain every message already queued on a broadcast channel
pub fn drain_broadcast<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut results = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(value) => results.push(value),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return results,
        }
    }
}
