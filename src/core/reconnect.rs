use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Fixed delay between a connection failure and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct PendingReconnect {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Single-slot delayed task used for reconnect timers.
///
/// At most one timer is alive: [`ReconnectScheduler::schedule`] aborts the previous one before
/// arming a new one. Each timer carries a generation number; when its message reaches the owner,
/// [`ReconnectScheduler::claim`] accepts it only if it is still the current one, which covers the
/// window where a timer fired but was cancelled before its message was processed.
///
/// The delay is fixed: there is no backoff growth and no attempt cap.
#[derive(Debug)]
pub struct ReconnectScheduler {
    delay: Duration,
    generation: u64,
    pending: Option<PendingReconnect>,
    released: bool,
}

impl ReconnectScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: 0,
            pending: None,
            released: false,
        }
    }

    #[inline]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Arm a new timer, cancelling any pending one first.
    ///
    /// `fire` receives the timer's generation and runs once the delay elapses. Returns the
    /// generation, or `None` once the scheduler has been released.
    pub fn schedule<F, Fut>(&mut self, fire: F) -> Option<u64>
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.released {
            return None;
        }
        self.cancel();

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire(generation).await;
        });
        self.pending = Some(PendingReconnect { generation, handle });
        Some(generation)
    }

    /// Cancel the pending timer, if any. Safe to call when nothing is pending.
    ///
    /// Returns whether a timer was cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Accept a fired timer. Stale generations (cancelled or superseded) are rejected.
    pub fn claim(&mut self, generation: u64) -> bool {
        match self.pending.as_ref() {
            Some(pending) if pending.generation == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Cancel pending work and refuse any further scheduling.
    pub fn release(&mut self) {
        self.cancel();
        self.released = true;
    }
}

impl Drop for ReconnectScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
