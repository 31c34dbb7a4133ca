//! Cancelable self-paced repeating tasks.
//!
//! A self-paced loop runs one cycle, waits for the next frame tick, and only
//! then starts the next cycle. Slow cycles lower the rate; they never queue.
//!
//! Ticks come from a [`FrameTicker`], so tests can drive loops with tokio's
//! paused clock instead of a real display refresh.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared cancellation flag with async wake-up.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Source of pacing ticks between loop cycles.
#[async_trait::async_trait]
pub trait FrameTicker: Send + Sync {
    /// Wait until the next frame should be processed.
    async fn next_frame(&self);
}

/// Ticker that waits a fixed period (tokio timer, so it honors a paused clock).
#[derive(Debug, Clone, Copy)]
pub struct IntervalTicker {
    period: Duration,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[async_trait::async_trait]
impl FrameTicker for IntervalTicker {
    async fn next_frame(&self) {
        if self.period.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.period).await;
        }
    }
}

/// Run `cycle` repeatedly until `token` is cancelled.
///
/// A running cycle is never aborted; cancellation is observed before each cycle
/// and while waiting for the next tick. Cycles that must not publish after a
/// cancel should check the token themselves.
pub async fn run_self_paced<F, Fut>(token: CancelToken, ticker: Arc<dyn FrameTicker>, mut cycle: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    while !token.is_cancelled() {
        cycle().await;
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.next_frame() => {}
        }
    }
}

/// Handle to a spawned self-paced loop.
#[derive(Debug)]
pub struct RepeatingTask {
    token: CancelToken,
    handle: JoinHandle<()>,
}

impl RepeatingTask {
    /// Spawn `cycle` as a self-paced loop on the current tokio runtime.
    pub fn spawn<F, Fut>(ticker: Arc<dyn FrameTicker>, cycle: F) -> Self
    where
        F: FnMut(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancelToken::new();
        let loop_token = token.clone();
        let mut cycle = cycle;
        let handle = tokio::spawn(async move {
            let cycle_token = loop_token.clone();
            run_self_paced(loop_token, ticker, move || cycle(cycle_token.clone())).await;
        });
        Self { token, handle }
    }

    /// Request cancellation and return immediately. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel and wait for the loop to exit (including its in-flight cycle).
    pub async fn join(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await
            && e.is_panic()
        {
            log::error!("repeating task panicked: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        // Already cancelled: resolves immediately
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::task::yield_now().await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_paced_loop_waits_for_tick_between_cycles() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        let ticker: Arc<dyn FrameTicker> = Arc::new(IntervalTicker::new(Duration::from_millis(100)));

        let task = RepeatingTask::spawn(ticker, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Cycles at t=0, 100, 200, 300, 400, 500
        tokio::time::sleep(Duration::from_millis(550)).await;
        task.cancel();
        let seen = count.load(Ordering::SeqCst);
        assert_eq!(seen, 6, "expected 6 cycles, got {}", seen);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen, "no cycles after cancel");
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_throttles_loop() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        let ticker: Arc<dyn FrameTicker> = Arc::new(IntervalTicker::new(Duration::ZERO));

        let task = RepeatingTask::spawn(ticker, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        });

        tokio::time::sleep(Duration::from_millis(1000)).await;
        task.join().await;

        // Cycles begin at 0, 200, 400, 600, 800 and 1000 at the latest
        let calls = count.load(Ordering::SeqCst);
        assert!(calls <= 6, "loop ran ahead of its cycles: {}", calls);
        assert!(calls >= 5, "loop stalled: {}", calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_sees_cancellation_through_token() {
        let published = Arc::new(AtomicU32::new(0));
        let sink = published.clone();
        let ticker: Arc<dyn FrameTicker> = Arc::new(IntervalTicker::new(Duration::from_millis(10)));

        let task = RepeatingTask::spawn(ticker, move |token| {
            let sink = sink.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                if !token.is_cancelled() {
                    sink.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        // First cycle is mid-flight at t=50
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.cancel();
        task.join().await;

        assert_eq!(published.load(Ordering::SeqCst), 0);
    }
}
