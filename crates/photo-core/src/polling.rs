//! Keyed Polling Controller
//!
//! Runs a probe repeatedly under a string key until the probe reports it is
//! done, the registration is stopped, or a deadline / attempt cap is reached.
//!
//! ```text
//! start("chat-invoice", probe, 3s / 5min)
//!   t=0   probe #1 ──▶ Continue
//!   t=3s  probe #2 ──▶ Continue
//!   t=6s  probe #3 ──▶ Done      (registration removed)
//! ```
//!
//! - At most one live registration per key; starting a key again cancels the
//!   previous registration first.
//! - Probes of one key never overlap: the next tick waits for the running probe.
//! - A probe error is reported to `on_error` and polling continues.
//! - Deadline and attempt cap both end the registration with exactly one
//!   `on_timeout` call; the cap is reported as soon as the last allowed probe
//!   returns without a terminal result.
//! - `stop` does not abort a probe already running; its result is ignored by
//!   the controller and callers guard anything they apply.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StudioError};

/// What a probe wants the controller to do next
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Keep polling at the configured cadence
    Continue,
    /// Terminal condition observed; end the registration
    Done,
}

/// Why a registration timed out
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutReason {
    Deadline,
    MaxAttempts,
}

/// Passed to `on_timeout`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollTimeout {
    pub key: String,
    pub reason: TimeoutReason,
    /// Probes started before the timeout
    pub attempts: u32,
}

pub type TimeoutHandler = Box<dyn FnOnce(PollTimeout) + Send>;
pub type ErrorHandler = Arc<dyn Fn(&StudioError) + Send + Sync>;

/// Cadence and limits of a registration
pub struct PollOptions {
    pub interval: Duration,
    pub deadline: Option<Duration>,
    pub max_attempts: Option<u32>,
    pub on_timeout: Option<TimeoutHandler>,
    pub on_error: Option<ErrorHandler>,
}

impl PollOptions {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
            max_attempts: None,
            on_timeout: None,
            on_error: None,
        }
    }

    #[must_use]
    pub const fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    #[must_use]
    pub fn on_timeout(mut self, handler: impl FnOnce(PollTimeout) + Send + 'static) -> Self {
        self.on_timeout = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_error(mut self, handler: impl Fn(&StudioError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }
}

impl std::fmt::Debug for PollOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollOptions")
            .field("interval", &self.interval)
            .field("deadline", &self.deadline)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

struct Registration {
    id: u64,
    token: CancellationToken,
    attempts: Arc<AtomicU32>,
}

struct Inner {
    registrations: Mutex<HashMap<String, Registration>>,
    next_id: AtomicU64,
    root: CancellationToken,
}

impl Inner {
    fn registrations(&self) -> MutexGuard<'_, HashMap<String, Registration>> {
        self.registrations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove `key` only if it still belongs to registration `id`
    fn release(&self, key: &str, id: u64) {
        let mut registrations = self.registrations();
        if registrations.get(key).is_some_and(|r| r.id == id) {
            registrations.remove(key);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// Keyed, cancellable repeated-probe executor
///
/// Cloning yields another handle to the same set of registrations.
#[derive(Clone)]
pub struct PollingController {
    inner: Arc<Inner>,
}

impl Default for PollingController {
    fn default() -> Self {
        Self::new()
    }
}

impl PollingController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                registrations: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                root: CancellationToken::new(),
            }),
        }
    }

    /// Register `probe` under `key`, replacing any live registration for that key.
    ///
    /// The first probe runs immediately. Must be called inside a tokio runtime.
    pub fn start<F, Fut>(&self, key: impl Into<String>, probe: F, options: PollOptions) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ProbeOutcome>> + Send + 'static,
    {
        if self.inner.root.is_cancelled() {
            return Err(StudioError::InvalidState(
                "polling controller has been shut down".into(),
            ));
        }
        if options.interval.is_zero() {
            return Err(StudioError::Config("poll interval must be non-zero".into()));
        }

        let key = key.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.root.child_token();
        let attempts = Arc::new(AtomicU32::new(0));

        {
            let mut registrations = self.inner.registrations();
            if let Some(previous) = registrations.remove(&key) {
                previous.token.cancel();
                tracing::debug!(key = %key, "Replacing live poll registration");
            }
            registrations.insert(
                key.clone(),
                Registration {
                    id,
                    token: token.clone(),
                    attempts: attempts.clone(),
                },
            );
        }

        tracing::debug!(
            key = %key,
            interval = ?options.interval,
            deadline = ?options.deadline,
            max_attempts = options.max_attempts,
            "Poll registered"
        );

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(run_registration(key, id, probe, options, token, attempts, weak));
        Ok(())
    }

    /// Stop the registration for `key`. Unknown or already stopped keys are a no-op.
    ///
    /// Returns whether a live registration was removed.
    pub fn stop(&self, key: &str) -> bool {
        let removed = self.inner.registrations().remove(key);
        match removed {
            Some(registration) => {
                registration.token.cancel();
                tracing::debug!(key = %key, "Poll stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.inner.registrations().contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.inner.registrations().len()
    }

    /// Probes started so far for a live registration
    pub fn attempts(&self, key: &str) -> Option<u32> {
        self.inner
            .registrations()
            .get(key)
            .map(|r| r.attempts.load(Ordering::SeqCst))
    }

    /// Stop every live registration; later `start` calls are rejected
    pub fn shutdown(&self) {
        self.inner.root.cancel();
        let drained: Vec<_> = self.inner.registrations().drain().collect();
        tracing::debug!(stopped = drained.len(), "Polling controller shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.root.is_cancelled()
    }
}

async fn run_registration<F, Fut>(
    key: String,
    id: u64,
    probe: F,
    options: PollOptions,
    token: CancellationToken,
    attempts: Arc<AtomicU32>,
    inner: Weak<Inner>,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ProbeOutcome>> + Send + 'static,
{
    let PollOptions {
        interval,
        deadline,
        max_attempts,
        on_timeout,
        on_error,
    } = options;

    let far_future = Instant::now() + Duration::from_secs(86_400 * 365);
    let deadline_at = deadline.map_or(far_future, |d| Instant::now() + d);
    let expiry = tokio::time::sleep_until(deadline_at);
    tokio::pin!(expiry);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let timed_out = loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break None,
            () = &mut expiry, if deadline.is_some() => break Some(TimeoutReason::Deadline),
            _ = ticker.tick() => {}
        }

        if max_attempts == Some(0) {
            break Some(TimeoutReason::MaxAttempts);
        }
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::debug!(key = %key, attempt, "Polling probe");

        let result = tokio::select! {
            biased;
            () = &mut expiry, if deadline.is_some() => break Some(TimeoutReason::Deadline),
            result = probe() => result,
        };

        if token.is_cancelled() {
            break None;
        }

        match result {
            Ok(ProbeOutcome::Continue) => {}
            Ok(ProbeOutcome::Done) => {
                tracing::debug!(key = %key, attempt, "Poll finished");
                break None;
            }
            Err(e) => {
                tracing::warn!(key = %key, attempt, error = %e, "Probe failed; polling continues");
                if let Some(handler) = &on_error {
                    handler(&e);
                }
            }
        }

        if max_attempts.is_some_and(|max| attempt >= max) {
            break Some(TimeoutReason::MaxAttempts);
        }
    };

    if let Some(inner) = inner.upgrade() {
        inner.release(&key, id);
    }

    if let Some(reason) = timed_out {
        // A concurrent stop() wins over a timeout that raced it.
        if token.is_cancelled() {
            return;
        }
        token.cancel();
        let attempts = attempts.load(Ordering::SeqCst);
        tracing::info!(key = %key, ?reason, attempts, "Poll timed out");
        if let Some(handler) = on_timeout {
            handler(PollTimeout {
                key,
                reason,
                attempts,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_probe(
        counter: Arc<AtomicUsize>,
        done_at: Option<usize>,
    ) -> impl Fn() -> std::future::Ready<Result<ProbeOutcome>> + Send + Sync + 'static {
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let outcome = if done_at.is_some_and(|d| n >= d) {
                ProbeOutcome::Done
            } else {
                ProbeOutcome::Continue
            };
            std::future::ready(Ok(outcome))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_check_runs_immediately_then_on_interval() {
        let polls = PollingController::new();
        let counter = Arc::new(AtomicUsize::new(0));
        polls
            .start(
                "k",
                counting_probe(counter.clone(), None),
                PollOptions::every(Duration::from_secs(3)),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(polls.attempts("k"), Some(3));
        polls.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_isolated() {
        let polls = PollingController::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        polls
            .start("a", counting_probe(a.clone(), None), PollOptions::every(Duration::from_secs(1)))
            .unwrap();
        polls
            .start("b", counting_probe(b.clone(), None), PollOptions::every(Duration::from_secs(1)))
            .unwrap();

        assert!(polls.stop("a"));
        assert!(!polls.stop("a"));
        assert!(!polls.stop("never-registered"));
        assert!(polls.is_active("b"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(a.load(Ordering::SeqCst) <= 1);
        assert!(b.load(Ordering::SeqCst) >= 5);
        polls.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_a_key_leaves_one_live_timer() {
        let polls = PollingController::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        polls
            .start("k", counting_probe(first.clone(), None), PollOptions::every(Duration::from_secs(1)))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        polls
            .start("k", counting_probe(second.clone(), None), PollOptions::every(Duration::from_secs(1)))
            .unwrap();

        assert_eq!(polls.active_count(), 1);
        let first_before = first.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert_eq!(first.load(Ordering::SeqCst), first_before);
        assert!(second.load(Ordering::SeqCst) >= 4);
        assert_eq!(polls.active_count(), 1);
        polls.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_timeout_exactly_once() {
        let polls = PollingController::new();
        let timeouts = Arc::new(AtomicUsize::new(0));
        let seen = timeouts.clone();
        let counter = Arc::new(AtomicUsize::new(0));

        polls
            .start(
                "pending-forever",
                counting_probe(counter.clone(), None),
                PollOptions::every(Duration::from_secs(3))
                    .deadline(Duration::from_secs(10))
                    .on_timeout(move |t| {
                        assert_eq!(t.reason, TimeoutReason::Deadline);
                        seen.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
        assert!(!polls.is_active("pending-forever"));

        let probes = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), probes);
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_cap_ends_registration() {
        let polls = PollingController::new();
        let timeouts = Arc::new(Mutex::new(Vec::new()));
        let seen = timeouts.clone();
        let counter = Arc::new(AtomicUsize::new(0));

        polls
            .start(
                "capped",
                counting_probe(counter.clone(), None),
                PollOptions::every(Duration::from_secs(1))
                    .max_attempts(3)
                    .on_timeout(move |t| seen.lock().unwrap().push(t)),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        let timeouts = timeouts.lock().unwrap();
        assert_eq!(timeouts.len(), 1);
        assert_eq!(timeouts[0].reason, TimeoutReason::MaxAttempts);
        assert_eq!(timeouts[0].attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_cap_reports_right_after_last_check() {
        let polls = PollingController::new();
        let timeouts = Arc::new(AtomicUsize::new(0));
        let seen = timeouts.clone();
        let counter = Arc::new(AtomicUsize::new(0));

        polls
            .start(
                "capped",
                counting_probe(counter.clone(), None),
                PollOptions::every(Duration::from_secs(3))
                    .max_attempts(2)
                    .on_timeout(move |_| {
                        seen.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .unwrap();

        // Probes at t=0 and t=3; the cap is hit without waiting for t=6.
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
        assert!(!polls.is_active("capped"));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_last_check_is_not_a_timeout() {
        let polls = PollingController::new();
        let timeouts = Arc::new(AtomicUsize::new(0));
        let seen = timeouts.clone();
        let counter = Arc::new(AtomicUsize::new(0));

        polls
            .start(
                "k",
                counting_probe(counter.clone(), Some(2)),
                PollOptions::every(Duration::from_secs(1))
                    .max_attempts(2)
                    .on_timeout(move |_| {
                        seen.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn check_errors_do_not_stop_polling() {
        let polls = PollingController::new();
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = errors.clone();
        let counter = Arc::new(AtomicUsize::new(0));
        let probe_counter = counter.clone();

        polls
            .start(
                "flaky",
                move || {
                    let n = probe_counter.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n < 3 {
                            Err(StudioError::Network("blip".into()))
                        } else {
                            Ok(ProbeOutcome::Done)
                        }
                    }
                },
                PollOptions::every(Duration::from_secs(1)).on_error(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(errors.load(Ordering::SeqCst), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(!polls.is_active("flaky"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_everything_and_rejects_new_work() {
        let polls = PollingController::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for key in ["a", "b", "c"] {
            polls
                .start(key, counting_probe(counter.clone(), None), PollOptions::every(Duration::from_secs(1)))
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        polls.shutdown();
        assert_eq!(polls.active_count(), 0);

        let before = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), before);

        let rejected = polls.start(
            "late",
            counting_probe(counter, None),
            PollOptions::every(Duration::from_secs(1)),
        );
        assert!(matches!(rejected, Err(StudioError::InvalidState(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_does_not_trigger_timeout() {
        let polls = PollingController::new();
        let timeouts = Arc::new(AtomicUsize::new(0));
        let seen = timeouts.clone();
        polls
            .start(
                "k",
                counting_probe(Arc::new(AtomicUsize::new(0)), None),
                PollOptions::every(Duration::from_secs(1))
                    .deadline(Duration::from_secs(3))
                    .on_timeout(move |_| {
                        seen.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        polls.stop("k");
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);
    }
}
