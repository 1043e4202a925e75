// ── Correlation gate ──
//
// Single-slot rendezvous between the command side and the receive loop.
// At most one request is outstanding at a time; the receive loop resolves
// it by releasing, the command side waits with a bound.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Request id used for the transport-subscribe acknowledgment.
pub const SUBSCRIBE_REQUEST_ID: &str = "subscribe";

/// How a wait on the gate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Released,
    TimedOut,
    Cancelled,
}

struct Slot {
    request_id: String,
    wake: oneshot::Sender<()>,
}

/// At-most-one-outstanding-request gate.
///
/// Callers [`enter`](Self::enter) to take the single turn, publish, then
/// [`wait`](Outstanding::wait). The receive loop calls
/// [`release`](Self::release) without ever blocking, so it can always make
/// progress towards the event a waiter needs.
pub struct CorrelationGate {
    turn: Semaphore,
    slot: Mutex<Option<Slot>>,
    progress: watch::Sender<u64>,
    cancel: CancellationToken,
    releases: AtomicU64,
}

impl CorrelationGate {
    pub fn new(cancel: CancellationToken) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            turn: Semaphore::new(1),
            slot: Mutex::new(None),
            progress,
            cancel,
            releases: AtomicU64::new(0),
        }
    }

    /// Take the turn for `request_id`, waiting for any prior holder.
    ///
    /// Returns `None` once the session is cancelled.
    pub async fn enter(&self, request_id: impl Into<String>) -> Option<Outstanding<'_>> {
        let permit = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return None,
            permit = self.turn.acquire() => permit.ok()?,
        };

        let request_id = request_id.into();
        let (wake, released) = oneshot::channel();
        *self.lock_slot() = Some(Slot {
            request_id: request_id.clone(),
            wake,
        });
        tracing::trace!(request_id = %request_id, "gate entered");

        Some(Outstanding {
            gate: self,
            request_id,
            released,
            progress: self.progress.subscribe(),
            _permit: permit,
        })
    }

    /// Release whatever is outstanding. Over-release is a no-op.
    pub fn release(&self) -> bool {
        self.release_matching(None)
    }

    /// Release the outstanding request if `request_id` is absent or matches it.
    ///
    /// A mismatched id leaves the request outstanding. Returns `true` only
    /// when a waiter was actually woken.
    pub fn release_matching(&self, request_id: Option<&str>) -> bool {
        let mut slot = self.lock_slot();
        let Some(current) = slot.take() else {
            tracing::debug!(request_id, "release with nothing outstanding");
            return false;
        };

        if let Some(id) = request_id {
            if id != current.request_id {
                tracing::warn!(
                    outstanding = %current.request_id,
                    request_id = id,
                    "release for a different request, ignoring"
                );
                *slot = Some(current);
                return false;
            }
        }
        drop(slot);

        let woke = current.wake.send(()).is_ok();
        if woke {
            self.releases.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(request_id = %current.request_id, "gate released");
        }
        woke
    }

    /// Signal that a multi-step exchange moved forward; restarts the
    /// outstanding waiter's bound.
    pub fn advance(&self) {
        self.progress.send_modify(|step| *step = step.wrapping_add(1));
    }

    pub fn is_outstanding(&self) -> bool {
        self.lock_slot().is_some()
    }

    pub fn outstanding_request(&self) -> Option<String> {
        self.lock_slot().as_ref().map(|s| s.request_id.clone())
    }

    /// Count of releases that woke a waiter.
    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Slot>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The caller's hold on the gate. Dropping it clears the slot, so a late
/// event becomes an over-release instead of waking the next request.
pub struct Outstanding<'a> {
    gate: &'a CorrelationGate,
    request_id: String,
    released: oneshot::Receiver<()>,
    progress: watch::Receiver<u64>,
    _permit: SemaphorePermit<'a>,
}

impl Outstanding<'_> {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// `true` if released before `timeout` elapsed.
    pub async fn acquire(self, timeout: Duration) -> bool {
        matches!(self.wait(timeout).await, Wake::Released)
    }

    /// Wait for the release, the bound, or session cancellation.
    pub async fn wait(mut self, timeout: Duration) -> Wake {
        let mut deadline = Instant::now() + timeout;

        loop {
            tokio::select! {
                biased;
                () = self.gate.cancel.cancelled() => return Wake::Cancelled,
                released = &mut self.released => {
                    return if released.is_ok() { Wake::Released } else { Wake::Cancelled };
                }
                changed = self.progress.changed() => {
                    if changed.is_ok() {
                        deadline = Instant::now() + timeout;
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        request_id = %self.request_id,
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "timeout waiting for response"
                    );
                    return Wake::TimedOut;
                }
            }
        }
    }
}

impl Drop for Outstanding<'_> {
    fn drop(&mut self) {
        let mut slot = self.gate.lock_slot();
        if slot
            .as_ref()
            .is_some_and(|s| s.request_id == self.request_id)
        {
            *slot = None;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn gate() -> Arc<CorrelationGate> {
        Arc::new(CorrelationGate::new(CancellationToken::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn release_wakes_waiter() {
        let gate = gate();
        let held = gate.enter("a").await.unwrap();
        assert!(gate.is_outstanding());
        assert_eq!(gate.outstanding_request().as_deref(), Some("a"));

        assert!(gate.release());
        assert!(held.acquire(Duration::from_secs(1)).await);
        assert!(!gate.is_outstanding());
        assert_eq!(gate.releases(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn release_before_wait_is_not_lost() {
        let gate = gate();
        let held = gate.enter("a").await.unwrap();
        gate.release();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(held.wait(Duration::from_secs(1)).await, Wake::Released);
    }

    #[tokio::test(start_paused = true)]
    async fn over_release_is_noop() {
        let gate = gate();
        assert!(!gate.release());
        assert!(!gate.release());
        assert_eq!(gate.releases(), 0);
        let held = gate.enter("a").await.unwrap();
        assert!(gate.release());
        assert!(held.acquire(Duration::from_millis(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_exact_and_frees_the_turn() {
        let gate = gate();
        let start = Instant::now();
        let held = gate.enter("a").await.unwrap();
        assert_eq!(held.wait(Duration::from_secs(15)).await, Wake::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_secs(15));

        // Late event after the timeout must not wake the next request.
        assert!(!gate.release());
        let next = gate.enter("b").await.unwrap();
        assert_eq!(next.wait(Duration::from_secs(1)).await, Wake::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_id_is_ignored() {
        let gate = gate();
        let held = gate.enter("a").await.unwrap();
        assert!(!gate.release_matching(Some("b")));
        assert!(gate.is_outstanding());
        assert!(gate.release_matching(Some("a")));
        assert!(held.acquire(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn advance_extends_deadline() {
        let gate = gate();
        let held = gate.enter("chain").await.unwrap();
        let stepper = Arc::clone(&gate);
        tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_secs(8)).await;
                stepper.advance();
            }
            tokio::time::sleep(Duration::from_secs(8)).await;
            stepper.release();
        });

        let start = Instant::now();
        assert_eq!(held.wait(Duration::from_secs(10)).await, Wake::Released);
        assert_eq!(start.elapsed(), Duration::from_secs(32));
    }

    #[tokio::test(start_paused = true)]
    async fn second_caller_blocks_until_first_finishes() {
        let gate = gate();
        let first = gate.enter("first").await.unwrap();

        let contender = Arc::clone(&gate);
        let second = tokio::spawn(async move {
            let held = contender.enter("second").await.unwrap();
            held.request_id().to_owned()
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!second.is_finished());
        assert_eq!(gate.outstanding_request().as_deref(), Some("first"));

        gate.release();
        assert!(first.acquire(Duration::from_secs(1)).await);
        assert_eq!(second.await.unwrap(), "second");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_unblocks_waiters_and_entrants() {
        let cancel = CancellationToken::new();
        let gate = Arc::new(CorrelationGate::new(cancel.clone()));
        let held = gate.enter("a").await.unwrap();

        let contender = Arc::clone(&gate);
        let blocked = tokio::spawn(async move { contender.enter("b").await.is_none() });

        cancel.cancel();
        assert_eq!(held.wait(Duration::from_secs(60)).await, Wake::Cancelled);
        assert!(blocked.await.unwrap());
    }
}
