use crate::error::CursorError;
use futures::future::{BoxFuture, Shared};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};

/// The outcome of one page fetch, awaitable by any number of callers.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<(), CursorError>>>;

/// Single-flight latch for page fetches.
///
/// `in_flight` is claimed with a compare-exchange; only the caller that flips
/// it runs the fetch. The handle to that fetch is published into `pending`
/// afterwards, so a caller that loses the race may briefly see the flag set
/// with nothing published yet and has to wait for the handle to appear.
#[derive(Default)]
pub(crate) struct FetchLatch {
    in_flight: AtomicBool,
    pending: Mutex<Option<SharedFetch>>,
}

pub(crate) enum Claim<'a> {
    /// This caller owns the fetch and must publish it.
    Leader(Publisher<'a>),
    /// Another caller's fetch is running; wait on it.
    Follower(SharedFetch),
    /// The fetch that was running finished before a handle could be taken.
    Settled,
}

impl FetchLatch {
    pub(crate) fn claim(&self) -> Claim<'_> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return Claim::Leader(Publisher {
                latch: self,
                slot: self.lock_pending(),
                published: false,
            });
        }

        loop {
            {
                let slot = self.lock_pending();
                if let Some(fetch) = slot.as_ref() {
                    return Claim::Follower(fetch.clone());
                }
                // Cleared under the same lock as the flag, so an unset flag here means done
                if !self.in_flight.load(Ordering::Acquire) {
                    return Claim::Settled;
                }
            }
            std::thread::yield_now();
        }
    }

    /// Return to idle once a fetch has settled, success or not.
    pub(crate) fn release(&self) {
        let mut slot = self.lock_pending();
        slot.take();
        self.in_flight.store(false, Ordering::Release);
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<SharedFetch>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held by the leader between winning the latch and publishing its fetch.
///
/// Keeps the pending slot locked, so the fetch cannot release the latch
/// before its handle is visible. Dropping it unpublished resets the latch.
pub(crate) struct Publisher<'a> {
    latch: &'a FetchLatch,
    slot: MutexGuard<'a, Option<SharedFetch>>,
    published: bool,
}

impl Publisher<'_> {
    pub(crate) fn publish(mut self, fetch: SharedFetch) {
        *self.slot = Some(fetch);
        self.published = true;
    }
}

impl Drop for Publisher<'_> {
    fn drop(&mut self) {
        if !self.published {
            self.latch.in_flight.store(false, Ordering::Release);
        }
    }
}

/// Releases the latch when the fetch task ends, including by panic or cancellation.
///
/// Created before the task is spawned and moved into it, so a task dropped
/// unpolled still releases.
pub(crate) struct ReleaseOnDrop(pub(crate) Arc<FetchLatch>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.release();
    }
}
