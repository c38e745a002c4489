//! Per-connection quota state and the exactly-once publish ticket.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mqguard_core::{MqGuardError, Result};

/// Quota counters owned by one attached connection.
///
/// Subscriptions are not counted here; the connection's own table is the
/// source of truth for them.
#[derive(Debug, Default)]
pub struct QuotaState {
    publications: AtomicUsize,
}

impl QuotaState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes admitted and not yet completed.
    pub fn publications_in_flight(&self) -> usize {
        self.publications.load(Ordering::Acquire)
    }

    /// Admit one publish if the in-flight count is below `max`.
    /// Returns `None` when the ceiling is already reached.
    pub fn try_admit(self: &Arc<Self>, max: Option<usize>) -> Option<PublishTicket> {
        let mut cur = self.publications.load(Ordering::Acquire);
        loop {
            if let Some(max) = max {
                if cur >= max {
                    return None;
                }
            }
            match self.publications.compare_exchange_weak(
                cur,
                cur + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
        Some(PublishTicket {
            inner: Arc::new(TicketInner {
                quota: Arc::clone(self),
                settled: AtomicBool::new(false),
                failure: Mutex::new(None),
            }),
        })
    }

    fn release(&self) {
        // Saturating: a ticket never releases more than it admitted.
        let _ = self
            .publications
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

#[derive(Debug)]
struct TicketInner {
    quota: Arc<QuotaState>,
    settled: AtomicBool,
    failure: Mutex<Option<MqGuardError>>,
}

impl Drop for TicketInner {
    fn drop(&mut self) {
        // Cancelled before either completion path ran.
        if !*self.settled.get_mut() {
            self.quota.release();
        }
    }
}

/// Single-assignment completion token for one admitted publish.
///
/// Both the data-length guard and the final completion hold a clone. The first
/// to settle releases the quota slot; later settlements only forward.
#[derive(Debug, Clone)]
pub struct PublishTicket {
    inner: Arc<TicketInner>,
}

impl PublishTicket {
    /// Returns true for the one caller that actually released the slot.
    fn settle(&self) -> bool {
        let first = !self.inner.settled.swap(true, Ordering::AcqRel);
        if first {
            self.inner.quota.release();
        }
        first
    }

    pub fn is_settled(&self) -> bool {
        self.inner.settled.load(Ordering::Acquire)
    }

    /// Settle with an error raised outside the broker's completion path.
    pub fn fail(&self, err: MqGuardError) -> bool {
        {
            let mut slot = self.inner.failure.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                *slot = Some(err);
            }
        }
        self.settle()
    }

    /// Settle with the broker's result. An earlier failure wins over it.
    pub fn complete(&self, result: Result<()>) -> Result<()> {
        self.settle();
        let earlier = self
            .inner
            .failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match earlier {
            Some(err) => Err(err),
            None => result,
        }
    }
}
