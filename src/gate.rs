//! Bounded admission gate for concurrent executions.
//!
//! The gate admits at most `capacity` holders at a time. Tickets are handed
//! out from a ring of slots, so a slot is only reused after its previous
//! holder leaves. When a drain hook is installed, the holder of slot 0 waits
//! on leave for every other holder to finish and then runs the hook with
//! admissions paused. That gives the hook a quiescent point once per trip
//! around the ring (leak checks and similar periodic maintenance).

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::{Result, SchedError};

type DrainHook = Box<dyn Fn() + Send + Sync>;

struct GateInner {
    busy: Vec<bool>,
    pos: usize,
    running: usize,
    draining: bool,
}

/// Counting admission gate with ring-ordered tickets.
pub struct ExecutionGate {
    inner: Mutex<GateInner>,
    cv: Condvar,
    drain: Option<DrainHook>,
}

impl ExecutionGate {
    /// Create a gate admitting up to `capacity` concurrent holders.
    ///
    /// # Errors
    ///
    /// Returns `SchedError::InvalidConfig` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::build(capacity, None)
    }

    /// Create a gate that runs `hook` once per trip around the ring, with no
    /// holder inside.
    pub fn with_drain_hook<F>(capacity: usize, hook: F) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(capacity, Some(Box::new(hook)))
    }

    fn build(capacity: usize, drain: Option<DrainHook>) -> Result<Self> {
        if capacity == 0 {
            return Err(SchedError::InvalidConfig(
                "gate capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            inner: Mutex::new(GateInner {
                busy: vec![false; capacity],
                pos: 0,
                running: 0,
                draining: false,
            }),
            cv: Condvar::new(),
            drain,
        })
    }

    /// Block until the next slot in ring order is free, then take it.
    pub fn enter(&self) -> GateTicket<'_> {
        let mut inner = self.inner.lock();
        while inner.busy[inner.pos] || inner.draining {
            self.cv.wait(&mut inner);
        }
        let slot = inner.pos;
        inner.pos = (inner.pos + 1) % inner.busy.len();
        inner.busy[slot] = true;
        inner.running += 1;
        debug_assert!(inner.running <= inner.busy.len());
        trace!(slot, running = inner.running, "gate entered");
        GateTicket { gate: self, slot }
    }

    fn leave(&self, slot: usize) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.busy[slot], "gate slot {slot} released twice");
        inner.busy[slot] = false;
        inner.running -= 1;

        if slot == 0 {
            if let Some(hook) = &self.drain {
                inner.draining = true;
                while inner.running != 0 {
                    self.cv.wait(&mut inner);
                }
                trace!("gate drained, running hook");
                hook();
                inner.draining = false;
            }
        }
        self.cv.notify_all();
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.inner.lock().busy.len()
    }

    /// Holders currently inside the gate.
    pub fn running(&self) -> usize {
        self.inner.lock().running
    }
}

impl std::fmt::Debug for ExecutionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ExecutionGate")
            .field("capacity", &inner.busy.len())
            .field("running", &inner.running)
            .field("draining", &inner.draining)
            .field("has_drain_hook", &self.drain.is_some())
            .finish()
    }
}

/// RAII admission ticket. Leaves the gate on drop.
#[must_use = "dropping the ticket leaves the gate immediately"]
#[derive(Debug)]
pub struct GateTicket<'a> {
    gate: &'a ExecutionGate,
    slot: usize,
}

impl GateTicket<'_> {
    /// Ring slot held by this ticket.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl Drop for GateTicket<'_> {
    fn drop(&mut self) {
        self.gate.leave(self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            ExecutionGate::new(0),
            Err(SchedError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_tickets_follow_ring_order() {
        let gate = ExecutionGate::new(3).unwrap();
        let a = gate.enter();
        let b = gate.enter();
        assert_eq!((a.slot(), b.slot()), (0, 1));
        assert_eq!(gate.running(), 2);
        drop(a);
        drop(b);
        let c = gate.enter();
        assert_eq!(c.slot(), 2);
        let d = gate.enter();
        assert_eq!(d.slot(), 0);
    }

    #[test]
    fn test_concurrency_never_exceeds_capacity() {
        let gate = Arc::new(ExecutionGate::new(2).unwrap());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let inside = inside.clone();
                let peak = peak.clone();
                thread::spawn(move || {
                    for _ in 0..20 {
                        let _ticket = gate.enter();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_micros(50));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(gate.running(), 0);
    }

    #[test]
    fn test_drain_hook_runs_with_gate_empty() {
        let hooks = Arc::new(AtomicUsize::new(0));
        let observed = Arc::new(AtomicUsize::new(0));
        let gate = {
            let hooks = hooks.clone();
            Arc::new(
                ExecutionGate::with_drain_hook(4, move || {
                    hooks.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap(),
            )
        };

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                let observed = observed.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        let _ticket = gate.enter();
                        observed.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // 100 admissions over a ring of 4: slot 0 is released 25 times.
        assert_eq!(observed.load(Ordering::SeqCst), 100);
        assert_eq!(hooks.load(Ordering::SeqCst), 25);
    }
}
