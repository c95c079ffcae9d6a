use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide single-flight gate for training runs.
///
/// `try_acquire` never waits: while a [`GatePermit`] is alive every further
/// attempt is rejected. Dropping the permit reopens the gate, including on
/// panic unwinding out of a run.
#[derive(Debug, Clone, Default)]
pub struct TrainingGate {
    busy: Arc<AtomicBool>,
}

impl TrainingGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<GatePermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GatePermit {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct GatePermit {
    busy: Arc<AtomicBool>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn second_acquire_is_rejected() {
        let gate = TrainingGate::new();
        let permit = gate.try_acquire().expect("first");
        assert!(gate.is_busy());
        assert!(gate.try_acquire().is_none());
        drop(permit);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn clones_share_the_flag() {
        let gate = TrainingGate::new();
        let other = gate.clone();
        let _permit = gate.try_acquire().expect("first");
        assert!(other.try_acquire().is_none());
    }

    #[test]
    fn racing_threads_get_one_permit() {
        let gate = TrainingGate::new();
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let winners = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let gate = gate.clone();
                let barrier = barrier.clone();
                let release = release.clone();
                let winners = winners.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let permit = gate.try_acquire();
                    if permit.is_some() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                    // hold any permit until every thread has tried
                    release.wait();
                    drop(permit);
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(!gate.is_busy());
    }
}
