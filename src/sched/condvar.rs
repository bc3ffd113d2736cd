/// A condition variable paired with an external `Mutex` at each call site
/// (spec.md §4.8). Unlike the mutex/condvar pair in most std libraries, this
/// `CondVar` stores no reference to "its" mutex — each `wait` call is told
/// which one to release and re-acquire, so a single `CondVar` can be shared
/// across different invariants guarded by different mutexes if needed,
/// exactly as in the original.
use super::context;
use super::intr_gate::IntrGate;
use super::mutex::Mutex;
use super::queue::{Queue, WaitKind};
use super::scheduler;
use super::time::{self, Time};

pub struct CondVar {
    waiters: spin::Mutex<Queue<WaitKind>>,
}

unsafe impl Send for CondVar {}
unsafe impl Sync for CondVar {}

impl CondVar {
    pub const fn new() -> Self {
        CondVar {
            waiters: spin::Mutex::new(Queue::new()),
        }
    }

    /// Atomically release `m` and suspend on this condvar, all within one
    /// interrupts-disabled window — no other thread can run between the
    /// release and the suspend, so a `signal` sent concurrently can never be
    /// missed. Re-acquires `m` before returning.
    pub fn wait(&self, m: &Mutex) {
        let _gate = IntrGate::acquire();
        m.unlock();
        let cur = scheduler::detach_current_from_ready();
        self.waiters.lock().insert_tail(cur);
        unsafe { context::save(scheduler::wait_handler, 0) };
        m.lock();
    }

    /// As `wait`, but gives up at `deadline`. Returns `true` iff woken by
    /// `signal`/`broadcast` rather than by timeout. `m` is unconditionally
    /// re-acquired before returning either way — only the wait itself is
    /// bounded by `deadline`, not the reacquisition, matching callers that
    /// always expect to hold `m` again once this returns.
    pub fn wait_or_timeout(&self, m: &Mutex, deadline: Time) -> bool {
        let _gate = IntrGate::acquire();
        m.unlock();
        if !time::less(time::now_no_interlock(), deadline) {
            m.lock();
            return false;
        }
        let cur = scheduler::detach_current_from_ready();
        unsafe {
            (*cur).wake_at = deadline.as_raw();
            (*cur).did_not_timeout = true;
        }
        self.waiters.lock().insert_tail(cur);
        unsafe { context::save(scheduler::sleep_handler, 0) };
        let woke_on_event = unsafe { (*cur).did_not_timeout };
        m.lock();
        woke_on_event
    }

    /// Wake one waiter, if any.
    pub fn signal(&self) {
        let _gate = IntrGate::acquire();
        let mut q = self.waiters.lock();
        if let Some(t) = q.head() {
            Queue::<WaitKind>::remove(t);
            scheduler::unlink_from_sleep(t);
            drop(q);
            scheduler::reschedule(t);
        }
    }

    /// Wake every waiter.
    pub fn broadcast(&self) {
        let _gate = IntrGate::acquire();
        loop {
            let mut q = self.waiters.lock();
            let t = match q.head() {
                Some(t) => t,
                None => break,
            };
            Queue::<WaitKind>::remove(t);
            scheduler::unlink_from_sleep(t);
            drop(q);
            scheduler::reschedule(t);
        }
    }

    /// Suspend without an associated mutex, for use from a context that has
    /// already disabled interrupts itself (e.g. signaling from inside an
    /// interrupt handler, where there is no enclosing `IntrGate` to release
    /// on drop). The caller's disabled-interrupts region *is* the critical
    /// section here; this function must not acquire its own `IntrGate`.
    pub fn mutexless_wait(&self) {
        let cur = scheduler::detach_current_from_ready();
        self.waiters.lock().insert_tail(cur);
        unsafe { context::save(scheduler::wait_handler, 0) };
    }

    /// The interrupt-context counterpart to `mutexless_wait`: wake one
    /// waiter without touching any mutex.
    pub fn mutexless_signal(&self) {
        let mut q = self.waiters.lock();
        if let Some(t) = q.head() {
            Queue::<WaitKind>::remove(t);
            scheduler::unlink_from_sleep(t);
            drop(q);
            scheduler::reschedule(t);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A signal with nobody parked is simply lost (spec.md §4.8): it must
    /// not panic, and it must not touch the scheduler at all (no `Thread` to
    /// recover out of an empty wait queue).
    #[test]
    fn signal_with_no_waiters_is_a_no_op() {
        let cv = CondVar::new();
        cv.signal();
        assert!(cv.waiters.lock().is_empty());
    }

    #[test]
    fn broadcast_with_no_waiters_is_a_no_op() {
        let cv = CondVar::new();
        cv.broadcast();
        assert!(cv.waiters.lock().is_empty());
    }

    #[test]
    fn mutexless_signal_with_no_waiters_is_a_no_op() {
        let cv = CondVar::new();
        cv.mutexless_signal();
        assert!(cv.waiters.lock().is_empty());
    }
}
