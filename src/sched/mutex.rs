/// A blocking mutual-exclusion lock (spec.md §4.7).
///
/// Ownership is not tracked: `lock`/`unlock` don't record which thread holds
/// the lock, so nothing stops a thread other than the owner from calling
/// `unlock` (spec.md §9's Open Question resolves this as "don't track it" —
/// the simpler, original semantics). `unlock` hands the lock directly to the
/// next waiter rather than merely clearing a flag and letting waiters race
/// for it: whichever thread is at the head of the wait queue owns the lock
/// the instant `unlock` returns, without itself needing to go through
/// `lock`'s fast path again.
use super::context;
use super::intr_gate::IntrGate;
use super::queue::{Queue, WaitKind};
use super::scheduler;
use super::time::{self, Time};

struct Inner {
    locked: bool,
    waiters: Queue<WaitKind>,
}

pub struct Mutex {
    inner: spin::Mutex<Inner>,
}

// Safety: all access to `inner` happens with interrupts disabled on a
// single CPU (`IntrGate`), the same argument that makes `Thread` itself
// `Send`.
unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl Mutex {
    pub const fn new() -> Self {
        Mutex {
            inner: spin::Mutex::new(Inner {
                locked: false,
                waiters: Queue::new(),
            }),
        }
    }

    /// Acquire the lock, blocking until it is available.
    pub fn lock(&self) {
        let _gate = IntrGate::acquire();
        let mut inner = self.inner.lock();
        if !inner.locked {
            inner.locked = true;
            return;
        }
        let cur = scheduler::detach_current_from_ready();
        inner.waiters.insert_tail(cur);
        drop(inner);
        unsafe { context::save(scheduler::wait_handler, 0) };
        // Woken only by `unlock`, which transfers ownership to us directly:
        // `locked` is already `true` by the time we run again.
    }

    /// Release the lock. If a thread is waiting, ownership passes straight
    /// to it (the mutex stays `locked`); otherwise it is cleared.
    pub fn unlock(&self) {
        let _gate = IntrGate::acquire();
        let mut inner = self.inner.lock();
        match inner.waiters.head() {
            None => inner.locked = false,
            Some(next) => {
                Queue::<WaitKind>::remove(next);
                scheduler::unlink_from_sleep(next);
                drop(inner);
                scheduler::reschedule(next);
            }
        }
    }

    /// Acquire the lock, or give up once `deadline` has passed. Returns
    /// `true` iff the caller now holds the lock.
    pub fn lock_or_timeout(&self, deadline: Time) -> bool {
        let _gate = IntrGate::acquire();
        let mut inner = self.inner.lock();
        if !inner.locked {
            inner.locked = true;
            return true;
        }
        if !time::less(time::now_no_interlock(), deadline) {
            return false;
        }
        let cur = scheduler::detach_current_from_ready();
        unsafe {
            (*cur).wake_at = deadline.as_raw();
            (*cur).did_not_timeout = true;
        }
        inner.waiters.insert_tail(cur);
        drop(inner);
        unsafe { context::save(scheduler::sleep_handler, 0) };
        unsafe { (*cur).did_not_timeout }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_mutex_is_unlocked() {
        let m = Mutex::new();
        assert!(!m.inner.lock().locked);
    }

    /// The uncontended fast path of `lock`/`unlock` never touches the
    /// scheduler (no waiter to reschedule, nothing to suspend on), so it is
    /// safe to exercise on the host: only the contended path needs a real
    /// suspend point.
    #[test]
    fn uncontended_lock_unlock_round_trips() {
        let m = Mutex::new();
        m.lock();
        assert!(m.inner.lock().locked);
        m.unlock();
        assert!(!m.inner.lock().locked);
        // And again, to make sure `unlock` left it genuinely reusable.
        m.lock();
        m.unlock();
        assert!(!m.inner.lock().locked);
    }

    /// `unlock` with no waiter just clears the flag; it must never try to
    /// recover a `Thread` pointer out of an empty wait queue.
    #[test]
    fn unlock_with_no_waiters_only_clears_flag() {
        let m = Mutex::new();
        m.lock();
        m.unlock();
        assert!(!m.inner.lock().locked);
        assert!(m.inner.lock().waiters.is_empty());
    }
}
