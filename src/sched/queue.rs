/// Intrusive doubly-linked queues over `Thread`, with no separate node
/// allocation: every thread carries three independent link pairs
/// (`wait_links`, `mutex_links`, `sleep_links`), one per queue it can belong
/// to at once. A `LinkKind` picks which pair a given `Queue<K>` manages and
/// knows how to recover the owning `*mut Thread` from a link pointer — the
/// Rust analogue of the original's single-inheritance pointer casts, done
/// with `offset_of!` instead of a base-class reinterpretation.
use core::marker::PhantomData;
use core::mem::offset_of;

use super::thread::Thread;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Links {
    pub next: *mut Links,
    pub prev: *mut Links,
}

impl Links {
    pub const fn detached() -> Self {
        Links {
            next: core::ptr::null_mut(),
            prev: core::ptr::null_mut(),
        }
    }
}

/// Selects one of a thread's three link pairs and knows how to get back
/// from a `*mut Links` belonging to that pair to the owning thread.
pub trait LinkKind {
    fn links_of(t: *mut Thread) -> *mut Links;
    /// # Safety
    /// `l` must be a pointer previously returned by `links_of` for some live
    /// `Thread`, not a queue head.
    unsafe fn thread_of(l: *mut Links) -> *mut Thread;
}

pub struct WaitKind;
impl LinkKind for WaitKind {
    fn links_of(t: *mut Thread) -> *mut Links {
        unsafe { &raw mut (*t).wait_links }
    }
    unsafe fn thread_of(l: *mut Links) -> *mut Thread {
        (l as *mut u8).sub(offset_of!(Thread, wait_links)) as *mut Thread
    }
}

/// Reserved for a future per-thread "set of owned mutexes"; not wired into
/// any operation in this core.
pub struct MutexKind;
impl LinkKind for MutexKind {
    fn links_of(t: *mut Thread) -> *mut Links {
        unsafe { &raw mut (*t).mutex_links }
    }
    unsafe fn thread_of(l: *mut Links) -> *mut Thread {
        (l as *mut u8).sub(offset_of!(Thread, mutex_links)) as *mut Thread
    }
}

pub struct SleepKind;
impl LinkKind for SleepKind {
    fn links_of(t: *mut Thread) -> *mut Links {
        unsafe { &raw mut (*t).sleep_links }
    }
    unsafe fn thread_of(l: *mut Links) -> *mut Thread {
        (l as *mut u8).sub(offset_of!(Thread, sleep_links)) as *mut Thread
    }
}

/// A FIFO queue: insertion always at the tail. Used for wait queues (ready
/// queue, and every Mutex/CondVar's blocked-thread list).
pub struct Queue<K> {
    head: Links,
    _kind: PhantomData<K>,
}

impl<K: LinkKind> Queue<K> {
    pub const fn new() -> Self {
        Queue {
            head: Links {
                next: core::ptr::null_mut(),
                prev: core::ptr::null_mut(),
            },
            _kind: PhantomData,
        }
    }

    fn head_ptr(&mut self) -> *mut Links {
        // Lazily self-link on first touch: a `Queue` embedded in a `static`
        // (every `Mutex`/`CondVar`/`BoundedFifo` wait queue) is built by a
        // `const fn` that cannot take its own not-yet-placed address, so
        // `new()` leaves `next`/`prev` null rather than self-linked. Every
        // entry point here repairs that before reading it.
        if self.head.next.is_null() {
            self.init();
        }
        &raw mut self.head
    }

    /// Self-link the (empty) head. Idempotent; also called lazily by every
    /// other method, so callers never strictly need to call this — it
    /// exists for queues like the scheduler's ready/sleep queues, whose
    /// construction and first use are visibly separate in `setup`.
    pub fn init(&mut self) {
        let h = &raw mut self.head;
        unsafe {
            (*h).next = h;
            (*h).prev = h;
        }
    }

    pub fn is_empty(&mut self) -> bool {
        let h = self.head_ptr();
        unsafe { (*h).next == h }
    }

    /// The thread at the front of the queue, if any.
    pub fn head(&mut self) -> Option<*mut Thread> {
        let h = self.head_ptr();
        let first = unsafe { (*h).next };
        if first == h {
            None
        } else {
            Some(unsafe { K::thread_of(first) })
        }
    }

    pub fn insert_tail(&mut self, t: *mut Thread) {
        let h = self.head_ptr();
        let node = K::links_of(t);
        unsafe {
            let last = (*h).prev;
            (*node).prev = last;
            (*node).next = h;
            (*last).next = node;
            (*h).prev = node;
        }
    }

    /// Detach `t` from whatever queue of this kind it is currently on (a
    /// no-op if it is already detached / self-linked).
    pub fn remove(t: *mut Thread) {
        let node = K::links_of(t);
        unsafe {
            let prev = (*node).prev;
            let next = (*node).next;
            if !prev.is_null() {
                (*prev).next = next;
            }
            if !next.is_null() {
                (*next).prev = prev;
            }
            (*node).next = node;
            (*node).prev = node;
        }
    }

    pub fn detach_init(t: *mut Thread) {
        let node = K::links_of(t);
        unsafe {
            (*node).next = node;
            (*node).prev = node;
        }
    }
}

/// A queue ordered by ascending wake time, used by the scheduler's single
/// sleep queue. Insertion walks backward from the tail, since new timeouts
/// are usually close to (or later than) the most recently inserted one.
pub struct SleepQueue {
    head: Links,
}

impl SleepQueue {
    pub const fn new() -> Self {
        SleepQueue {
            head: Links {
                next: core::ptr::null_mut(),
                prev: core::ptr::null_mut(),
            },
        }
    }

    fn head_ptr(&mut self) -> *mut Links {
        if self.head.next.is_null() {
            self.init();
        }
        &raw mut self.head
    }

    pub fn init(&mut self) {
        let h = &raw mut self.head;
        unsafe {
            (*h).next = h;
            (*h).prev = h;
        }
    }

    pub fn is_empty(&mut self) -> bool {
        let h = self.head_ptr();
        unsafe { (*h).next == h }
    }

    pub fn head(&mut self) -> Option<*mut Thread> {
        let h = self.head_ptr();
        let first = unsafe { (*h).next };
        if first == h {
            None
        } else {
            Some(unsafe { SleepKind::thread_of(first) })
        }
    }

    /// Insert `t` (whose `wake_at` must already be set) keeping the queue
    /// ordered by ascending wake time.
    pub fn insert(&mut self, t: *mut Thread) {
        let h = self.head_ptr();
        let node = SleepKind::links_of(t);
        let wake_at = unsafe { (*t).wake_at };

        unsafe {
            let mut cursor = (*h).prev;
            while cursor != h {
                let cursor_thread = SleepKind::thread_of(cursor);
                if (*cursor_thread).wake_at <= wake_at {
                    break;
                }
                cursor = (*cursor).prev;
            }
            let after = (*cursor).next;
            (*node).prev = cursor;
            (*node).next = after;
            (*cursor).next = node;
            (*after).prev = node;
        }
    }

    pub fn remove(t: *mut Thread) {
        Queue::<SleepKind>::remove(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::thread::Thread;
    use alloc::boxed::Box;

    extern crate alloc;

    fn leak_thread(pid: u64, name: &'static str) -> *mut Thread {
        Box::into_raw(Box::new(Thread::new_for_test(pid, name)))
    }

    #[test]
    fn fifo_queue_preserves_insertion_order() {
        let mut q: Queue<WaitKind> = Queue::new();
        q.init();
        let a = leak_thread(1, "a");
        let b = leak_thread(2, "b");
        let c = leak_thread(3, "c");
        q.insert_tail(a);
        q.insert_tail(b);
        q.insert_tail(c);

        assert_eq!(unsafe { (*q.head().unwrap()).pid }, 1);
        Queue::<WaitKind>::remove(a);
        assert_eq!(unsafe { (*q.head().unwrap()).pid }, 2);
        Queue::<WaitKind>::remove(b);
        assert_eq!(unsafe { (*q.head().unwrap()).pid }, 3);
        Queue::<WaitKind>::remove(c);
        assert!(q.is_empty());
    }

    #[test]
    fn sleep_queue_orders_by_wake_time() {
        let mut q = SleepQueue::new();
        q.init();
        let a = leak_thread(1, "a");
        let b = leak_thread(2, "b");
        let c = leak_thread(3, "c");
        unsafe {
            (*a).wake_at = 30;
            (*b).wake_at = 10;
            (*c).wake_at = 20;
        }
        q.insert(a);
        q.insert(b);
        q.insert(c);

        assert_eq!(unsafe { (*q.head().unwrap()).pid }, 2); // wake_at 10
        SleepQueue::remove(b);
        assert_eq!(unsafe { (*q.head().unwrap()).pid }, 3); // wake_at 20
        SleepQueue::remove(c);
        assert_eq!(unsafe { (*q.head().unwrap()).pid }, 1); // wake_at 30
        SleepQueue::remove(a);
        assert!(q.is_empty());
    }
}
