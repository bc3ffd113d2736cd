/// A preemptible kernel thread: its own stack, a saved CPU state when not
/// running, and the three link pairs that let it sit on the ready queue,
/// the sleep queue, or a sync primitive's wait queue — never more than one
/// at a time, since a thread is always in exactly one of those states.
extern crate alloc;

use alloc::boxed::Box;
use alloc::string::String;

use super::context::InterruptFrame;
use super::queue::{Links, Queue, WaitKind};
use super::scheduler;

pub(super) const THREAD_STACK_SIZE: usize = 16 * 1024;
pub(super) const KERNEL_CS: u64 = 0x08;
pub(super) const KERNEL_SS: u64 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    Blocked,
    Sleeping,
    Terminated,
}

#[repr(C)]
pub struct Thread {
    pub pid: u64,
    pub name: String,
    pub state: ThreadState,
    /// Absolute wake time (raw `Time` ticks), valid only while on the sleep
    /// queue or while blocked with a timeout pending.
    pub wake_at: u64,
    /// Set by the timer when a timed-out suspend is woken by its deadline
    /// rather than by the corresponding wait queue; cleared on a normal
    /// wakeup. The sole source of truth distinguishing "event" from
    /// "timeout" for callers of `lock_or_timeout`/`wait_or_timeout`/
    /// `get_or_timeout`.
    pub did_not_timeout: bool,
    /// Length of this thread's quantum, in raw `Time` ticks.
    pub(super) quantum: u64,
    /// Absolute time (raw ticks) at which the running thread's current
    /// quantum expires. Meaningless unless this thread is `current`.
    pub(super) end_of_quantum: u64,

    pub(super) wait_links: Links,
    pub(super) mutex_links: Links,
    pub(super) sleep_links: Links,

    pub(super) join_waiters: Queue<WaitKind>,

    stack_bottom: *mut u8,
    stack_size: usize,
    pub(super) saved_frame: *mut InterruptFrame,
}

unsafe impl Send for Thread {}

impl Thread {
    /// Spawn a new thread running `run` to completion, then terminating.
    /// Returns its pid.
    pub fn start(name: impl Into<String>, run: impl FnOnce() + Send + 'static) -> u64 {
        scheduler::spawn(name.into(), run)
    }

    /// Block until the thread named by `pid` has terminated. A no-op if the
    /// pid does not name a live thread (already exited, or never existed).
    pub fn join(pid: u64) {
        scheduler::join(pid)
    }

    /// Voluntarily give up the remainder of the current quantum.
    pub fn yield_now() {
        scheduler::yield_now()
    }

    /// Suspend the calling thread for `d`.
    pub fn sleep(d: super::time::Duration) {
        scheduler::sleep(d)
    }

    /// The pid of the calling thread, or `None` if called from the
    /// primordial/idle context before any thread has been scheduled.
    pub fn current() -> Option<u64> {
        scheduler::current_pid()
    }

    pub(super) fn detached_links() -> Links {
        Links::detached()
    }

    pub(super) fn new_boxed(
        pid: u64,
        name: String,
        stack_bottom: *mut u8,
        stack_size: usize,
        saved_frame: *mut InterruptFrame,
    ) -> Box<Thread> {
        let mut t = Box::new(Thread {
            pid,
            name,
            state: ThreadState::Ready,
            wake_at: 0,
            did_not_timeout: true,
            quantum: 0,
            end_of_quantum: 0,
            wait_links: Links::detached(),
            mutex_links: Links::detached(),
            sleep_links: Links::detached(),
            join_waiters: Queue::new(),
            stack_bottom,
            stack_size,
            saved_frame,
        });
        t.wait_links = Links::detached();
        t.mutex_links = Links::detached();
        t.sleep_links = Links::detached();
        t.join_waiters.init();
        // Self-link each embedded head now that the thread has a stable
        // address (it was just heap-allocated, so `&mut t.*_links` below
        // is final).
        let p: *mut Thread = &mut *t;
        Queue::<WaitKind>::detach_init(p);
        t
    }

    pub(super) fn stack_bottom(&self) -> *mut u8 {
        self.stack_bottom
    }

    pub(super) fn stack_size(&self) -> usize {
        self.stack_size
    }
}

impl Drop for Thread {
    /// Frees the stack. Only ever runs when a joiner drops this thread's
    /// `Box` out of the scheduler's thread table — never while the thread
    /// could still be running, since only a `Terminated` thread is ever
    /// removed from that table (see `sched::scheduler::join`).
    fn drop(&mut self) {
        if !self.stack_bottom.is_null() {
            let layout = core::alloc::Layout::from_size_align(self.stack_size, 16)
                .expect("thread stack layout");
            unsafe { alloc::alloc::dealloc(self.stack_bottom, layout) };
        }
    }
}

#[cfg(test)]
impl Thread {
    /// Build a thread with no real stack, for exercising queue logic on the
    /// host where `InterruptFrame`s are never actually restored.
    pub(crate) fn new_for_test(pid: u64, name: &str) -> Thread {
        Thread {
            pid,
            name: String::from(name),
            state: ThreadState::Ready,
            wake_at: 0,
            did_not_timeout: true,
            quantum: 0,
            end_of_quantum: 0,
            wait_links: Links::detached(),
            mutex_links: Links::detached(),
            sleep_links: Links::detached(),
            join_waiters: Queue::new(),
            stack_bottom: core::ptr::null_mut(),
            stack_size: 0,
            saved_frame: core::ptr::null_mut(),
        }
    }
}
