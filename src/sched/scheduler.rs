/// The scheduler: one ready queue, one sleep queue, a pointer to the
/// currently running thread, and the thread table that owns every live
/// `Thread`'s heap allocation.
///
/// Every public function here requires interrupts already disabled by the
/// caller (an `IntrGate` held somewhere up the stack) — that, on a single
/// CPU, is the scheduler's entire mutual-exclusion story. The bookkeeping
/// below additionally sits behind `STATE: spin::Mutex<..>` purely so its
/// fields can be mutated through a shared `&Scheduler`-free API without
/// `static mut`; because callers already serialize everything via disabled
/// interrupts, that lock is never contended. The one rule that matters: a
/// `spin::MutexGuard` must never be alive across a call into
/// `context::save`/`context::restore`, since a diverging `restore` abandons
/// the current stack (and whatever destructors live on it) without running
/// them — every function below drops its guard before making that call.
extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex as SpinMutex;

use super::context::{self, InterruptFrame};
use super::intr_gate::IntrGate;
use super::queue::{Queue, SleepQueue, WaitKind};
use super::thread::{Thread, ThreadState, KERNEL_CS, KERNEL_SS, THREAD_STACK_SIZE};
use super::time;

/// The guard added to every PIT reprogram, per spec.md §9's Open Question
/// ("guard constants ... are empirical; an implementation should expose
/// them as tunables"). This kernel has only the PIT path — no APIC guard.
pub const TIMER_GUARD_PIT_COUNTS: u16 = 2;

/// Floor under which a reprogram's count is rounded up, so a deadline that
/// has already (almost) passed still produces a prompt timer instead of a
/// near-65536 one-shot count from wraparound.
const MIN_PIT_COUNTS: u16 = 1;

struct Scheduler {
    ready: Queue<WaitKind>,
    sleep: SleepQueue,
    current: *mut Thread,
    threads: BTreeMap<u64, Box<Thread>>,
    next_pid: u64,
}

unsafe impl Send for Scheduler {}

static STATE: SpinMutex<Option<Scheduler>> = SpinMutex::new(None);

/// The fixed quantum, computed once from the calibrated TSC rate in
/// `setup`. Spec.md §4.5: "a fixed small duration (e.g. 1/10 000 s)."
static QUANTUM_TICKS: AtomicU64 = AtomicU64::new(0);

fn with_state<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    let mut guard = STATE.lock();
    let s = guard
        .as_mut()
        .expect("sched::scheduler used before Scheduler::setup");
    f(s)
}

fn program_timer_for(deadline_ticks: u64) {
    let now = time::now_no_interlock();
    let remaining = time::sub(time::Time::from_raw(deadline_ticks), now);
    let counts = time::duration_to_pit_counts(remaining)
        .saturating_add(TIMER_GUARD_PIT_COUNTS as u64)
        .clamp(MIN_PIT_COUNTS as u64, u16::MAX as u64) as u16;
    crate::interrupts::program_one_shot(counts);
}

// ---------------------------------------------------------------------
// Setup, spawn, join, yield, introspection
// ---------------------------------------------------------------------

/// Install the scheduler, build the primordial thread around `continuation`,
/// and jump into it. Never returns.
///
/// Required init order (spec.md §9): `crate::init()` (GDT/IDT/PICs, enables
/// interrupts) → `sched::time::calibrate()` → this. The timer handler is
/// already wired into the IDT by `crate::init()`; `setup` only needs to
/// arm the first quantum before resuming.
pub fn setup(continuation: impl FnOnce() + Send + 'static) -> ! {
    let quantum = time::frequency_to_duration(10_000).as_raw().max(1);
    QUANTUM_TICKS.store(quantum, Ordering::Relaxed);

    let mut sched = Scheduler {
        ready: Queue::new(),
        sleep: SleepQueue::new(),
        current: core::ptr::null_mut(),
        threads: BTreeMap::new(),
        next_pid: 0,
    };
    sched.ready.init();
    sched.sleep.init();
    *STATE.lock() = Some(sched);

    let _gate = IntrGate::acquire();
    // An always-ready idle thread, so a moment where every other thread is
    // blocked (e.g. the shell waiting on the keyboard) is ordinary idling,
    // not the empty-ready-queue condition `resume_next` treats as fatal.
    spawn(String::from("idle"), || loop {
        x86_64::instructions::hlt();
    });
    spawn(String::from("primordial"), continuation);
    let sp = with_state(resume_next);
    unsafe { context::restore(sp) }
}

/// Build a new thread's stack and initial frame, register it, and append it
/// to the ready queue. Returns its pid.
pub fn spawn(name: String, run: impl FnOnce() + Send + 'static) -> u64 {
    use alloc::alloc::{alloc_zeroed, Layout};

    let layout = Layout::from_size_align(THREAD_STACK_SIZE, 16).unwrap();
    let stack_bottom = unsafe { alloc_zeroed(layout) };
    assert!(
        !stack_bottom.is_null(),
        "out of memory allocating thread stack"
    );

    // Double-box the closure: the outer `Box` is an ordinary thin pointer
    // (8 bytes), so it fits in a single register slot of the initial
    // frame, even though `dyn FnOnce() + Send` itself is a fat pointer.
    let boxed_run: Box<dyn FnOnce() + Send> = Box::new(run);
    let thin_ptr = Box::into_raw(Box::new(boxed_run));

    let stack_top = unsafe { stack_bottom.add(THREAD_STACK_SIZE) };
    let frame_ptr = build_initial_frame(stack_top, thin_ptr);

    with_state(|s| {
        let pid = s.next_pid;
        s.next_pid += 1;
        let mut t = Thread::new_boxed(pid, name, stack_bottom, THREAD_STACK_SIZE, frame_ptr);
        t.quantum = QUANTUM_TICKS.load(Ordering::Relaxed).max(1);
        let tp: *mut Thread = &mut *t;
        s.threads.insert(pid, t);
        s.ready.insert_tail(tp);
        pid
    })
}

/// Carve an `InterruptFrame` at the top of a fresh stack so that the first
/// `context::restore` into it lands in `trampoline` with its one argument
/// (`thin_ptr`, in `rdi` per the SysV ABI) already in place — the same
/// frame layout `context::save` produces, per spec.md §4.3's contract.
fn build_initial_frame(
    stack_top: *mut u8,
    thin_ptr: *mut Box<dyn FnOnce() + Send>,
) -> *mut InterruptFrame {
    let frame_size = core::mem::size_of::<InterruptFrame>();
    let frame_addr = (stack_top as usize - frame_size) & !0xF;
    let frame = frame_addr as *mut InterruptFrame;

    unsafe {
        core::ptr::write(
            frame,
            InterruptFrame {
                r15: 0,
                r14: 0,
                r13: 0,
                r12: 0,
                r11: 0,
                r10: 0,
                r9: 0,
                r8: 0,
                rbp: 0,
                rdi: thin_ptr as u64,
                rsi: 0,
                rdx: 0,
                rcx: 0,
                rbx: 0,
                rax: 0,
                rip: trampoline as usize as u64,
                cs: KERNEL_CS,
                rflags: 0x202, // IF=1: the freshly restored thread runs preemptible
                rsp: frame_addr as u64,
                ss: KERNEL_SS,
            },
        );
    }
    frame
}

/// Reached by the first `context::restore` into a freshly spawned thread.
/// Never called directly — only ever entered via `iretq` with `rdi` already
/// populated from the initial frame `build_initial_frame` wrote.
extern "C" fn trampoline(run_ptr: *mut Box<dyn FnOnce() + Send>) -> ! {
    let run = *unsafe { Box::from_raw(run_ptr) };
    run();

    let _gate = IntrGate::acquire();
    let sp = with_state(|s| {
        let me = s.current;
        unsafe { (*me).state = ThreadState::Terminated };
        // Wake every joiner — termination is a broadcast, not a single wakeup.
        while let Some(joiner) = unsafe { (*me).join_waiters.head() } {
            Queue::<WaitKind>::remove(joiner);
            reschedule_locked(s, joiner);
        }
        Queue::<WaitKind>::remove(me);
        resume_next(s)
    });
    unsafe { context::restore(sp) }
}

/// Block until the thread named by `pid` has terminated, then reap it
/// (drop its `Box`, freeing its stack). A no-op if `pid` does not name a
/// currently tracked thread (already reaped by an earlier joiner, or never
/// existed) — spec.md §4.6.
pub fn join(pid: u64) {
    loop {
        let _gate = IntrGate::acquire();
        enum Step {
            Done,
            ParkedSelf,
        }
        let step = with_state(|s| match s.threads.get(&pid) {
            None => Step::Done,
            Some(t) if t.state == ThreadState::Terminated => {
                s.threads.remove(&pid);
                Step::Done
            }
            Some(_) => {
                let target: *mut Thread = s.threads.get_mut(&pid).unwrap().as_mut();
                let cur = s.current;
                Queue::<WaitKind>::remove(cur);
                unsafe { (*target).join_waiters.insert_tail(cur) };
                Step::ParkedSelf
            }
        });
        match step {
            Step::Done => return,
            Step::ParkedSelf => unsafe { context::save(wait_handler, 0) },
        }
    }
}

/// Voluntarily give up the remainder of the current quantum.
pub fn yield_now() {
    let _gate = IntrGate::acquire();
    unsafe { context::save(yield_handler, 0) };
}

/// Suspend the calling thread for `d`. A pure timed sleep, with no
/// associated sync object: the thread is linked only on the sleep queue
/// (the "mutexless wait" case spec.md's sleep queue description carves
/// out), not on any wait queue.
pub fn sleep(d: time::Duration) {
    let _gate = IntrGate::acquire();
    let cur = detach_current_from_ready();
    let wake = time::add(time::now_no_interlock(), d);
    unsafe { (*cur).wake_at = wake.as_raw() };
    unsafe { context::save(sleep_handler, 0) };
}

/// The pid of the calling thread, or `None` before any thread is scheduled.
pub fn current_pid() -> Option<u64> {
    let _gate = IntrGate::acquire();
    with_state(|s| {
        if s.current.is_null() {
            None
        } else {
            Some(unsafe { (*s.current).pid })
        }
    })
}

/// Snapshot of every tracked thread, for the shell's `ps` command.
pub fn list_threads() -> Vec<(u64, String, ThreadState)> {
    let _gate = IntrGate::acquire();
    with_state(|s| {
        s.threads
            .iter()
            .map(|(&pid, t)| (pid, t.name.clone(), t.state))
            .collect()
    })
}

// ---------------------------------------------------------------------
// Operations used by Mutex/CondVar/BoundedFifo (spec.md §4.5, §4.7-4.9)
// ---------------------------------------------------------------------

/// Remove the current thread from the ready queue (idempotent) and return
/// its pointer, so the caller (Mutex/CondVar/BoundedFifo, which own the
/// specific wait queue in question) can link it there themselves before
/// handing off via `context::save`. Mirrors the first half of spec.md's
/// `suspend_on_wait(sp, q)`; the caller supplies the `q` half.
pub fn detach_current_from_ready() -> *mut Thread {
    with_state(|s| {
        let cur = s.current;
        Queue::<WaitKind>::remove(cur);
        cur
    })
}

/// The currently running thread. Used by timed-wait paths to stamp
/// `wake_at`/`did_not_timeout` before suspending.
pub fn current_thread() -> *mut Thread {
    with_state(|s| s.current)
}

/// Unlink `t` from whatever wait queue it is on (idempotent) and append it
/// to the ready queue. Does **not** touch the sleep queue — callers that
/// know `t` might also be sleeping (mutex/condvar wakeups, timer expiry)
/// call `unlink_from_sleep` first, per spec.md §4.5/§4.7.
pub fn reschedule(t: *mut Thread) {
    with_state(|s| reschedule_locked(s, t));
}

fn reschedule_locked(s: &mut Scheduler, t: *mut Thread) {
    Queue::<WaitKind>::remove(t);
    unsafe { (*t).state = ThreadState::Ready };
    s.ready.insert_tail(t);
}

/// Unlink `t` from the scheduler's sleep queue if present (idempotent).
pub fn unlink_from_sleep(t: *mut Thread) {
    SleepQueue::remove(t);
}

/// `context::save` handler for `Thread::yield_now`: store `sp`, move current
/// to the back of ready, resume the next thread. Never returns.
extern "C" fn yield_handler(_status: u64, _cs: u64, sp: *mut InterruptFrame, _arg: u64) -> ! {
    let next_sp = with_state(|s| {
        unsafe { (*s.current).saved_frame = sp };
        let cur = s.current;
        reschedule_locked(s, cur);
        resume_next(s)
    });
    unsafe { context::restore(next_sp) }
}

/// `context::save` handler for a thread that has already unlinked itself
/// from ready and linked itself onto some sync object's wait queue (or
/// `Thread`'s own `join_waiters`): store `sp`, resume the next ready
/// thread. Never returns.
pub(super) extern "C" fn wait_handler(
    _status: u64,
    _cs: u64,
    sp: *mut InterruptFrame,
    _arg: u64,
) -> ! {
    let next_sp = with_state(|s| {
        unsafe { (*s.current).saved_frame = sp };
        resume_next(s)
    });
    unsafe { context::restore(next_sp) }
}

/// `context::save` handler for a thread that has already unlinked itself
/// from ready, linked itself onto some sync object's wait queue, and set
/// its own `wake_at`/`did_not_timeout`: store `sp`, additionally link onto
/// the scheduler's sleep queue, resume the next ready thread. Never
/// returns.
pub(super) extern "C" fn sleep_handler(
    _status: u64,
    _cs: u64,
    sp: *mut InterruptFrame,
    _arg: u64,
) -> ! {
    let next_sp = with_state(|s| {
        let cur = s.current;
        unsafe { (*cur).saved_frame = sp };
        s.sleep.insert(cur);
        resume_next(s)
    });
    unsafe { context::restore(next_sp) }
}

/// Pick the head of the ready queue, make it current, program the timer for
/// its quantum, and return the `sp` to restore into. Fatal if the ready
/// queue is empty (deadlock) — spec.md §3/§4.5.
fn resume_next(s: &mut Scheduler) -> *mut InterruptFrame {
    let head = match s.ready.head() {
        Some(t) => t,
        None => panic!("scheduler deadlock: ready queue empty"),
    };
    s.current = head;
    unsafe {
        (*head).state = ThreadState::Running;
        let now = time::now_no_interlock();
        let eoq = time::add(now, time::Duration::from_raw((*head).quantum));
        (*head).end_of_quantum = eoq.as_raw();
        program_timer_for(eoq.as_raw());
        (*head).saved_frame
    }
}

/// Called from the raw timer ISR (`sched::context`'s `timer_isr` assembly)
/// with the interrupted thread's freshly pushed hardware frame. Acks the
/// PIC, wakes any sleepers whose deadline has passed, and either
/// reprograms the timer for the remainder of the current thread's quantum
/// or switches to the next ready thread (spec.md §4.5 `timer_elapsed`).
/// Never returns.
#[no_mangle]
extern "C" fn timer_tick_handler(frame: *mut InterruptFrame) -> ! {
    crate::interrupts::ack_timer();

    let now = time::now_no_interlock();
    enum Decision {
        ResumeSame,
        Switch,
    }
    let decision = with_state(|s| {
        while let Some(t) = s.sleep.head() {
            if unsafe { (*t).wake_at } > now.as_raw() {
                break;
            }
            SleepQueue::remove(t);
            unsafe { (*t).did_not_timeout = false };
            reschedule_locked(s, t);
        }

        let cur = s.current;
        let eoq = unsafe { (*cur).end_of_quantum };
        if now.as_raw() < eoq {
            program_timer_for(eoq);
            Decision::ResumeSame
        } else {
            unsafe { (*cur).saved_frame = frame };
            reschedule_locked(s, cur);
            Decision::Switch
        }
    });

    match decision {
        Decision::ResumeSame => unsafe { context::restore(frame) },
        Decision::Switch => {
            let sp = with_state(resume_next);
            unsafe { context::restore(sp) }
        }
    }
}
