/// CPU state save/restore for preemptive context switching.
///
/// `InterruptFrame` is the fixed layout every suspended thread's stack holds
/// at the point execution can be resumed from: the fifteen general-purpose
/// registers pushed by hand, followed by the five registers the CPU itself
/// pushes on a real hardware interrupt (rip, cs, rflags, rsp, ss). `restore`
/// is the single routine that ever executes `iretq`, whether the frame was
/// produced by the timer ISR or manufactured in software by `save`.
///
/// `save(handler, arg)` lets ordinary Rust code (not just the interrupt
/// handler) suspend the current thread: it builds an `InterruptFrame` that
/// describes "resume right here, past this call" and hands its address to
/// `handler`. The handler typically files the thread on some wait queue and
/// calls `restore` on whatever thread runs next; when this thread is chosen
/// again, `restore` jumps back in and `save` appears to return normally to
/// its caller.
#[repr(C)]
pub struct InterruptFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// Called by `save` (and, nested one level, by the timer ISR indirectly via
/// `timer_tick_handler`) with the freshly-built frame. `status` is the
/// frame's rflags at the moment of the call, `cs` its code segment; most
/// handlers only need `sp`.
pub type SaveHandler = extern "C" fn(status: u64, cs: u64, sp: *mut InterruptFrame, arg: u64) -> !;

#[cfg(not(test))]
mod asm {
    use super::InterruptFrame;

    const KERNEL_CS: u64 = 0x08;
    const KERNEL_SS: u64 = 0x10;

    pub fn timer_isr_addr() -> u64 {
        extern "C" {
            fn timer_isr();
        }
        timer_isr as *const () as u64
    }

    extern "C" {
        fn save_context(handler: super::SaveHandler, arg: u64);
        fn restore_context(sp: *mut InterruptFrame) -> !;
    }

    /// Build a software frame describing "resume past this call" and invoke
    /// `handler` with it. Returns normally, much later, if and when this
    /// thread is rescheduled.
    pub unsafe fn save(handler: super::SaveHandler, arg: u64) {
        unsafe { save_context(handler, arg) }
    }

    /// Replace the current stack pointer with `sp` and resume execution
    /// there. `sp` must point at a valid `InterruptFrame` previously
    /// produced by `save` or by the timer ISR, or freshly constructed for a
    /// new thread (see `sched::thread`). Never returns.
    pub unsafe fn restore(sp: *mut InterruptFrame) -> ! {
        unsafe { restore_context(sp) }
    }

    const _: () = {
        assert!(core::mem::size_of::<InterruptFrame>() == 20 * 8);
    };

    // Shared GP-register push/pop lists, reused by all three entry points
    // below so their frame layout stays in lock-step with `InterruptFrame`.
    core::arch::global_asm!(
        ".global save_context",
        "save_context:",
        // On entry: rdi = handler, rsi = arg, [rsp] = return address V
        // pushed by the `call` that got us here.
        "pop rax",            // rax = V; rsp is now the caller's true pre-call rsp
        "mov r11, rsp",       // r11 = pre-call rsp, to embed as the frame's rsp field
        "push {ss}",
        "push r11",
        "pushfq",
        "push {cs}",
        "push rax",           // rip field = V: resume right after the call site
        "push rax",
        "push rbx",
        "push rcx",
        "push rdx",
        "push rsi",
        "push rdi",
        "push rbp",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov rdx, rsp",                 // arg3 (sp) = frame pointer
        "mov rcx, rsi",                 // arg4 (arg)
        "mov r9, rdi",                  // stash handler ptr before clobbering rdi
        "mov rdi, [rsp + 136]",         // arg1 (status) = frame.rflags
        "mov rsi, {cs}",                // arg2 (cs)
        "cld",
        "call r9",
        ss = const KERNEL_SS,
        cs = const KERNEL_CS,
    );

    core::arch::global_asm!(
        ".global restore_context",
        "restore_context:",
        // rdi = sp (pointer to an InterruptFrame)
        "mov rsp, rdi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rbp",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "pop rbx",
        "pop rax",
        "iretq",
    );

    core::arch::global_asm!(
        ".global timer_isr",
        "timer_isr:",
        // Hardware already pushed ss, rsp, rflags, cs, rip.
        "push rax",
        "push rbx",
        "push rcx",
        "push rdx",
        "push rsi",
        "push rdi",
        "push rbp",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov rdi, rsp",
        "cld",
        "call timer_tick_handler", // -> !, never returns to here
    );
}

#[cfg(not(test))]
pub use asm::{restore, save, timer_isr_addr};

/// Host-test stand-in. There is no real stack to switch on the host, and
/// `save`'s handler never returns by contract, so host tests exercise the
/// scheduler's decision logic directly (queue ordering, wakeup bookkeeping)
/// rather than round-tripping through an actual suspend/resume. These two
/// are unreachable from that test code on purpose — reaching them would
/// mean a test tried to exercise a real suspend point, which only the QEMU
/// integration tests can do.
#[cfg(test)]
pub mod test_stub {
    use super::InterruptFrame;

    pub fn timer_isr_addr() -> u64 {
        0
    }

    pub unsafe fn save(_handler: super::SaveHandler, _arg: u64) {
        unreachable!("host tests exercise scheduler bookkeeping, not real suspension")
    }

    pub unsafe fn restore(_sp: *mut InterruptFrame) -> ! {
        unreachable!("host tests exercise scheduler bookkeeping, not real suspension")
    }
}

#[cfg(test)]
pub use test_stub::{restore, save, timer_isr_addr};
