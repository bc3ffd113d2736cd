/// Synchronous keyboard input for the shell thread.
///
/// The interrupt handler pushes each scancode onto
/// `interrupts::SCANCODE_QUEUE` and signals a condition variable; there is
/// no enclosing `IntrGate` inside an interrupt handler to hand off to a
/// real `Mutex`, so the handler uses `CondVar::mutexless_signal` and
/// `read_scancode` its `mutexless_wait` counterpart. `read_scancode` opens
/// its own `IntrGate` around the check-then-wait so a scancode arriving
/// between the empty check and the suspend is never lost.
use crate::interrupts::SCANCODE_QUEUE;
use crate::sched::intr_gate::IntrGate;
use crate::sched::CondVar;

static SCANCODE_READY: CondVar = CondVar::new();

/// Called from the keyboard IRQ handler once a scancode has been pushed.
pub fn notify_keyboard_interrupt() {
    SCANCODE_READY.mutexless_signal();
}

/// Block the calling thread until a scancode is available, then return it.
pub fn read_scancode() -> u8 {
    loop {
        let _gate = IntrGate::acquire();
        if let Some(scancode) = SCANCODE_QUEUE.lock().pop() {
            return scancode;
        }
        SCANCODE_READY.mutexless_wait();
    }
}
