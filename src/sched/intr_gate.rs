/// Scoped interrupt masking.
///
/// Every entry point into the scheduler core (spawning, suspending on a wait
/// or sleep queue, mutex/condvar/fifo operations) disables interrupts for the
/// duration of the call and restores them on every exit path, including the
/// ones that fall through a context switch and resume much later on a
/// different call stack. An `IntrGate` held across `context::save` stays
/// "acquired" from the compiler's point of view for the whole scope even
/// though the CPU physically ran other threads in between — it is dropped,
/// and interrupts re-enabled, only when the thread that created it actually
/// reaches the end of that scope again after being rescheduled.
#[cfg(not(test))]
use x86_64::instructions::interrupts as cpu;

/// Host-test stand-in: real `cli`/`sti` are privileged instructions that
/// fault outside ring 0, so `cargo test --lib` tracks the flag itself
/// instead. This is enough to host-test every path that doesn't also need
/// a real suspend (`context::save`'s own test stub panics on those).
#[cfg(test)]
mod cpu {
    use std::cell::Cell;
    std::thread_local! {
        static ENABLED: Cell<bool> = const { Cell::new(true) };
    }
    pub fn are_enabled() -> bool {
        ENABLED.with(|c| c.get())
    }
    pub fn disable() {
        ENABLED.with(|c| c.set(false));
    }
    pub fn enable() {
        ENABLED.with(|c| c.set(true));
    }
}

#[must_use]
pub struct IntrGate {
    was_enabled: bool,
}

impl IntrGate {
    /// Disable interrupts and return a guard that re-enables them on drop.
    /// If interrupts were already disabled, the guard restores that (off)
    /// state instead of unconditionally turning them back on — nested gates
    /// nest correctly.
    pub fn acquire() -> Self {
        let was_enabled = cpu::are_enabled();
        cpu::disable();
        IntrGate { was_enabled }
    }
}

impl Drop for IntrGate {
    fn drop(&mut self) {
        if self.was_enabled {
            cpu::enable();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restores_enabled_state_on_drop() {
        assert!(cpu::are_enabled());
        {
            let _gate = IntrGate::acquire();
            assert!(!cpu::are_enabled());
        }
        assert!(cpu::are_enabled());
    }

    #[test]
    fn nested_gate_does_not_reenable_early() {
        let _outer = IntrGate::acquire();
        assert!(!cpu::are_enabled());
        {
            let _inner = IntrGate::acquire();
            assert!(!cpu::are_enabled());
        }
        // inner dropped, but outer still holds the region disabled
        assert!(!cpu::are_enabled());
        drop(_outer);
        assert!(cpu::are_enabled());
    }
}
