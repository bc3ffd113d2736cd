/// Monotonic time, decoupled from wall clock.
///
/// `Time` wraps a raw TSC cycle count. It compares and saturates like an
/// unsigned clock with sentinels at the ends of the range rather than
/// wrapping: `pos_infinity()` never arrives, `neg_infinity()` has always
/// already passed. Durations are plain cycle counts; `frequency_to_duration`
/// and `seconds_to_duration` convert against the calibrated TSC rate so
/// callers never have to know the underlying clock's frequency.
use core::sync::atomic::{AtomicU64, Ordering};

use super::intr_gate::IntrGate;

/// Fallback used until `calibrate` runs. 1 GHz is a conservative guess for
/// any CPU QEMU is likely to emulate; it only affects the apparent duration
/// of `sleep`/timeout quanta before calibration, never correctness.
const DEFAULT_TSC_HZ: u64 = 1_000_000_000;

static TSC_HZ: AtomicU64 = AtomicU64::new(DEFAULT_TSC_HZ);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Time(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(u64);

impl Time {
    pub const fn from_raw(ticks: u64) -> Self {
        Time(ticks)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl Duration {
    pub const fn from_raw(ticks: u64) -> Self {
        Duration(ticks)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub const ZERO: Duration = Duration(0);
}

pub fn pos_infinity() -> Time {
    Time(u64::MAX)
}

pub fn neg_infinity() -> Time {
    Time(0)
}

/// Read the TSC without disabling interrupts. Safe only when the caller
/// already holds an `IntrGate` (or otherwise knows interrupts are off) —
/// otherwise a preemption between the read and its use can make the value
/// stale relative to whatever the caller is comparing it against.
pub fn now_no_interlock() -> Time {
    Time(read_tsc())
}

/// Read the TSC, disabling interrupts for the duration of the read. Safe to
/// call from any context.
pub fn now() -> Time {
    let _gate = IntrGate::acquire();
    Time(read_tsc())
}

pub fn less(a: Time, b: Time) -> bool {
    a.0 < b.0
}

/// `a + d`, saturating at `pos_infinity`.
pub fn add(a: Time, d: Duration) -> Time {
    Time(a.0.saturating_add(d.0))
}

/// `a - b`, saturating at zero (never produces a negative duration).
pub fn sub(a: Time, b: Time) -> Duration {
    Duration(a.0.saturating_sub(b.0))
}

pub fn frequency_to_duration(hz: u64) -> Duration {
    let rate = TSC_HZ.load(Ordering::Relaxed);
    Duration(rate / hz.max(1))
}

pub fn seconds_to_duration(seconds: u64) -> Duration {
    let rate = TSC_HZ.load(Ordering::Relaxed);
    Duration(rate.saturating_mul(seconds))
}

pub fn milliseconds_to_duration(ms: u64) -> Duration {
    let rate = TSC_HZ.load(Ordering::Relaxed);
    Duration((rate / 1000).saturating_mul(ms))
}

/// Convert a duration expressed in TSC cycles into a count of PIT channel 0
/// ticks (the PIT oscillator runs at a fixed, known frequency independent of
/// the CPU's TSC rate).
pub fn duration_to_pit_counts(d: Duration) -> u64 {
    let rate = TSC_HZ.load(Ordering::Relaxed).max(1);
    ((d.0 as u128 * crate::interrupts::PIT_OSCILLATOR_HZ as u128) / rate as u128) as u64
}

fn read_tsc() -> u64 {
    unsafe { core::arch::x86_64::_rdtsc() }
}

/// Estimate the TSC frequency by timing a fixed number of PIT channel 0
/// ticks against the TSC. Run once at boot, before anything touches `Time`
/// or the scheduler. Deliberately simple: a single busy-wait sample, not the
/// original's drift-compensated rational-arithmetic calibration (that
/// existed to reconcile TSC drift against a second, independently clocked
/// timer; this kernel drives only the PIT).
pub fn calibrate() {
    const SAMPLE_TICKS: u16 = 0xFFFF;

    use x86_64::instructions::port::Port;
    let _gate = IntrGate::acquire();
    unsafe {
        let mut command: Port<u8> = Port::new(0x43);
        let mut channel0: Port<u8> = Port::new(0x40);
        // Mode 0 (interrupt on terminal count), one-shot, binary, lobyte/hibyte.
        command.write(0x30u8);
        channel0.write((SAMPLE_TICKS & 0xFF) as u8);
        channel0.write((SAMPLE_TICKS >> 8) as u8);

        let start = read_tsc();

        // Busy-poll the PIT's OUT line on the status byte until the
        // one-shot count reaches zero. Read-back command (0xE2): latch
        // status for channel 0.
        loop {
            command.write(0xE2u8);
            let status: u8 = channel0.read();
            if status & 0x80 != 0 {
                break;
            }
        }

        let end = read_tsc();
        let elapsed_cycles = end.saturating_sub(start) as u128;
        // hz = cycles / seconds = cycles * PIT_HZ / SAMPLE_TICKS, kept as a
        // single u128 product before the final division to avoid truncating
        // the intermediate rate to zero.
        let hz = (elapsed_cycles * crate::interrupts::PIT_OSCILLATOR_HZ as u128)
            / SAMPLE_TICKS as u128;
        if hz > 0 {
            TSC_HZ.store(hz as u64, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_saturates_at_pos_infinity() {
        let t = add(Time(u64::MAX - 1), Duration(10));
        assert_eq!(t, pos_infinity());
    }

    #[test]
    fn sub_saturates_at_zero() {
        let d = sub(Time(5), Time(10));
        assert_eq!(d, Duration::ZERO);
    }

    #[test]
    fn less_orders_by_raw_ticks() {
        assert!(less(Time(1), Time(2)));
        assert!(!less(Time(2), Time(2)));
    }

    #[test]
    fn infinities_bound_ordinary_times() {
        assert!(less(Time(12345), pos_infinity()));
        assert!(less(neg_infinity(), Time(1)));
    }
}
