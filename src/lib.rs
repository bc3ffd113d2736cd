#![cfg_attr(not(test), no_std)]
#![feature(abi_x86_interrupt)]

//! Kernel library: boot-time subsystem init, drivers, filesystem, shell,
//! and the preemptive thread scheduler core (`sched`).
//!
//! Built `#[cfg(test)]` under ordinary `std` so the scheduler core's pure
//! bookkeeping (queues, mutex/condvar/fifo transition logic, time
//! arithmetic) runs as plain host unit tests via `cargo test --lib`; the
//! real kernel binary (`main.rs`) and the QEMU integration tests under
//! `tests/` each build this crate `no_std`, with their own
//! `#![no_main]`/`#![feature(custom_test_frameworks)]` entry point and
//! `#[panic_handler]` — this file intentionally has neither, since it is
//! shared by both.

extern crate alloc;

pub mod allocator;
pub mod console;
pub mod filesystem;
pub mod font;
pub mod framebuffer;
pub mod gdt;
pub mod interrupts;
pub mod keyboard;
pub mod memory;
pub mod sched;
pub mod serial;
pub mod shell;
pub mod vga_buffer;

use core::panic::PanicInfo;

/// Bring up the GDT, IDT and PICs, then enable interrupts.
///
/// Initialization order required by the scheduler core (spec'd in
/// `sched::scheduler::setup`'s doc comment): this, then
/// `sched::time::calibrate`, then `sched::scheduler::setup`. Interrupts are
/// already enabled by the time `setup` resumes the primordial thread, so the
/// timer ISR installed here is live the moment a thread is running.
pub fn init() {
    gdt::init();
    interrupts::init_idt();
    unsafe { interrupts::PICS.lock().initialize() };
    x86_64::instructions::interrupts::enable();
}

pub fn hlt_loop() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

/// Write `exit_code` to the `isa-debug-exit` device port, which a QEMU
/// invocation using `-device isa-debug-exit,iobase=0xf4,iosize=0x04` turns
/// into a process exit code. Used only by the `tests/` integration binaries.
pub fn exit_qemu(exit_code: QemuExitCode) {
    use x86_64::instructions::port::Port;
    unsafe {
        let mut port: Port<u32> = Port::new(0xf4);
        port.write(exit_code as u32);
    }
}

pub trait Testable {
    fn run(&self);
}

impl<T: Fn()> Testable for T {
    fn run(&self) {
        serial_print!("{}...\t", core::any::type_name::<T>());
        self();
        serial_println!("[ok]");
    }
}

/// The `#![test_runner]` for every `tests/*.rs` integration binary.
pub fn test_runner(tests: &[&dyn Testable]) {
    serial_println!("Running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    exit_qemu(QemuExitCode::Success);
}

pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {}\n", info);
    exit_qemu(QemuExitCode::Failed);
    hlt_loop();
}
