//! Preemptive user-level thread scheduler core.
//!
//! A single-CPU, round-robin scheduler over intrusively-linked `Thread`s,
//! plus the synchronization primitives built on top of it (`Mutex`,
//! `CondVar`, `BoundedFifo`) and the low-level context-switch/timer
//! protocol (`context`, `intr_gate`) that make preemption correct.
//!
//! Module layout mirrors the dependency order: `time` and `intr_gate` have
//! no dependencies within this module; `context` depends on neither;
//! `queue` depends on `thread`'s link fields; `scheduler` ties `queue` and
//! `context` together into the ready/sleep queues and `resume_next`;
//! `mutex`/`condvar`/`bounded_fifo` are built entirely on `scheduler`'s
//! public suspend/reschedule operations, never touching queues or contexts
//! directly.

pub mod bounded_fifo;
pub mod condvar;
pub mod context;
pub mod intr_gate;
pub mod mutex;
pub mod queue;
pub mod scheduler;
pub mod thread;
pub mod time;

pub use bounded_fifo::BoundedFifo;
pub use condvar::CondVar;
pub use intr_gate::IntrGate;
pub use mutex::Mutex;
pub use thread::Thread;
