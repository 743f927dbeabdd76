//! Synchronization primitives shared between interrupt and mainline context.
//!
//! Provides [`RingBuffer`], a lock-free single-producer/single-consumer byte
//! queue suitable for use in `static` items and usable from an interrupt
//! handler without any locking.

mod spsc;

pub(crate) mod loom_compat;

pub use spsc::RingBuffer;
