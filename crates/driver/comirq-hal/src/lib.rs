//! Hardware-abstraction layer for the comirq serial driver.
//!
//! Drivers never touch hardware directly. They are generic over a
//! [`Platform`], which bundles three capabilities:
//!
//! - [`PortIo`]: byte-wide I/O port reads and writes.
//! - [`InterruptFlag`]: global interrupt delivery on/off.
//! - [`VectorTable`]: save, install, restore, and chain interrupt handlers in
//!   the platform's dispatch table.
//!
//! The [`x86_64`] module provides the real implementation; the `sim` feature
//! adds a host-side simulated platform used by the driver tests.

#![cfg_attr(not(any(test, feature = "sim")), no_std)]
#![warn(missing_docs)]

pub mod interrupts;
pub mod pic;
pub mod port;
#[cfg(feature = "sim")]
pub mod sim;
#[cfg(target_arch = "x86_64")]
pub mod x86_64;

pub use interrupts::{HandlerRef, InterruptFlag, InterruptService, Platform, VectorTable};
pub use port::{IoPort, PortIo};
