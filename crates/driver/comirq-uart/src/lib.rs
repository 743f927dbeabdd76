//! Interrupt-driven receive driver for a 16550 UART on the legacy PC.
//!
//! The driver installs itself into the platform's dispatch table, drains the
//! receive FIFO into a lock-free ring whenever the device raises
//! received-data-available, and hands bytes to a polling consumer through
//! [`UartDriver::read_nonblocking`]. Transmission is synchronous.
//!
//! Interrupts the UART did not raise for its receive path are delegated to
//! whichever handler owned the vector before [`UartDriver::init`].

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod binding;
pub mod config;
pub mod driver;
pub mod error;
pub mod uart16550;

pub use config::{BaudRate, ConfigError, Divisor, FifoTrigger, OverflowPolicy, UartConfig};
pub use driver::{DriverState, UartDriver};
pub use error::DriverError;
