//! Core types and synchronization primitives for the comirq serial driver.
//!
//! This crate contains the host-testable pieces of the driver: the
//! single-producer/single-consumer receive ring shared between interrupt
//! context and the polling mainline, typed interrupt identifiers, and a few
//! small helpers for `static` state.
//!
//! By living outside the hardware crates, these types can be tested with
//! `cargo test` and loom on the host without a bare-metal target.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod cell;
pub mod id;
pub mod static_assert;
pub mod sync;
