//! Static interrupt dispatch table.
//!
//! One slot per CPU vector. Each slot holds the `&'static dyn
//! InterruptService` the entry stub for that vector forwards to. Slots are
//! only written with interrupts disabled on the single core that services
//! them, so a plain [`RacyCell`] suffices.

use comirq_core::cell::RacyCell;
use comirq_core::id::InterruptVector;

use crate::interrupts::{HandlerRef, InterruptService};

/// Number of CPU interrupt vectors.
const NUM_VECTORS: usize = 256;

static HANDLERS: [RacyCell<HandlerRef>; NUM_VECTORS] =
    [const { RacyCell::new(HandlerRef::NONE) }; NUM_VECTORS];

/// Returns the handler occupying `vector`.
pub(super) fn load(vector: InterruptVector) -> HandlerRef {
    // SAFETY: Writers run with interrupts disabled on this core, so no write
    // can be in progress while mainline or a handler reads the slot.
    unsafe { HANDLERS[vector.as_usize()].read() }
}

/// Stores `handler` into `vector`.
///
/// # Safety
///
/// Interrupts must be disabled.
pub(super) unsafe fn store(vector: InterruptVector, handler: HandlerRef) {
    // SAFETY: The caller guarantees interrupts are disabled, so no reader can
    // observe a torn slot.
    unsafe { HANDLERS[vector.as_usize()].write(handler) }
}

/// Installs `handler` into `vector`.
///
/// # Safety
///
/// Interrupts must be disabled.
pub(super) unsafe fn install(vector: InterruptVector, handler: &'static dyn InterruptService) {
    // SAFETY: Forwarded.
    unsafe { store(vector, HandlerRef::new(handler)) }
}
