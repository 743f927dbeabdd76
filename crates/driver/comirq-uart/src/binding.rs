//! Ownership of one dispatch-table slot.
//!
//! An [`InterruptVectorBinding`] remembers which handler occupied its vector
//! before the driver took it over, so that foreign interrupts can be passed
//! along and the slot can be handed back untouched at shutdown.

use core::sync::atomic::{AtomicBool, Ordering};

use comirq_core::cell::RacyCell;
use comirq_core::id::InterruptVector;
use comirq_hal::{HandlerRef, InterruptService, VectorTable};

use crate::error::DriverError;

/// Saved state for a driver-owned dispatch-table slot.
pub struct InterruptVectorBinding {
    vector: InterruptVector,
    /// Written only with interrupts disabled, before (or after) our handler
    /// occupies the slot.
    previous: RacyCell<HandlerRef>,
    installed: AtomicBool,
}

impl InterruptVectorBinding {
    /// Creates an unbound slot record for `vector`.
    #[must_use]
    pub const fn new(vector: InterruptVector) -> Self {
        Self {
            vector,
            previous: RacyCell::new(HandlerRef::NONE),
            installed: AtomicBool::new(false),
        }
    }

    /// The slot this binding manages.
    #[must_use]
    pub const fn vector(&self) -> InterruptVector {
        self.vector
    }

    /// Returns `true` between a successful install and the matching restore.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// The handler that occupied the slot before [`capture_and_install`].
    ///
    /// [`capture_and_install`]: Self::capture_and_install
    #[must_use]
    pub fn previous(&self) -> HandlerRef {
        // SAFETY: `previous` is only written with interrupts disabled on this
        // core, so no write can be in progress during this read.
        unsafe { self.previous.read() }
    }

    /// Saves the slot's current handler, then installs `handler` in its place.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] if the slot is already bound; the table
    /// is left untouched.
    ///
    /// # Safety
    ///
    /// Global interrupt delivery must be disabled.
    pub unsafe fn capture_and_install<T: VectorTable + ?Sized>(
        &self,
        table: &T,
        handler: &'static dyn InterruptService,
    ) -> Result<(), DriverError> {
        if self.is_installed() {
            return Err(DriverError::InvalidState);
        }
        let previous = table.save_current(self.vector);
        // SAFETY: Interrupts are disabled (caller contract), and our handler
        // is not installed yet, so nothing reads `previous` concurrently.
        unsafe {
            self.previous.write(previous);
            table.install(self.vector, handler);
        }
        self.installed.store(true, Ordering::Release);
        Ok(())
    }

    /// Puts the saved handler back into the slot.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] if nothing was installed.
    ///
    /// # Safety
    ///
    /// Global interrupt delivery must be disabled.
    pub unsafe fn restore<T: VectorTable + ?Sized>(&self, table: &T) -> Result<(), DriverError> {
        if !self.is_installed() {
            return Err(DriverError::InvalidState);
        }
        // SAFETY: Interrupts are disabled (caller contract); once the old
        // handler is back, ours can no longer run and read `previous`.
        unsafe {
            table.restore(self.vector, self.previous.read());
            self.previous.write(HandlerRef::NONE);
        }
        self.installed.store(false, Ordering::Release);
        Ok(())
    }

    /// Hands the current interrupt to the saved handler.
    pub fn delegate<T: VectorTable + ?Sized>(&self, table: &T) {
        table.chain(self.vector, self.previous());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comirq_hal::InterruptFlag;
    use comirq_hal::sim::{CountingHandler, SimEvent, SimPlatform, leak};

    const VECTOR: InterruptVector = InterruptVector::new(0x0C);

    #[test]
    fn install_then_restore_is_a_no_op_on_the_table() {
        let sim = SimPlatform::new(0x3F8);
        let firmware = leak(CountingHandler::new());
        let ours = leak(CountingHandler::new());
        sim.set_handler(VECTOR, HandlerRef::new(firmware));

        let binding = InterruptVectorBinding::new(VECTOR);
        sim.disable();
        unsafe { binding.capture_and_install(&sim, ours) }.unwrap();
        assert!(binding.is_installed());
        assert_eq!(binding.previous(), HandlerRef::new(firmware));
        assert!(sim.handler(VECTOR).refers_to(ours));

        unsafe { binding.restore(&sim) }.unwrap();
        sim.enable();
        assert!(!binding.is_installed());
        assert_eq!(sim.handler(VECTOR), HandlerRef::new(firmware));
        assert_eq!(
            sim.events(),
            [
                SimEvent::InterruptsDisabled,
                SimEvent::VectorSaved(VECTOR),
                SimEvent::VectorInstalled(VECTOR),
                SimEvent::VectorRestored(VECTOR),
                SimEvent::InterruptsEnabled,
            ]
        );
    }

    #[test]
    fn double_install_is_rejected() {
        let sim = SimPlatform::new(0x3F8);
        let ours = leak(CountingHandler::new());
        let binding = InterruptVectorBinding::new(VECTOR);
        sim.disable();
        unsafe { binding.capture_and_install(&sim, ours) }.unwrap();
        assert_eq!(
            unsafe { binding.capture_and_install(&sim, ours) },
            Err(DriverError::InvalidState)
        );
        // The saved handler was not overwritten with our own.
        assert!(binding.previous().is_none());
    }

    #[test]
    fn restore_without_install_is_rejected() {
        let sim = SimPlatform::new(0x3F8);
        let binding = InterruptVectorBinding::new(VECTOR);
        sim.disable();
        assert_eq!(unsafe { binding.restore(&sim) }, Err(DriverError::InvalidState));
    }

    #[test]
    fn delegate_invokes_previous_handler() {
        let sim = SimPlatform::new(0x3F8);
        let firmware = leak(CountingHandler::new());
        let ours = leak(CountingHandler::new());
        sim.set_handler(VECTOR, HandlerRef::new(firmware));

        let binding = InterruptVectorBinding::new(VECTOR);
        sim.disable();
        unsafe { binding.capture_and_install(&sim, ours) }.unwrap();
        sim.enable();

        binding.delegate(&sim);
        assert_eq!(firmware.calls(), 1);
        assert_eq!(firmware.last_vector(), VECTOR);
        assert_eq!(ours.calls(), 0);
    }

    #[test]
    fn delegate_to_empty_slot_acknowledges_controller() {
        let sim = SimPlatform::new(0x3F8);
        let binding = InterruptVectorBinding::new(VECTOR);
        binding.delegate(&sim);
        assert_eq!(sim.eoi_counts(), (1, 0));
    }
}
