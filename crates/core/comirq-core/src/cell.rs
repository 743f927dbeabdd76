//! A minimal `UnsafeCell` wrapper that opts into `Send + Sync`.
//!
//! Used for state whose synchronization is provided by the interrupt flag
//! rather than by the type system: values written by mainline code while
//! global interrupt delivery is disabled and read afterwards from interrupt
//! context on the same core.

use core::cell::UnsafeCell;

/// An `UnsafeCell` wrapper that implements `Send` and `Sync`.
///
/// # Safety
///
/// The caller must ensure all accesses are properly synchronised. This type
/// exists for cases where the compiler cannot prove safety but the programmer
/// can (e.g., data written with interrupts disabled before the handler that
/// reads it is installed).
#[repr(transparent)]
pub struct RacyCell<T>(UnsafeCell<T>);

// SAFETY: The user of `RacyCell` is responsible for ensuring proper
// synchronisation. `T: Send` is required because the data may move between
// execution contexts.
unsafe impl<T: Send> Send for RacyCell<T> {}
// SAFETY: Same as above; the user guarantees no data races.
unsafe impl<T: Sync> Sync for RacyCell<T> {}

impl<T> RacyCell<T> {
    /// Creates a new `RacyCell` wrapping `value`.
    #[inline]
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Returns a raw pointer to the underlying data.
    #[inline]
    pub const fn get(&self) -> *mut T {
        self.0.get()
    }
}

impl<T: Copy> RacyCell<T> {
    /// Reads the current value with a volatile load.
    ///
    /// # Safety
    ///
    /// No write to this cell may be in progress in another execution context.
    #[inline]
    pub unsafe fn read(&self) -> T {
        // SAFETY: The caller guarantees no concurrent writer.
        unsafe { core::ptr::read_volatile(self.get()) }
    }

    /// Replaces the current value with a volatile store.
    ///
    /// # Safety
    ///
    /// No other access to this cell may be in progress in another execution
    /// context (typically guaranteed by disabling interrupts on a single core).
    #[inline]
    pub unsafe fn write(&self, value: T) {
        // SAFETY: The caller guarantees exclusive access.
        unsafe { core::ptr::write_volatile(self.get(), value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let cell = RacyCell::new(1u8);
        unsafe { cell.write(7) };
        assert_eq!(unsafe { cell.read() }, 7);
    }
}
