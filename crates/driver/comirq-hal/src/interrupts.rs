//! Interrupt capabilities: the global interrupt flag and the dispatch table.
//!
//! A driver installs itself into a dispatch-table slot as a
//! `&'static dyn InterruptService`. The platform's entry stub for that slot
//! recovers the reference and calls [`InterruptService::service`], so the
//! driver's state lives in one owned instance rather than in module-level
//! globals.
//!
//! Shared interrupt lines use chain-of-responsibility: before installing, a
//! driver saves the slot's current [`HandlerRef`], and delegates to it through
//! [`VectorTable::chain`] whenever an interrupt is not its own.

use core::fmt;

use comirq_core::id::InterruptVector;

// ---------------------------------------------------------------------------
// InterruptFlag
// ---------------------------------------------------------------------------

/// Global interrupt delivery control (e.g. `cli`/`sti`).
pub trait InterruptFlag {
    /// Stops delivery of maskable interrupts to this core.
    fn disable(&self);

    /// Resumes delivery of maskable interrupts to this core.
    fn enable(&self);
}

impl<T: InterruptFlag + ?Sized> InterruptFlag for &T {
    #[inline]
    fn disable(&self) {
        (**self).disable();
    }

    #[inline]
    fn enable(&self) {
        (**self).enable();
    }
}

// ---------------------------------------------------------------------------
// InterruptService / HandlerRef
// ---------------------------------------------------------------------------

/// An interrupt handler that can be installed in a dispatch-table slot.
///
/// `service` runs in interrupt context: it may preempt mainline code at any
/// point, must not block, and must not take locks the mainline may hold.
pub trait InterruptService: Sync {
    /// Handles one interrupt delivered through `vector`.
    fn service(&self, vector: InterruptVector);
}

/// A reference to the handler occupying a dispatch-table slot, if any.
///
/// Equality compares handler addresses, so two distinct zero-sized handlers
/// may compare equal.
#[derive(Clone, Copy)]
pub struct HandlerRef(Option<&'static dyn InterruptService>);

impl HandlerRef {
    /// An empty slot.
    pub const NONE: Self = Self(None);

    /// Wraps an installed handler.
    #[must_use]
    pub const fn new(handler: &'static dyn InterruptService) -> Self {
        Self(Some(handler))
    }

    /// Returns `true` if the slot held no handler.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Returns `true` if this refers to `handler`.
    #[must_use]
    pub fn refers_to(&self, handler: &dyn InterruptService) -> bool {
        self.0
            .is_some_and(|h| core::ptr::addr_eq(h, handler))
    }

    /// Calls the referenced handler for `vector`.
    ///
    /// Returns `false` without doing anything if the slot was empty.
    pub fn invoke(&self, vector: InterruptVector) -> bool {
        match self.0 {
            Some(handler) => {
                handler.service(vector);
                true
            }
            None => false,
        }
    }
}

impl PartialEq for HandlerRef {
    fn eq(&self, other: &Self) -> bool {
        match (self.0, other.0) {
            (Some(a), Some(b)) => core::ptr::addr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for HandlerRef {}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(handler) => write!(
                f,
                "HandlerRef({:p})",
                core::ptr::from_ref(handler).cast::<()>()
            ),
            None => f.write_str("HandlerRef(none)"),
        }
    }
}

// ---------------------------------------------------------------------------
// VectorTable
// ---------------------------------------------------------------------------

/// Capability over the platform's interrupt dispatch table.
///
/// Mutating methods are `unsafe`: a slot must never change while its handler
/// could be running, so callers disable global interrupt delivery (via
/// [`InterruptFlag`]) around them.
pub trait VectorTable {
    /// Returns the handler currently installed in `vector`.
    fn save_current(&self, vector: InterruptVector) -> HandlerRef;

    /// Installs `handler` into `vector`.
    ///
    /// # Safety
    ///
    /// Global interrupt delivery must be disabled for the duration of the call.
    unsafe fn install(&self, vector: InterruptVector, handler: &'static dyn InterruptService);

    /// Puts a previously saved handler back into `vector`.
    ///
    /// # Safety
    ///
    /// Global interrupt delivery must be disabled for the duration of the call.
    unsafe fn restore(&self, vector: InterruptVector, previous: HandlerRef);

    /// Delegates the interrupt on `vector` to `previous`.
    ///
    /// The delegate is solely responsible for acknowledging the interrupt
    /// controller. If `previous` is empty, the platform acknowledges the
    /// interrupt itself.
    fn chain(&self, vector: InterruptVector, previous: HandlerRef);
}

impl<T: VectorTable + ?Sized> VectorTable for &T {
    #[inline]
    fn save_current(&self, vector: InterruptVector) -> HandlerRef {
        (**self).save_current(vector)
    }

    #[inline]
    unsafe fn install(&self, vector: InterruptVector, handler: &'static dyn InterruptService) {
        // SAFETY: Forwarded; the caller upholds the same contract.
        unsafe { (**self).install(vector, handler) }
    }

    #[inline]
    unsafe fn restore(&self, vector: InterruptVector, previous: HandlerRef) {
        // SAFETY: Forwarded; the caller upholds the same contract.
        unsafe { (**self).restore(vector, previous) }
    }

    #[inline]
    fn chain(&self, vector: InterruptVector, previous: HandlerRef) {
        (**self).chain(vector, previous);
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// Everything an interrupt-driven port driver needs from the platform.
pub trait Platform: super::PortIo + InterruptFlag + VectorTable + Sync {}

impl<T: super::PortIo + InterruptFlag + VectorTable + Sync + ?Sized> Platform for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

    struct Recorder {
        calls: AtomicUsize,
        last: AtomicU8,
    }

    impl InterruptService for Recorder {
        fn service(&self, vector: InterruptVector) {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.last.store(vector.as_u8(), Ordering::Relaxed);
        }
    }

    static FIRST: Recorder = Recorder {
        calls: AtomicUsize::new(0),
        last: AtomicU8::new(0),
    };
    static SECOND: Recorder = Recorder {
        calls: AtomicUsize::new(0),
        last: AtomicU8::new(0),
    };

    #[test]
    fn empty_ref_does_not_invoke() {
        assert!(HandlerRef::NONE.is_none());
        assert!(!HandlerRef::NONE.invoke(InterruptVector::new(0x0C)));
    }

    #[test]
    fn invoke_reaches_handler() {
        let handler = HandlerRef::new(&FIRST);
        assert!(handler.invoke(InterruptVector::new(0x0C)));
        assert!(FIRST.calls.load(Ordering::Relaxed) >= 1);
        assert_eq!(FIRST.last.load(Ordering::Relaxed), 0x0C);
    }

    #[test]
    fn equality_is_by_address() {
        assert_eq!(HandlerRef::new(&FIRST), HandlerRef::new(&FIRST));
        assert_ne!(HandlerRef::new(&FIRST), HandlerRef::new(&SECOND));
        assert_ne!(HandlerRef::new(&FIRST), HandlerRef::NONE);
        assert_eq!(HandlerRef::NONE, HandlerRef::NONE);
        assert!(HandlerRef::new(&SECOND).refers_to(&SECOND));
        assert!(!HandlerRef::NONE.refers_to(&SECOND));
    }
}
