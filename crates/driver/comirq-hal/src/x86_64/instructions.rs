//! Interrupt-flag instructions.

/// Disables maskable interrupts (CLI).
#[inline]
pub fn cli() {
    // SAFETY: CLI has no side effects beyond masking maskable interrupts.
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack, preserves_flags));
    }
}

/// Enables maskable interrupts (STI).
///
/// # Safety
///
/// The dispatch table must be able to handle every unmasked line.
#[inline]
pub unsafe fn sti() {
    // SAFETY: The caller guarantees that taking interrupts is safe here.
    unsafe {
        core::arch::asm!("sti", options(nomem, nostack, preserves_flags));
    }
}
