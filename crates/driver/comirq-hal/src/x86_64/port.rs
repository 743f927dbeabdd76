//! Raw byte-wide port instructions.

/// Reads a byte from `port` (`in al, dx`).
///
/// # Safety
///
/// The caller must ensure `port` is a valid I/O port that is safe to read.
#[inline]
pub unsafe fn inb(port: u16) -> u8 {
    let val: u8;
    // SAFETY: The caller guarantees the port is valid to read.
    unsafe {
        core::arch::asm!(
            "in al, dx",
            in("dx") port,
            out("al") val,
            options(nomem, nostack, preserves_flags),
        );
    }
    val
}

/// Writes a byte to `port` (`out dx, al`).
///
/// # Safety
///
/// The caller must ensure `port` is a valid I/O port that is safe to write.
#[inline]
pub unsafe fn outb(port: u16, value: u8) {
    // SAFETY: The caller guarantees the port is valid to write.
    unsafe {
        core::arch::asm!(
            "out dx, al",
            in("dx") port,
            in("al") value,
            options(nomem, nostack, preserves_flags),
        );
    }
}
