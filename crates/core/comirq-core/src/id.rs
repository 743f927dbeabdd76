//! Type-safe identifiers for interrupt resources.
//!
//! These newtypes prevent accidental mixing of interrupt-controller lines and
//! dispatch-table slots at compile time. On the legacy PC the two differ: the
//! serial port on IRQ 4 is dispatched through vector `0x0C`.

use core::fmt;

/// Interrupt-controller request line (IRQ 0-15).
///
/// Lines 0-7 belong to the master 8259, lines 8-15 to the slave cascaded on
/// master line 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct IrqLine(u8);

impl IrqLine {
    /// Number of lines on a cascaded 8259 pair.
    pub const COUNT: u8 = 16;

    /// The master line the slave controller is cascaded on.
    pub const CASCADE: Self = Self(2);

    /// Creates a new `IrqLine`, or `None` if `line` is not in `0..=15`.
    #[must_use]
    pub const fn new(line: u8) -> Option<Self> {
        if line < Self::COUNT {
            Some(Self(line))
        } else {
            None
        }
    }

    /// Returns the raw line number.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Returns `true` if this line is routed through the slave controller.
    #[must_use]
    pub const fn is_slave(self) -> bool {
        self.0 >= 8
    }

    /// Returns the bit for this line in its controller's mask register.
    #[must_use]
    pub const fn mask_bit(self) -> u8 {
        1 << (self.0 & 0x07)
    }
}

impl fmt::Display for IrqLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IRQ{}", self.0)
    }
}

/// Interrupt dispatch-table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct InterruptVector(u8);

impl InterruptVector {
    /// Creates a new `InterruptVector`.
    #[must_use]
    pub const fn new(val: u8) -> Self {
        Self(val)
    }

    /// Returns the raw `u8` value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Returns the value as `usize` (convenience for table indexing).
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InterruptVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irq_line_range() {
        assert_eq!(IrqLine::new(0).map(IrqLine::as_u8), Some(0));
        assert_eq!(IrqLine::new(15).map(IrqLine::as_u8), Some(15));
        assert_eq!(IrqLine::new(16), None);
    }

    #[test]
    fn irq_line_controller_split() {
        let com1 = IrqLine::new(4).unwrap();
        assert!(!com1.is_slave());
        assert_eq!(com1.mask_bit(), 0x10);

        let rtc = IrqLine::new(8).unwrap();
        assert!(rtc.is_slave());
        assert_eq!(rtc.mask_bit(), 0x01);
    }

    #[test]
    fn display_formats() {
        assert_eq!(format!("{}", IrqLine::new(4).unwrap()), "IRQ4");
        assert_eq!(format!("{}", InterruptVector::new(0x0C)), "0x0c");
    }

    #[test]
    fn vector_roundtrip() {
        let v = InterruptVector::new(0x24);
        assert_eq!(v.as_u8(), 0x24);
        assert_eq!(v.as_usize(), 0x24);
    }
}
