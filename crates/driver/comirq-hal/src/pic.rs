//! 8259 PIC (Programmable Interrupt Controller) register access.
//!
//! Provides just enough functionality for a device driver sharing the
//! controller with the rest of the platform: unmasking and masking a single
//! line without disturbing the others, and acknowledging a serviced interrupt
//! with a non-specific end-of-interrupt.

use comirq_core::id::{InterruptVector, IrqLine};

use crate::port::{IoPort, PortIo};

const PIC1_CMD: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_CMD: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

/// OCW2: non-specific end of interrupt.
pub const EOI: u8 = 0x20;

// ---------------------------------------------------------------------------
// PicLayout
// ---------------------------------------------------------------------------

/// Where the two controllers deliver their lines in the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PicLayout {
    /// Vector of master line 0.
    pub master_base: u8,
    /// Vector of slave line 8.
    pub slave_base: u8,
}

impl PicLayout {
    /// BIOS power-on mapping: IRQ 0-7 at vectors `0x08..=0x0F`, IRQ 8-15 at
    /// `0x70..=0x77`.
    pub const LEGACY_PC: Self = Self {
        master_base: 0x08,
        slave_base: 0x70,
    };

    /// Protected-mode remapping clear of CPU exceptions: vectors 32-47.
    pub const REMAPPED: Self = Self {
        master_base: 0x20,
        slave_base: 0x28,
    };

    /// Returns the dispatch-table slot for `line`.
    #[must_use]
    pub const fn vector_for(self, line: IrqLine) -> InterruptVector {
        let n = line.as_u8();
        if line.is_slave() {
            InterruptVector::new(self.slave_base + (n - 8))
        } else {
            InterruptVector::new(self.master_base + n)
        }
    }

    /// Returns the line delivered through `vector`, if any.
    #[must_use]
    pub const fn line_for(self, vector: InterruptVector) -> Option<IrqLine> {
        let v = vector.as_u8();
        let master = v.wrapping_sub(self.master_base);
        let slave = v.wrapping_sub(self.slave_base);
        if master < 8 {
            IrqLine::new(master)
        } else if slave < 8 {
            IrqLine::new(slave + 8)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Pic8259
// ---------------------------------------------------------------------------

/// A cascaded master/slave 8259 pair behind the standard ports.
pub struct Pic8259<'a, P: PortIo + ?Sized> {
    io: &'a P,
}

impl<'a, P: PortIo + ?Sized> Pic8259<'a, P> {
    /// Creates a controller handle. Does **not** touch hardware.
    pub const fn new(io: &'a P) -> Self {
        Self { io }
    }

    #[inline]
    const fn port(&self, port: u16) -> IoPort<'a, P> {
        IoPort::new(self.io, port)
    }

    /// Returns the mask (data) port of the controller serving `line`.
    #[inline]
    const fn mask_port(&self, line: IrqLine) -> IoPort<'a, P> {
        if line.is_slave() {
            self.port(PIC2_DATA)
        } else {
            self.port(PIC1_DATA)
        }
    }

    /// Unmasks `line`, preserving every other line's mask bit.
    ///
    /// Slave lines also unmask the cascade line on the master.
    pub fn unmask(&self, line: IrqLine) {
        let data = self.mask_port(line);
        data.write(data.read() & !line.mask_bit());

        if line.is_slave() {
            let master = self.port(PIC1_DATA);
            master.write(master.read() & !IrqLine::CASCADE.mask_bit());
        }
    }

    /// Masks `line`, preserving every other line's mask bit.
    pub fn mask(&self, line: IrqLine) {
        let data = self.mask_port(line);
        data.write(data.read() | line.mask_bit());
    }

    /// Returns the current `(master, slave)` mask registers.
    #[must_use]
    pub fn masks(&self) -> (u8, u8) {
        (self.port(PIC1_DATA).read(), self.port(PIC2_DATA).read())
    }

    /// Signals end-of-interrupt for `line`.
    ///
    /// Slave lines are acknowledged at the slave first, then at the master.
    pub fn end_of_interrupt(&self, line: IrqLine) {
        if line.is_slave() {
            self.port(PIC2_CMD).write(EOI);
        }
        self.port(PIC1_CMD).write(EOI);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Port space backed by a map; records every write.
    #[derive(Default)]
    struct FakePorts {
        regs: RefCell<HashMap<u16, u8>>,
        writes: RefCell<Vec<(u16, u8)>>,
    }

    impl FakePorts {
        fn with(regs: &[(u16, u8)]) -> Self {
            let ports = Self::default();
            ports.regs.borrow_mut().extend(regs.iter().copied());
            ports
        }

        fn reg(&self, port: u16) -> u8 {
            self.regs.borrow().get(&port).copied().unwrap_or(0)
        }
    }

    impl PortIo for FakePorts {
        fn read_u8(&self, port: u16) -> u8 {
            self.reg(port)
        }

        fn write_u8(&self, port: u16, value: u8) {
            self.regs.borrow_mut().insert(port, value);
            self.writes.borrow_mut().push((port, value));
        }
    }

    fn line(n: u8) -> IrqLine {
        IrqLine::new(n).unwrap()
    }

    #[test]
    fn unmask_master_line_preserves_other_bits() {
        let ports = FakePorts::with(&[(PIC1_DATA, 0xB8), (PIC2_DATA, 0x8F)]);
        Pic8259::new(&ports).unmask(line(4));
        assert_eq!(ports.reg(PIC1_DATA), 0xA8);
        assert_eq!(ports.reg(PIC2_DATA), 0x8F);
    }

    #[test]
    fn unmask_slave_line_opens_cascade() {
        let ports = FakePorts::with(&[(PIC1_DATA, 0xFF), (PIC2_DATA, 0xFF)]);
        Pic8259::new(&ports).unmask(line(12));
        assert_eq!(ports.reg(PIC2_DATA), 0xEF);
        assert_eq!(ports.reg(PIC1_DATA), 0xFB);
    }

    #[test]
    fn mask_sets_only_line_bit() {
        let ports = FakePorts::with(&[(PIC1_DATA, 0x00)]);
        Pic8259::new(&ports).mask(line(3));
        assert_eq!(ports.reg(PIC1_DATA), 0x08);
    }

    #[test]
    fn eoi_master_line() {
        let ports = FakePorts::default();
        Pic8259::new(&ports).end_of_interrupt(line(4));
        assert_eq!(*ports.writes.borrow(), [(PIC1_CMD, EOI)]);
    }

    #[test]
    fn eoi_slave_line_acknowledges_both() {
        let ports = FakePorts::default();
        Pic8259::new(&ports).end_of_interrupt(line(9));
        assert_eq!(*ports.writes.borrow(), [(PIC2_CMD, EOI), (PIC1_CMD, EOI)]);
    }

    #[test]
    fn masks_reads_both_controllers() {
        let ports = FakePorts::with(&[(PIC1_DATA, 0x12), (PIC2_DATA, 0x34)]);
        assert_eq!(Pic8259::new(&ports).masks(), (0x12, 0x34));
    }

    #[test]
    fn legacy_layout_maps_com1_to_0x0c() {
        let layout = PicLayout::LEGACY_PC;
        assert_eq!(layout.vector_for(line(4)), InterruptVector::new(0x0C));
        assert_eq!(layout.vector_for(line(8)), InterruptVector::new(0x70));
        assert_eq!(layout.line_for(InterruptVector::new(0x0C)), Some(line(4)));
        assert_eq!(layout.line_for(InterruptVector::new(0x77)), Some(line(15)));
        assert_eq!(layout.line_for(InterruptVector::new(0x10)), None);
    }

    #[test]
    fn remapped_layout() {
        let layout = PicLayout::REMAPPED;
        assert_eq!(layout.vector_for(line(4)), InterruptVector::new(36));
        assert_eq!(layout.line_for(InterruptVector::new(47)), Some(line(15)));
    }
}
