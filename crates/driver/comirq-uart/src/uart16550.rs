//! 16550 UART register map.
//!
//! Named access to the device registers behind a base I/O port. Every method
//! is a single unconditional register access (or a short fixed sequence of
//! them); sequencing across registers is the driver's job.

use bitflags::bitflags;
use comirq_core::static_assert;
use comirq_hal::{IoPort, PortIo};

use crate::config::{Divisor, FifoTrigger};

// ---------------------------------------------------------------------------
// Register offsets
// ---------------------------------------------------------------------------

/// Register offsets from the UART base port.
mod reg {
    /// Receive buffer (read) / transmit holding (write), DLAB=0.
    pub const DATA: u16 = 0;
    /// Divisor latch low byte, DLAB=1.
    pub const DLL: u16 = 0;
    /// Interrupt enable, DLAB=0.
    pub const IER: u16 = 1;
    /// Divisor latch high byte, DLAB=1.
    pub const DLM: u16 = 1;
    /// Interrupt identification (read).
    pub const IIR: u16 = 2;
    /// FIFO control (write).
    pub const FCR: u16 = 2;
    pub const LCR: u16 = 3;
    pub const MCR: u16 = 4;
    pub const LSR: u16 = 5;
}

// ---------------------------------------------------------------------------
// Bitflag types
// ---------------------------------------------------------------------------

bitflags! {
    /// Interrupt Enable Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ier: u8 {
        /// Received data available.
        const DATA_AVAILABLE = 1 << 0;
        /// Transmit holding register empty.
        const THR_EMPTY      = 1 << 1;
        /// Receiver line status.
        const LINE_STATUS    = 1 << 2;
        /// Modem status.
        const MODEM_STATUS   = 1 << 3;
    }
}

bitflags! {
    /// FIFO Control Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Fcr: u8 {
        /// Enable both FIFOs.
        const ENABLE     = 1 << 0;
        /// Flush the receive FIFO.
        const CLEAR_RX   = 1 << 1;
        /// Flush the transmit FIFO.
        const CLEAR_TX   = 1 << 2;
        /// Receive trigger level: 1 byte.
        const TRIGGER_1  = 0b00 << 6;
        /// Receive trigger level: 4 bytes.
        const TRIGGER_4  = 0b01 << 6;
        /// Receive trigger level: 8 bytes.
        const TRIGGER_8  = 0b10 << 6;
        /// Receive trigger level: 14 bytes.
        const TRIGGER_14 = 0b11 << 6;
    }
}

bitflags! {
    /// Line Control Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Lcr: u8 {
        /// Word length bit 0.
        const WORD_LEN_0    = 1 << 0;
        /// Word length bit 1.
        const WORD_LEN_1    = 1 << 1;
        /// Two stop bits.
        const STOP_BIT      = 1 << 2;
        /// Parity enable.
        const PARITY_ENABLE = 1 << 3;
        /// Divisor Latch Access Bit: offsets 0 and 1 expose the divisor.
        const DLAB          = 1 << 7;

        /// 8 data bits, no parity, 1 stop bit.
        const EIGHT_N_ONE = Self::WORD_LEN_0.bits() | Self::WORD_LEN_1.bits();
    }
}

bitflags! {
    /// Modem Control Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mcr: u8 {
        /// Data Terminal Ready.
        const DTR      = 1 << 0;
        /// Request To Send.
        const RTS      = 1 << 1;
        /// Auxiliary output 1.
        const OUT1     = 1 << 2;
        /// Auxiliary output 2: gates the IRQ line on PC-compatible boards.
        const OUT2     = 1 << 3;
        /// Internal loopback.
        const LOOPBACK = 1 << 4;

        /// Normal operation with the IRQ line driven.
        const INTERRUPT_DRIVEN = Self::DTR.bits() | Self::RTS.bits() | Self::OUT2.bits();
    }
}

bitflags! {
    /// Line Status Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Lsr: u8 {
        /// At least one byte waits in the receive buffer.
        const DATA_READY        = 1 << 0;
        /// Overrun error.
        const OVERRUN_ERROR     = 1 << 1;
        /// Parity error.
        const PARITY_ERROR      = 1 << 2;
        /// Framing error.
        const FRAMING_ERROR     = 1 << 3;
        /// Break indicator.
        const BREAK_INDICATOR   = 1 << 4;
        /// Transmit holding register empty.
        const THR_EMPTY         = 1 << 5;
        /// Holding and shift registers both empty.
        const TRANSMITTER_EMPTY = 1 << 6;
        /// Error somewhere in the receive FIFO.
        const FIFO_ERROR        = 1 << 7;
    }
}

static_assert!(Lcr::EIGHT_N_ONE.bits() == 0x03);
static_assert!(Lcr::DLAB.bits() == 0x80);
static_assert!(
    (Fcr::ENABLE.bits() | Fcr::CLEAR_RX.bits() | Fcr::CLEAR_TX.bits() | Fcr::TRIGGER_14.bits())
        == 0xC7
);
static_assert!(Mcr::INTERRUPT_DRIVEN.bits() == 0x0B);
static_assert!(Ier::DATA_AVAILABLE.bits() == 0x01);
static_assert!(Lsr::DATA_READY.bits() == 0x01);
static_assert!(Lsr::THR_EMPTY.bits() == 0x20);

// ---------------------------------------------------------------------------
// Interrupt identification
// ---------------------------------------------------------------------------

/// Source of a pending UART interrupt, highest priority last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptCause {
    /// Modem status changed.
    ModemStatus,
    /// Transmit holding register emptied.
    TransmitterEmpty,
    /// Received data reached the trigger level, or a character timeout.
    ReceivedData,
    /// Overrun, parity, framing error or break.
    LineStatus,
}

/// A decoded Interrupt Identification Register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptId(u8);

impl InterruptId {
    const NOT_PENDING: u8 = 0x01;
    const CAUSE_MASK: u8 = 0x06;
    const RECEIVED_DATA: u8 = 0x04;

    /// Wraps a raw IIR value.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw IIR value.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if the device has an interrupt pending (bit 0 clear).
    #[must_use]
    pub const fn is_pending(self) -> bool {
        self.0 & Self::NOT_PENDING == 0
    }

    /// Returns the pending cause, or `None` if nothing is pending.
    #[must_use]
    pub const fn cause(self) -> Option<InterruptCause> {
        if !self.is_pending() {
            return None;
        }
        Some(match self.0 & Self::CAUSE_MASK {
            0x00 => InterruptCause::ModemStatus,
            0x02 => InterruptCause::TransmitterEmpty,
            Self::RECEIVED_DATA => InterruptCause::ReceivedData,
            _ => InterruptCause::LineStatus,
        })
    }

    /// Returns `true` only for a pending received-data interrupt.
    #[must_use]
    pub const fn is_received_data(self) -> bool {
        self.is_pending() && self.0 & Self::CAUSE_MASK == Self::RECEIVED_DATA
    }
}

// ---------------------------------------------------------------------------
// Uart16550
// ---------------------------------------------------------------------------

/// A 16550 behind `base`, reached through a [`PortIo`] backend.
///
/// Carries no state beyond the port address; the hardware keeps its
/// configuration between handles.
pub struct Uart16550<'a, P: PortIo + ?Sized> {
    io: &'a P,
    base: u16,
}

impl<'a, P: PortIo + ?Sized> Uart16550<'a, P> {
    /// Loopback probe pattern.
    const PROBE_BYTE: u8 = 0xAE;

    /// Depth of the 16550 receive FIFO.
    pub const FIFO_DEPTH: usize = 16;

    /// Creates a handle. Does **not** touch hardware.
    #[must_use]
    pub const fn new(io: &'a P, base: u16) -> Self {
        Self { io, base }
    }

    /// Returns the base port.
    #[must_use]
    pub const fn base(&self) -> u16 {
        self.base
    }

    #[inline]
    const fn port(&self, offset: u16) -> IoPort<'a, P> {
        IoPort::new(self.io, self.base + offset)
    }

    /// Clears the interrupt enable register.
    pub fn disable_interrupts(&self) {
        self.port(reg::IER).write(Ier::empty().bits());
    }

    /// Enables only the received-data-available interrupt.
    pub fn enable_rx_interrupt(&self) {
        self.port(reg::IER).write(Ier::DATA_AVAILABLE.bits());
    }

    /// Programs the baud divisor, then selects `framing`.
    ///
    /// Writing `framing` (which must not contain [`Lcr::DLAB`]) leaves
    /// divisor-latch mode.
    pub fn set_divisor(&self, divisor: Divisor, framing: Lcr) {
        let lcr = self.port(reg::LCR);
        lcr.write(Lcr::DLAB.bits());
        self.port(reg::DLL).write(divisor.low());
        self.port(reg::DLM).write(divisor.high());
        lcr.write((framing - Lcr::DLAB).bits());
    }

    /// Enables and flushes both FIFOs with the given receive trigger level.
    pub fn configure_fifo(&self, trigger: FifoTrigger) {
        let fcr = Fcr::ENABLE | Fcr::CLEAR_RX | Fcr::CLEAR_TX | trigger.fcr();
        self.port(reg::FCR).write(fcr.bits());
    }

    /// Writes the modem control register.
    pub fn set_modem_control(&self, mcr: Mcr) {
        self.port(reg::MCR).write(mcr.bits());
    }

    /// Reads the interrupt identification register.
    #[must_use]
    pub fn interrupt_id(&self) -> InterruptId {
        InterruptId::from_bits(self.port(reg::IIR).read())
    }

    /// Reads the line status register.
    #[must_use]
    pub fn line_status(&self) -> Lsr {
        Lsr::from_bits_retain(self.port(reg::LSR).read())
    }

    /// Reads the receive buffer register.
    #[must_use]
    pub fn read_data(&self) -> u8 {
        self.port(reg::DATA).read()
    }

    /// Writes the transmit holding register without waiting.
    pub fn write_data(&self, byte: u8) {
        self.port(reg::DATA).write(byte);
    }

    /// Writes a byte, busy-waiting until the transmit holding register is
    /// empty.
    pub fn write_byte(&self, byte: u8) {
        while !self.line_status().contains(Lsr::THR_EMPTY) {
            core::hint::spin_loop();
        }
        self.write_data(byte);
    }

    /// Discards whatever the receiver holds, reading at most one FIFO's worth.
    ///
    /// Bounded so that an absent device, whose LSR floats high, cannot hang
    /// the caller. Returns the number of bytes read.
    pub fn drain_rx(&self) -> usize {
        let mut drained = 0;
        while drained < Self::FIFO_DEPTH && self.line_status().contains(Lsr::DATA_READY) {
            let _ = self.read_data();
            drained += 1;
        }
        drained
    }

    /// Sends a byte through internal loopback and checks that it comes back.
    ///
    /// Stale received bytes are drained first. The modem control register is
    /// restored afterwards. Returns `false` if nothing answering like a 16550
    /// sits at the base port.
    #[must_use]
    pub fn loopback_test(&self) -> bool {
        let mcr = self.port(reg::MCR);
        let saved = mcr.read();

        self.drain_rx();

        mcr.write((Mcr::from_bits_retain(saved) | Mcr::LOOPBACK).bits());
        self.write_data(Self::PROBE_BYTE);
        let echoed = self.line_status().contains(Lsr::DATA_READY)
            && self.read_data() == Self::PROBE_BYTE;

        mcr.write(saved);
        echoed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comirq_hal::sim::SimPlatform;

    #[test]
    fn not_pending_is_never_received_data() {
        let id = InterruptId::from_bits(0x01);
        assert!(!id.is_pending());
        assert_eq!(id.cause(), None);
        assert!(!id.is_received_data());

        // Bit 0 set wins over a received-data cause field.
        assert!(!InterruptId::from_bits(0x05).is_received_data());
    }

    #[test]
    fn cause_decoding() {
        let cases = [
            (0x00, InterruptCause::ModemStatus),
            (0x02, InterruptCause::TransmitterEmpty),
            (0x04, InterruptCause::ReceivedData),
            (0x06, InterruptCause::LineStatus),
            (0x0C, InterruptCause::ReceivedData),
            (0xC4, InterruptCause::ReceivedData),
        ];
        for (bits, cause) in cases {
            assert_eq!(InterruptId::from_bits(bits).cause(), Some(cause), "{bits:#04x}");
        }
    }

    #[test]
    fn fifo_enabled_bits_do_not_hide_received_data() {
        assert!(InterruptId::from_bits(0xC4).is_received_data());
        assert!(InterruptId::from_bits(0xCC).is_received_data());
        assert!(!InterruptId::from_bits(0xC2).is_received_data());
    }

    #[test]
    fn register_presets_are_bit_exact() {
        assert_eq!(Mcr::INTERRUPT_DRIVEN, Mcr::DTR | Mcr::RTS | Mcr::OUT2);
        assert_eq!(
            (Fcr::ENABLE | Fcr::CLEAR_RX | Fcr::CLEAR_TX | Fcr::TRIGGER_14).bits(),
            0xC7
        );
    }

    #[test]
    fn drain_rx_stops_after_one_fifo() {
        let sim = SimPlatform::new(0x3F8);
        sim.inject_rx(&[0x55; 20]);
        let uart = Uart16550::new(&sim, 0x3F8);
        assert_eq!(uart.drain_rx(), Uart16550::<SimPlatform>::FIFO_DEPTH);
        assert_eq!(sim.rx_pending(), 4);
        assert_eq!(uart.drain_rx(), 4);
        assert_eq!(uart.drain_rx(), 0);
    }

    #[test]
    fn drain_rx_terminates_without_a_device() {
        let sim = SimPlatform::without_uart(0x3F8);
        let uart = Uart16550::new(&sim, 0x3F8);
        assert_eq!(uart.drain_rx(), Uart16550::<SimPlatform>::FIFO_DEPTH);
        assert!(!uart.loopback_test());
    }

    #[test]
    fn loopback_ignores_stale_received_bytes() {
        let sim = SimPlatform::new(0x3F8);
        sim.inject_rx(b"q");
        let uart = Uart16550::new(&sim, 0x3F8);
        assert!(uart.loopback_test());
        assert_eq!(sim.rx_pending(), 0);
        assert_eq!(sim.mcr(), 0);
    }
}
