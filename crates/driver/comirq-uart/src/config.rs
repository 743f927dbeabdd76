//! Driver configuration: port, interrupt routing, baud rate and FIFO policy.
//!
//! Everything is validated when the configuration is built, so the driver's
//! initialization sequence itself never fails on a bad value.

use core::fmt;

use comirq_core::id::{InterruptVector, IrqLine};

use crate::uart16550::Fcr;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors from building a [`UartConfig`] or a [`Divisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The eight-register window starting at this base runs past port `0xFFFF`.
    InvalidBase(u16),
    /// The interrupt line is outside `0..=15`.
    InvalidIrqLine(u8),
    /// The baud rate cannot be derived exactly from the 1.8432 MHz clock.
    UnsupportedBaud(u32),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBase(base) => {
                write!(f, "base port {base:#06x} leaves no room for 8 registers")
            }
            Self::InvalidIrqLine(line) => write!(f, "IRQ line {line} out of range 0-15"),
            Self::UnsupportedBaud(baud) => write!(f, "unsupported baud rate {baud}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Baud rate
// ---------------------------------------------------------------------------

/// Standard baud rates.
///
/// The discriminant is the divisor for the 1.8432 MHz reference clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BaudRate {
    /// 115200 baud (divisor = 1).
    Baud115200 = 1,
    /// 57600 baud (divisor = 2).
    Baud57600 = 2,
    /// 38400 baud (divisor = 3).
    Baud38400 = 3,
    /// 19200 baud (divisor = 6).
    Baud19200 = 6,
    /// 9600 baud (divisor = 12).
    Baud9600 = 12,
    /// 4800 baud (divisor = 24).
    Baud4800 = 24,
    /// 2400 baud (divisor = 48).
    Baud2400 = 48,
    /// 1200 baud (divisor = 96).
    Baud1200 = 96,
}

impl BaudRate {
    /// Returns the divisor for this rate.
    #[inline]
    #[must_use]
    pub const fn divisor(self) -> Divisor {
        Divisor(self as u16)
    }

    /// Returns the rate in bits per second.
    #[must_use]
    pub const fn bits_per_second(self) -> u32 {
        Divisor::MAX_BAUD / self as u32
    }
}

/// A baud-rate divisor latch value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divisor(u16);

impl Divisor {
    /// UART reference clock in Hz.
    pub const REFERENCE_CLOCK: u32 = 1_843_200;

    /// Fastest rate the reference clock supports (divisor 1).
    pub const MAX_BAUD: u32 = Self::REFERENCE_CLOCK / 16;

    /// Computes `REFERENCE_CLOCK / (baud * 16)`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnsupportedBaud`] for zero, for rates above
    /// [`MAX_BAUD`](Self::MAX_BAUD), and for rates the clock does not divide
    /// exactly.
    pub fn from_baud(baud: u32) -> Result<Self, ConfigError> {
        if baud == 0 || baud > Self::MAX_BAUD || Self::MAX_BAUD % baud != 0 {
            return Err(ConfigError::UnsupportedBaud(baud));
        }
        u16::try_from(Self::MAX_BAUD / baud)
            .map(Self)
            .map_err(|_| ConfigError::UnsupportedBaud(baud))
    }

    /// Returns the raw divisor.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Divisor latch low byte (DLL).
    #[must_use]
    pub const fn low(self) -> u8 {
        self.0.to_le_bytes()[0]
    }

    /// Divisor latch high byte (DLM).
    #[must_use]
    pub const fn high(self) -> u8 {
        self.0.to_le_bytes()[1]
    }

    /// Returns the baud rate this divisor yields.
    #[must_use]
    pub const fn baud(self) -> u32 {
        Self::MAX_BAUD / self.0 as u32
    }
}

impl fmt::Display for Divisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} baud)", self.0, self.baud())
    }
}

// ---------------------------------------------------------------------------
// FIFO and overflow policy
// ---------------------------------------------------------------------------

/// Receive FIFO fill level that raises received-data-available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FifoTrigger {
    /// 1 byte.
    Bytes1,
    /// 4 bytes.
    Bytes4,
    /// 8 bytes.
    Bytes8,
    /// 14 bytes.
    #[default]
    Bytes14,
}

impl FifoTrigger {
    /// Returns the trigger-level bits of the FIFO control register.
    #[must_use]
    pub const fn fcr(self) -> Fcr {
        match self {
            Self::Bytes1 => Fcr::TRIGGER_1,
            Self::Bytes4 => Fcr::TRIGGER_4,
            Self::Bytes8 => Fcr::TRIGGER_8,
            Self::Bytes14 => Fcr::TRIGGER_14,
        }
    }
}

/// What the interrupt handler does once the receive ring is full.
///
/// Either way the newest byte is dropped, the overflow flag is raised and the
/// interrupt controller is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Keep draining the device, discarding every byte that does not fit.
    #[default]
    Discard,
    /// Stop draining at the first rejected byte; later bytes stay in the
    /// device FIFO until the next interrupt.
    LeaveInFifo,
}

// ---------------------------------------------------------------------------
// UartConfig
// ---------------------------------------------------------------------------

const COM1_LINE: IrqLine = match IrqLine::new(4) {
    Some(line) => line,
    None => unreachable!(),
};

/// Complete driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartConfig {
    base: u16,
    line: IrqLine,
    vector: InterruptVector,
    divisor: Divisor,
    trigger: FifoTrigger,
    overflow: OverflowPolicy,
}

impl UartConfig {
    /// COM1 on a BIOS-configured PC: base `0x3F8`, IRQ 4 at vector `0x0C`,
    /// 9600 baud 8N1, 14-byte trigger, [`OverflowPolicy::Discard`].
    pub const COM1: Self = Self {
        base: 0x3F8,
        line: COM1_LINE,
        vector: InterruptVector::new(0x0C),
        divisor: BaudRate::Baud9600.divisor(),
        trigger: FifoTrigger::Bytes14,
        overflow: OverflowPolicy::Discard,
    };

    /// Highest base port that still addresses all eight registers.
    pub const MAX_BASE: u16 = u16::MAX - 7;

    /// Creates a configuration with [`COM1`](Self::COM1)'s line settings.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidBase`] if `base + 7` does not fit in a port number.
    /// - [`ConfigError::InvalidIrqLine`] if `line` is not in `0..=15`.
    pub const fn new(base: u16, line: u8, vector: u8) -> Result<Self, ConfigError> {
        if base > Self::MAX_BASE {
            return Err(ConfigError::InvalidBase(base));
        }
        let Some(line) = IrqLine::new(line) else {
            return Err(ConfigError::InvalidIrqLine(line));
        };
        Ok(Self {
            base,
            line,
            vector: InterruptVector::new(vector),
            ..Self::COM1
        })
    }

    /// Selects a standard baud rate.
    #[must_use]
    pub const fn with_baud(self, baud: BaudRate) -> Self {
        self.with_divisor(baud.divisor())
    }

    /// Selects an explicit divisor.
    #[must_use]
    pub const fn with_divisor(mut self, divisor: Divisor) -> Self {
        self.divisor = divisor;
        self
    }

    /// Selects the receive FIFO trigger level.
    #[must_use]
    pub const fn with_trigger(mut self, trigger: FifoTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Selects the ring-full policy.
    #[must_use]
    pub const fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Base I/O port.
    #[must_use]
    pub const fn base(&self) -> u16 {
        self.base
    }

    /// Interrupt-controller line.
    #[must_use]
    pub const fn line(&self) -> IrqLine {
        self.line
    }

    /// Dispatch-table slot the line is delivered through.
    #[must_use]
    pub const fn vector(&self) -> InterruptVector {
        self.vector
    }

    /// Baud divisor.
    #[must_use]
    pub const fn divisor(&self) -> Divisor {
        self.divisor
    }

    /// Receive FIFO trigger level.
    #[must_use]
    pub const fn trigger(&self) -> FifoTrigger {
        self.trigger
    }

    /// Ring-full policy.
    #[must_use]
    pub const fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }
}

impl Default for UartConfig {
    fn default() -> Self {
        Self::COM1
    }
}
