//! Byte-wide port I/O capability.
//!
//! The legacy serial port and the 8259 interrupt controllers are both
//! programmed through 8-bit I/O ports. [`PortIo`] is the seam between driver
//! logic and the instructions (or simulation) that reach those ports.

/// Byte-wide access to the I/O port space.
///
/// Methods are safe: constructing a real implementation is the unsafe step,
/// at which point the caller vouches for exclusive ownership of the ports the
/// driver will touch.
pub trait PortIo {
    /// Reads one byte from `port`.
    fn read_u8(&self, port: u16) -> u8;

    /// Writes one byte to `port`.
    fn write_u8(&self, port: u16, value: u8);
}

impl<T: PortIo + ?Sized> PortIo for &T {
    #[inline]
    fn read_u8(&self, port: u16) -> u8 {
        (**self).read_u8(port)
    }

    #[inline]
    fn write_u8(&self, port: u16, value: u8) {
        (**self).write_u8(port, value);
    }
}

/// A single I/O port bound to a [`PortIo`] backend.
pub struct IoPort<'a, P: PortIo + ?Sized> {
    io: &'a P,
    port: u16,
}

impl<'a, P: PortIo + ?Sized> IoPort<'a, P> {
    /// Creates a new port handle. Does **not** perform any I/O.
    #[inline]
    pub const fn new(io: &'a P, port: u16) -> Self {
        Self { io, port }
    }

    /// Returns the port number.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Reads a byte from this port.
    #[inline]
    #[must_use]
    pub fn read(&self) -> u8 {
        self.io.read_u8(self.port)
    }

    /// Writes a byte to this port.
    #[inline]
    pub fn write(&self, value: u8) {
        self.io.write_u8(self.port, value);
    }
}
