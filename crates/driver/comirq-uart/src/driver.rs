//! The interrupt-driven UART driver.
//!
//! One [`UartDriver`] owns the receive ring and the vector binding. It is
//! installed into the dispatch table as its own `&'static dyn
//! InterruptService`, so the interrupt entry point reaches this exact
//! instance without any module-level state.
//!
//! # Contexts
//!
//! - Interrupt context runs [`InterruptService::service`]: it is the only
//!   producer into the ring.
//! - Mainline context calls everything else: it is the only consumer.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use comirq_core::id::InterruptVector;
use comirq_core::sync::RingBuffer;
use comirq_hal::pic::Pic8259;
use comirq_hal::{InterruptService, Platform};
use log::{debug, info, warn};

use crate::binding::InterruptVectorBinding;
use crate::config::{OverflowPolicy, UartConfig};
use crate::error::DriverError;
use crate::uart16550::{Lcr, Lsr, Mcr, Uart16550};

// ---------------------------------------------------------------------------
// DriverState
// ---------------------------------------------------------------------------

/// Lifecycle of a [`UartDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriverState {
    /// Constructed, never initialized.
    Uninitialized = 0,
    /// `init` or `probe` is in progress.
    Starting = 1,
    /// Installed and receiving.
    Running = 2,
    /// `shutdown` is in progress.
    Stopping = 3,
    /// Shut down; may be initialized again.
    ShutDown = 4,
}

impl DriverState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::ShutDown,
        }
    }
}

// ---------------------------------------------------------------------------
// UartDriver
// ---------------------------------------------------------------------------

/// Interrupt-driven receive, polled transmit driver for one 16550.
///
/// `N` is the receive ring's storage size; it holds `N - 1` bytes.
pub struct UartDriver<P: Platform, const N: usize = 256> {
    platform: P,
    config: UartConfig,
    rx: RingBuffer<N>,
    binding: InterruptVectorBinding,
    state: AtomicU8,
}

impl<P: Platform, const N: usize> UartDriver<P, N> {
    /// Creates an uninitialized driver. Does **not** touch hardware.
    #[must_use]
    pub const fn new(platform: P, config: UartConfig) -> Self {
        Self {
            platform,
            config,
            rx: RingBuffer::new(),
            binding: InterruptVectorBinding::new(config.vector()),
            state: AtomicU8::new(DriverState::Uninitialized as u8),
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DriverState {
        DriverState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns the configuration the driver was built with.
    #[must_use]
    pub const fn config(&self) -> &UartConfig {
        &self.config
    }

    /// Number of bytes the receive ring can hold.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.rx.capacity()
    }

    #[inline]
    fn uart(&self) -> Uart16550<'_, P> {
        Uart16550::new(&self.platform, self.config.base())
    }

    /// Moves from any state in `from` to `to`, returning the state left.
    fn transition(
        &self,
        from: &[DriverState],
        to: DriverState,
    ) -> Result<DriverState, DriverError> {
        let current = self.state();
        if !from.contains(&current) {
            return Err(DriverError::InvalidState);
        }
        self.state
            .compare_exchange(current as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| current)
            .map_err(|_| DriverError::InvalidState)
    }

    fn set_state(&self, state: DriverState) {
        self.state.store(state as u8, Ordering::Release);
    }

    // -- Receive -----------------------------------------------------------

    /// Takes the oldest received byte, if any.
    pub fn read_nonblocking(&self) -> Option<u8> {
        self.rx.pop()
    }

    /// Takes up to `buf.len()` received bytes; returns how many were copied.
    pub fn read_into(&self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        for slot in buf.iter_mut() {
            let Some(byte) = self.rx.pop() else { break };
            *slot = byte;
            n += 1;
        }
        n
    }

    /// Number of received bytes waiting to be read.
    #[must_use]
    pub fn buffered_count(&self) -> usize {
        self.rx.available()
    }

    /// Returns `true` if bytes were dropped since the last call, and clears
    /// the indication.
    pub fn take_overflow(&self) -> bool {
        let dropped = self.rx.take_overflow();
        if dropped {
            warn!(
                "uart16550 {:#x}: receive ring full, bytes dropped",
                self.config.base()
            );
        }
        dropped
    }

    // -- Transmit ----------------------------------------------------------

    /// Sends one byte, busy-waiting until the transmitter accepts it.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] unless the driver is running.
    pub fn write(&self, byte: u8) -> Result<(), DriverError> {
        self.ensure_running()?;
        self.uart().write_byte(byte);
        Ok(())
    }

    /// Sends every byte of `bytes` in order.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] unless the driver is running.
    pub fn write_bytes(&self, bytes: &[u8]) -> Result<(), DriverError> {
        self.ensure_running()?;
        let uart = self.uart();
        for &byte in bytes {
            uart.write_byte(byte);
        }
        Ok(())
    }

    /// Sends `s`, expanding each `\n` to `\r\n`.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] unless the driver is running.
    pub fn write_str(&self, s: &str) -> Result<(), DriverError> {
        self.ensure_running()?;
        let uart = self.uart();
        for byte in s.bytes() {
            if byte == b'\n' {
                uart.write_byte(b'\r');
            }
            uart.write_byte(byte);
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), DriverError> {
        if self.state() == DriverState::Running {
            Ok(())
        } else {
            Err(DriverError::InvalidState)
        }
    }

    // -- Presence ----------------------------------------------------------

    /// Checks for a 16550 at the configured base with a loopback round trip.
    ///
    /// [`init`](Self::init) does not probe; call this first to catch a
    /// missing device.
    ///
    /// # Errors
    ///
    /// - [`DriverError::InvalidState`] while the driver is running.
    /// - [`DriverError::DeviceNotFound`] if the probe byte did not come back.
    pub fn probe(&self) -> Result<(), DriverError> {
        let previous = self.transition(
            &[DriverState::Uninitialized, DriverState::ShutDown],
            DriverState::Starting,
        )?;
        let present = self.uart().loopback_test();
        self.set_state(previous);

        if present {
            debug!("uart16550 {:#x}: loopback probe passed", self.config.base());
            Ok(())
        } else {
            debug!("uart16550 {:#x}: no device answered", self.config.base());
            Err(DriverError::DeviceNotFound)
        }
    }
}

impl<P: Platform + 'static, const N: usize> UartDriver<P, N> {
    /// Takes over the configured vector and starts receiving.
    ///
    /// Runs with global interrupts disabled:
    ///
    /// 1. Disable every device interrupt source.
    /// 2. Save the vector's current handler and install this driver.
    /// 3. Program the divisor, then 8N1 framing.
    /// 4. Enable and flush the FIFOs.
    /// 5. Raise DTR, RTS and OUT2.
    /// 6. Enable the received-data-available interrupt.
    /// 7. Unmask the line at the PIC.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] unless the driver is uninitialized or
    /// shut down.
    pub fn init(&'static self) -> Result<(), DriverError> {
        let previous = self.transition(
            &[DriverState::Uninitialized, DriverState::ShutDown],
            DriverState::Starting,
        )?;
        let uart = self.uart();
        let cfg = &self.config;

        self.platform.disable();
        uart.disable_interrupts();

        self.rx.clear();
        // SAFETY: Interrupts are disabled.
        if let Err(err) = unsafe { self.binding.capture_and_install(&self.platform, self) } {
            self.platform.enable();
            self.set_state(previous);
            return Err(err);
        }

        uart.set_divisor(cfg.divisor(), Lcr::EIGHT_N_ONE);
        uart.configure_fifo(cfg.trigger());
        uart.set_modem_control(Mcr::INTERRUPT_DRIVEN);
        uart.enable_rx_interrupt();
        Pic8259::new(&self.platform).unmask(cfg.line());

        self.set_state(DriverState::Running);
        self.platform.enable();

        info!(
            "uart16550 {:#x}: {} on vector {}, divisor {}",
            cfg.base(),
            cfg.line(),
            cfg.vector(),
            cfg.divisor()
        );
        Ok(())
    }

    /// Stops receiving and hands the vector back to its previous handler.
    ///
    /// Bytes still in the receive ring are discarded.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] unless the driver is running.
    pub fn shutdown(&self) -> Result<(), DriverError> {
        self.transition(&[DriverState::Running], DriverState::Stopping)?;

        self.platform.disable();
        self.uart().disable_interrupts();
        // SAFETY: Interrupts are disabled.
        let restored = unsafe { self.binding.restore(&self.platform) };
        self.platform.enable();

        if let Err(err) = restored {
            self.set_state(DriverState::Running);
            return Err(err);
        }

        self.rx.clear();
        self.set_state(DriverState::ShutDown);
        info!("uart16550 {:#x}: shut down", self.config.base());
        Ok(())
    }
}

impl<P: Platform, const N: usize> InterruptService for UartDriver<P, N> {
    fn service(&self, _vector: InterruptVector) {
        let uart = self.uart();

        if !uart.interrupt_id().is_received_data() {
            self.binding.delegate(&self.platform);
            return;
        }

        while uart.line_status().contains(Lsr::DATA_READY) {
            let byte = uart.read_data();
            if !self.rx.push(byte) && self.config.overflow() == OverflowPolicy::LeaveInFifo {
                break;
            }
        }

        Pic8259::new(&self.platform).end_of_interrupt(self.config.line());
    }
}

impl<P: Platform, const N: usize> fmt::Write for &UartDriver<P, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        UartDriver::write_str(*self, s).map_err(|_| fmt::Error)
    }
}

impl<P: Platform, const N: usize> fmt::Debug for UartDriver<P, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UartDriver")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("rx", &self.rx)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comirq_hal::sim::{SimPlatform, leak};

    type SimDriver = UartDriver<&'static SimPlatform, 8>;

    fn driver(config: UartConfig) -> (&'static SimPlatform, &'static SimDriver) {
        let sim = leak(SimPlatform::new(config.base()));
        (sim, leak(UartDriver::new(sim, config)))
    }

    #[test]
    fn state_encoding_roundtrips() {
        for state in [
            DriverState::Uninitialized,
            DriverState::Starting,
            DriverState::Running,
            DriverState::Stopping,
            DriverState::ShutDown,
        ] {
            assert_eq!(DriverState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn new_driver_is_idle() {
        let (sim, drv) = driver(UartConfig::COM1);
        assert_eq!(drv.state(), DriverState::Uninitialized);
        assert_eq!(drv.capacity(), 7);
        assert_eq!(drv.buffered_count(), 0);
        assert_eq!(drv.read_nonblocking(), None);
        assert!(sim.events().is_empty());
    }

    #[test]
    fn init_moves_to_running_and_back() {
        let (_, drv) = driver(UartConfig::COM1);
        drv.init().unwrap();
        assert_eq!(drv.state(), DriverState::Running);
        assert_eq!(drv.init(), Err(DriverError::InvalidState));
        drv.shutdown().unwrap();
        assert_eq!(drv.state(), DriverState::ShutDown);
        assert_eq!(drv.shutdown(), Err(DriverError::InvalidState));
    }

    #[test]
    fn write_requires_running() {
        let (sim, drv) = driver(UartConfig::COM1);
        assert_eq!(drv.write(b'x'), Err(DriverError::InvalidState));
        assert_eq!(drv.write_str("x"), Err(DriverError::InvalidState));
        assert!(sim.transmitted().is_empty());
    }

    #[test]
    fn fmt_write_expands_newlines() {
        use core::fmt::Write as _;

        let (sim, drv) = driver(UartConfig::COM1);
        drv.init().unwrap();
        let mut out = drv;
        writeln!(out, "rx={}", 3).unwrap();
        assert_eq!(sim.transmitted(), b"rx=3\r\n");
    }

    #[test]
    fn debug_shows_state() {
        let (_, drv) = driver(UartConfig::COM1);
        let text = format!("{drv:?}");
        assert!(text.contains("Uninitialized"), "{text}");
    }
}
