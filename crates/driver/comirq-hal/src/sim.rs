//! Host-side simulated platform.
//!
//! [`SimPlatform`] stands in for a legacy PC: one 16550 behind an arbitrary
//! base port, a cascaded 8259 pair, the global interrupt flag and a dispatch
//! table. Every port write, interrupt-flag change and vector-table operation
//! is appended to an ordered trace of [`SimEvent`]s so tests can assert on
//! the exact programming sequence a driver performs.
//!
//! Each instance owns all of its state, so tests can run in parallel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use comirq_core::id::InterruptVector;

use crate::interrupts::{HandlerRef, InterruptFlag, InterruptService, VectorTable};
use crate::pic::{EOI, PicLayout};
use crate::port::PortIo;

const PIC1_CMD: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_CMD: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

const LCR_DLAB: u8 = 0x80;
const MCR_LOOPBACK: u8 = 0x10;
const FCR_ENABLE: u8 = 0x01;
const FCR_CLEAR_RX: u8 = 0x02;
const IER_DATA_AVAILABLE: u8 = 0x01;
const IIR_NONE: u8 = 0x01;
const IIR_RX_DATA: u8 = 0x04;
const IIR_FIFO_ENABLED: u8 = 0xC0;
const LSR_DATA_READY: u8 = 0x01;
const LSR_TX_IDLE: u8 = 0x60;

/// One observable action performed against the simulated platform.
///
/// Port reads are not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// A byte was written to an I/O port.
    PortWrite {
        /// Port number.
        port: u16,
        /// Value written.
        value: u8,
    },
    /// Global interrupt delivery was turned off.
    InterruptsDisabled,
    /// Global interrupt delivery was turned on.
    InterruptsEnabled,
    /// A dispatch-table slot was read via `save_current`.
    VectorSaved(InterruptVector),
    /// A handler was installed into a slot.
    VectorInstalled(InterruptVector),
    /// A saved handler was put back into a slot.
    VectorRestored(InterruptVector),
    /// A handler delegated to the previous occupant of a slot.
    Chained(InterruptVector),
    /// An interrupt reached a slot (or a chain) with no handler.
    Unhandled(InterruptVector),
}

// ---------------------------------------------------------------------------
// Device models
// ---------------------------------------------------------------------------

struct SimUart {
    base: u16,
    present: bool,
    ier: u8,
    lcr: u8,
    mcr: u8,
    fcr: u8,
    dll: u8,
    dlm: u8,
    scratch: u8,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    tx_busy_polls: usize,
    scripted_iir: VecDeque<u8>,
}

impl SimUart {
    fn new(base: u16, present: bool) -> Self {
        Self {
            base,
            present,
            ier: 0,
            lcr: 0,
            mcr: 0,
            fcr: 0,
            dll: 0,
            dlm: 0,
            scratch: 0,
            rx: VecDeque::new(),
            tx: Vec::new(),
            tx_busy_polls: 0,
            scripted_iir: VecDeque::new(),
        }
    }

    fn offset(&self, port: u16) -> Option<u16> {
        port.checked_sub(self.base).filter(|off| *off < 8)
    }

    fn dlab(&self) -> bool {
        self.lcr & LCR_DLAB != 0
    }

    fn fifo_enabled(&self) -> bool {
        self.fcr & FCR_ENABLE != 0
    }

    fn read(&mut self, offset: u16) -> u8 {
        if !self.present {
            return 0xFF;
        }
        match offset {
            0 if self.dlab() => self.dll,
            0 => self.rx.pop_front().unwrap_or(0),
            1 if self.dlab() => self.dlm,
            1 => self.ier,
            2 => {
                let fifo = if self.fifo_enabled() { IIR_FIFO_ENABLED } else { 0 };
                let id = self.scripted_iir.pop_front().unwrap_or_else(|| {
                    if self.ier & IER_DATA_AVAILABLE != 0 && !self.rx.is_empty() {
                        IIR_RX_DATA
                    } else {
                        IIR_NONE
                    }
                });
                id | fifo
            }
            3 => self.lcr,
            4 => self.mcr,
            5 => {
                let mut lsr = 0;
                if !self.rx.is_empty() {
                    lsr |= LSR_DATA_READY;
                }
                if self.tx_busy_polls > 0 {
                    self.tx_busy_polls -= 1;
                } else {
                    lsr |= LSR_TX_IDLE;
                }
                lsr
            }
            7 => self.scratch,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u16, value: u8) {
        if !self.present {
            return;
        }
        match offset {
            0 if self.dlab() => self.dll = value,
            0 if self.mcr & MCR_LOOPBACK != 0 => self.rx.push_back(value),
            0 => self.tx.push(value),
            1 if self.dlab() => self.dlm = value,
            1 => self.ier = value & 0x0F,
            2 => {
                self.fcr = value;
                if value & FCR_CLEAR_RX != 0 {
                    self.rx.clear();
                }
            }
            3 => self.lcr = value,
            4 => self.mcr = value,
            7 => self.scratch = value,
            _ => {}
        }
    }
}

struct SimPic {
    master_mask: u8,
    slave_mask: u8,
    master_eoi: usize,
    slave_eoi: usize,
}

struct SimState {
    uart: SimUart,
    pic: SimPic,
    layout: PicLayout,
    interrupts_enabled: bool,
    handlers: [HandlerRef; 256],
    events: Vec<SimEvent>,
}

impl SimState {
    fn read_port(&mut self, port: u16) -> u8 {
        if let Some(offset) = self.uart.offset(port) {
            return self.uart.read(offset);
        }
        match port {
            PIC1_DATA => self.pic.master_mask,
            PIC2_DATA => self.pic.slave_mask,
            PIC1_CMD | PIC2_CMD => 0,
            _ => 0xFF,
        }
    }

    fn write_port(&mut self, port: u16, value: u8) {
        self.events.push(SimEvent::PortWrite { port, value });
        if let Some(offset) = self.uart.offset(port) {
            self.uart.write(offset, value);
            return;
        }
        match port {
            PIC1_DATA => self.pic.master_mask = value,
            PIC2_DATA => self.pic.slave_mask = value,
            PIC1_CMD if value == EOI => self.pic.master_eoi += 1,
            PIC2_CMD if value == EOI => self.pic.slave_eoi += 1,
            _ => {}
        }
    }

    /// Acknowledges `vector` at the PIC the way the x86 platform does for an
    /// unclaimed interrupt.
    fn acknowledge_stray(&mut self, vector: InterruptVector) {
        self.events.push(SimEvent::Unhandled(vector));
        if let Some(line) = self.layout.line_for(vector) {
            if line.is_slave() {
                self.write_port(PIC2_CMD, EOI);
            }
            self.write_port(PIC1_CMD, EOI);
        }
    }
}

// ---------------------------------------------------------------------------
// SimPlatform
// ---------------------------------------------------------------------------

/// A simulated legacy PC implementing [`Platform`](crate::Platform).
pub struct SimPlatform {
    state: Mutex<SimState>,
}

impl SimPlatform {
    /// Creates a platform with a working 16550 at `base`.
    ///
    /// Both PIC lines start fully masked, interrupts start enabled and every
    /// dispatch slot is empty.
    #[must_use]
    pub fn new(base: u16) -> Self {
        Self::build(SimUart::new(base, true))
    }

    /// Creates a platform with nothing decoding the ports at `base`: every
    /// read returns `0xFF` and writes are ignored.
    #[must_use]
    pub fn without_uart(base: u16) -> Self {
        Self::build(SimUart::new(base, false))
    }

    fn build(uart: SimUart) -> Self {
        Self {
            state: Mutex::new(SimState {
                uart,
                pic: SimPic {
                    master_mask: 0xFF,
                    slave_mask: 0xFF,
                    master_eoi: 0,
                    slave_eoi: 0,
                },
                layout: PicLayout::LEGACY_PC,
                interrupts_enabled: true,
                handlers: [HandlerRef::NONE; 256],
                events: Vec::new(),
            }),
        }
    }

    /// Sets the initial `(master, slave)` PIC mask registers.
    #[must_use]
    pub fn with_pic_masks(self, master: u8, slave: u8) -> Self {
        {
            let mut state = self.lock();
            state.pic.master_mask = master;
            state.pic.slave_mask = slave;
        }
        self
    }

    /// Sets the PIC vector mapping used to acknowledge unclaimed interrupts.
    #[must_use]
    pub fn with_layout(self, layout: PicLayout) -> Self {
        self.lock().layout = layout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Device stimulus ---------------------------------------------------

    /// Queues `bytes` in the receive FIFO as if they arrived on the wire.
    pub fn inject_rx(&self, bytes: &[u8]) {
        self.lock().uart.rx.extend(bytes.iter().copied());
    }

    /// Makes the next IIR reads return `values` (FIFO bits are still added)
    /// before falling back to the computed identification.
    pub fn script_iir(&self, values: &[u8]) {
        self.lock().uart.scripted_iir.extend(values.iter().copied());
    }

    /// Makes the next `polls` LSR reads report the transmitter busy.
    pub fn set_tx_busy_polls(&self, polls: usize) {
        self.lock().uart.tx_busy_polls = polls;
    }

    // -- Device observation ------------------------------------------------

    /// Returns every byte written to the transmit holding register.
    #[must_use]
    pub fn transmitted(&self) -> Vec<u8> {
        self.lock().uart.tx.clone()
    }

    /// Returns the number of bytes still waiting in the receive FIFO.
    #[must_use]
    pub fn rx_pending(&self) -> usize {
        self.lock().uart.rx.len()
    }

    /// Returns the interrupt enable register.
    #[must_use]
    pub fn ier(&self) -> u8 {
        self.lock().uart.ier
    }

    /// Returns the line control register.
    #[must_use]
    pub fn lcr(&self) -> u8 {
        self.lock().uart.lcr
    }

    /// Returns the modem control register.
    #[must_use]
    pub fn mcr(&self) -> u8 {
        self.lock().uart.mcr
    }

    /// Returns the last value written to the FIFO control register.
    #[must_use]
    pub fn fcr(&self) -> u8 {
        self.lock().uart.fcr
    }

    /// Returns the programmed baud divisor.
    #[must_use]
    pub fn divisor(&self) -> u16 {
        let state = self.lock();
        u16::from_le_bytes([state.uart.dll, state.uart.dlm])
    }

    /// Returns the `(master, slave)` PIC mask registers.
    #[must_use]
    pub fn pic_masks(&self) -> (u8, u8) {
        let state = self.lock();
        (state.pic.master_mask, state.pic.slave_mask)
    }

    /// Returns the number of EOIs received by the `(master, slave)` PICs.
    #[must_use]
    pub fn eoi_counts(&self) -> (usize, usize) {
        let state = self.lock();
        (state.pic.master_eoi, state.pic.slave_eoi)
    }

    /// Returns whether global interrupt delivery is on.
    #[must_use]
    pub fn interrupts_enabled(&self) -> bool {
        self.lock().interrupts_enabled
    }

    // -- Trace -------------------------------------------------------------

    /// Returns the event trace so far.
    #[must_use]
    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().events.clone()
    }

    /// Returns only the `(port, value)` writes from the trace.
    #[must_use]
    pub fn port_writes(&self) -> Vec<(u16, u8)> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match *event {
                SimEvent::PortWrite { port, value } => Some((port, value)),
                _ => None,
            })
            .collect()
    }

    /// Empties the event trace.
    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    // -- Dispatch table ----------------------------------------------------

    /// Returns the handler in `vector` without recording an event.
    #[must_use]
    pub fn handler(&self, vector: InterruptVector) -> HandlerRef {
        self.lock().handlers[vector.as_usize()]
    }

    /// Places `handler` in `vector` without recording an event, as if
    /// firmware or an earlier driver had installed it.
    pub fn set_handler(&self, vector: InterruptVector, handler: HandlerRef) {
        self.lock().handlers[vector.as_usize()] = handler;
    }

    /// Delivers an interrupt through `vector` as the CPU would.
    ///
    /// Returns `true` if a handler ran. An empty slot is acknowledged at the
    /// PIC and recorded as [`SimEvent::Unhandled`].
    pub fn fire(&self, vector: InterruptVector) -> bool {
        let handler = self.lock().handlers[vector.as_usize()];
        // The lock is released before the handler runs: it re-enters the
        // platform for port I/O.
        if handler.invoke(vector) {
            true
        } else {
            self.lock().acknowledge_stray(vector);
            false
        }
    }
}

impl PortIo for SimPlatform {
    fn read_u8(&self, port: u16) -> u8 {
        self.lock().read_port(port)
    }

    fn write_u8(&self, port: u16, value: u8) {
        self.lock().write_port(port, value);
    }
}

impl InterruptFlag for SimPlatform {
    fn disable(&self) {
        let mut state = self.lock();
        state.interrupts_enabled = false;
        state.events.push(SimEvent::InterruptsDisabled);
    }

    fn enable(&self) {
        let mut state = self.lock();
        state.interrupts_enabled = true;
        state.events.push(SimEvent::InterruptsEnabled);
    }
}

impl VectorTable for SimPlatform {
    fn save_current(&self, vector: InterruptVector) -> HandlerRef {
        let mut state = self.lock();
        state.events.push(SimEvent::VectorSaved(vector));
        state.handlers[vector.as_usize()]
    }

    unsafe fn install(&self, vector: InterruptVector, handler: &'static dyn InterruptService) {
        let mut state = self.lock();
        assert!(
            !state.interrupts_enabled,
            "vector {vector} installed with interrupts enabled"
        );
        state.handlers[vector.as_usize()] = HandlerRef::new(handler);
        state.events.push(SimEvent::VectorInstalled(vector));
    }

    unsafe fn restore(&self, vector: InterruptVector, previous: HandlerRef) {
        let mut state = self.lock();
        assert!(
            !state.interrupts_enabled,
            "vector {vector} restored with interrupts enabled"
        );
        state.handlers[vector.as_usize()] = previous;
        state.events.push(SimEvent::VectorRestored(vector));
    }

    fn chain(&self, vector: InterruptVector, previous: HandlerRef) {
        self.lock().events.push(SimEvent::Chained(vector));
        if !previous.invoke(vector) {
            self.lock().acknowledge_stray(vector);
        }
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// A handler that only counts how often it ran.
#[derive(Debug, Default)]
pub struct CountingHandler {
    calls: AtomicUsize,
    last_vector: AtomicU8,
}

impl CountingHandler {
    /// Creates a handler that has not run yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            last_vector: AtomicU8::new(0),
        }
    }

    /// Returns how many times [`InterruptService::service`] ran.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    /// Returns the vector of the most recent call.
    #[must_use]
    pub fn last_vector(&self) -> InterruptVector {
        InterruptVector::new(self.last_vector.load(Ordering::Acquire))
    }
}

impl InterruptService for CountingHandler {
    fn service(&self, vector: InterruptVector) {
        self.last_vector.store(vector.as_u8(), Ordering::Release);
        self.calls.fetch_add(1, Ordering::AcqRel);
    }
}

/// Leaks `value` to obtain the `'static` reference drivers install.
#[must_use]
pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COM1: u16 = 0x3F8;

    #[test]
    fn divisor_latch_shadows_data_and_ier() {
        let sim = SimPlatform::new(COM1);
        sim.write_u8(COM1 + 3, LCR_DLAB);
        sim.write_u8(COM1, 12);
        sim.write_u8(COM1 + 1, 0);
        sim.write_u8(COM1 + 3, 0x03);
        assert_eq!(sim.divisor(), 12);
        assert_eq!(sim.ier(), 0);
        assert_eq!(sim.lcr(), 0x03);
    }

    #[test]
    fn iir_reflects_pending_rx_when_enabled() {
        let sim = SimPlatform::new(COM1);
        sim.inject_rx(b"a");
        assert_eq!(sim.read_u8(COM1 + 2), IIR_NONE);
        sim.write_u8(COM1 + 1, IER_DATA_AVAILABLE);
        assert_eq!(sim.read_u8(COM1 + 2), IIR_RX_DATA);
        sim.write_u8(COM1 + 2, 0xC7);
        assert_eq!(sim.read_u8(COM1 + 2), IIR_NONE | IIR_FIFO_ENABLED);
    }

    #[test]
    fn scripted_iir_takes_precedence() {
        let sim = SimPlatform::new(COM1);
        sim.script_iir(&[0x02]);
        assert_eq!(sim.read_u8(COM1 + 2), 0x02);
        assert_eq!(sim.read_u8(COM1 + 2), IIR_NONE);
    }

    #[test]
    fn lsr_reports_busy_polls_then_idle() {
        let sim = SimPlatform::new(COM1);
        sim.set_tx_busy_polls(2);
        assert_eq!(sim.read_u8(COM1 + 5) & LSR_TX_IDLE, 0);
        assert_eq!(sim.read_u8(COM1 + 5) & LSR_TX_IDLE, 0);
        assert_eq!(sim.read_u8(COM1 + 5) & LSR_TX_IDLE, LSR_TX_IDLE);
    }

    #[test]
    fn loopback_routes_transmit_into_receive() {
        let sim = SimPlatform::new(COM1);
        sim.write_u8(COM1 + 4, MCR_LOOPBACK);
        sim.write_u8(COM1, 0xAE);
        assert!(sim.transmitted().is_empty());
        assert_eq!(sim.read_u8(COM1 + 5) & LSR_DATA_READY, LSR_DATA_READY);
        assert_eq!(sim.read_u8(COM1), 0xAE);
    }

    #[test]
    fn absent_device_floats_high() {
        let sim = SimPlatform::without_uart(COM1);
        sim.write_u8(COM1 + 7, 0x55);
        assert_eq!(sim.read_u8(COM1 + 7), 0xFF);
        assert_eq!(sim.read_u8(COM1 + 5), 0xFF);
    }

    #[test]
    fn pic_counts_eoi_and_tracks_masks() {
        let sim = SimPlatform::new(COM1).with_pic_masks(0xB8, 0x8F);
        sim.write_u8(PIC1_DATA, 0xA8);
        sim.write_u8(PIC1_CMD, EOI);
        assert_eq!(sim.pic_masks(), (0xA8, 0x8F));
        assert_eq!(sim.eoi_counts(), (1, 0));
        assert_eq!(sim.port_writes(), [(PIC1_DATA, 0xA8), (PIC1_CMD, EOI)]);
    }

    #[test]
    fn fire_on_empty_slot_acknowledges_pic() {
        let sim = SimPlatform::new(COM1);
        assert!(!sim.fire(InterruptVector::new(0x0C)));
        assert_eq!(sim.eoi_counts(), (1, 0));
        assert_eq!(
            sim.events(),
            [
                SimEvent::Unhandled(InterruptVector::new(0x0C)),
                SimEvent::PortWrite {
                    port: PIC1_CMD,
                    value: EOI
                },
            ]
        );
    }

    #[test]
    fn fire_reaches_installed_handler() {
        let sim = SimPlatform::new(COM1);
        let handler = leak(CountingHandler::new());
        let vector = InterruptVector::new(0x0C);
        sim.disable();
        unsafe { sim.install(vector, handler) };
        sim.enable();
        assert!(sim.fire(vector));
        assert_eq!(handler.calls(), 1);
        assert_eq!(handler.last_vector(), vector);
        assert_eq!(sim.eoi_counts(), (0, 0));
    }

    #[test]
    #[should_panic(expected = "interrupts enabled")]
    fn install_requires_interrupts_disabled() {
        let sim = SimPlatform::new(COM1);
        let handler = leak(CountingHandler::new());
        unsafe { sim.install(InterruptVector::new(0x0C), handler) };
    }

    #[test]
    fn chain_to_previous_handler() {
        let sim = SimPlatform::new(COM1);
        let previous = leak(CountingHandler::new());
        let vector = InterruptVector::new(0x0C);
        sim.chain(vector, HandlerRef::new(previous));
        assert_eq!(previous.calls(), 1);
        assert_eq!(sim.events(), [SimEvent::Chained(vector)]);
    }
}
