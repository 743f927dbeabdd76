//! Bare-metal x86_64 platform: real port instructions, `cli`/`sti` and a
//! static dispatch table.
//!
//! The OS's IDT entry stub for each legacy-PIC vector is expected to call
//! [`X86Platform::dispatch`] with its vector number.

mod dispatch;
pub mod instructions;
pub mod port;

use comirq_core::id::InterruptVector;

use crate::interrupts::{HandlerRef, InterruptFlag, InterruptService, VectorTable};
use crate::pic::{Pic8259, PicLayout};
use crate::port::PortIo;

/// The real platform.
#[derive(Debug)]
pub struct X86Platform {
    layout: PicLayout,
}

impl X86Platform {
    /// Creates the platform handle.
    ///
    /// # Safety
    ///
    /// Only one `X86Platform` may exist. The caller vouches that the PICs are
    /// delivering lines at the vectors described by `layout`, and that the
    /// ports drivers touch through this handle are not used elsewhere.
    #[must_use]
    pub const unsafe fn new(layout: PicLayout) -> Self {
        Self { layout }
    }

    /// Returns the PIC vector mapping this platform was created with.
    #[must_use]
    pub const fn layout(&self) -> PicLayout {
        self.layout
    }

    /// Entry point for the IDT stub of `vector`.
    ///
    /// Calls the handler registered in that slot. An empty slot belonging to
    /// a PIC line is acknowledged here so the controller does not stall.
    pub fn dispatch(&self, vector: u8) {
        let vector = InterruptVector::new(vector);
        if !dispatch::load(vector).invoke(vector) {
            self.acknowledge_stray(vector);
        }
    }

    fn acknowledge_stray(&self, vector: InterruptVector) {
        if let Some(line) = self.layout.line_for(vector) {
            Pic8259::new(self).end_of_interrupt(line);
        }
    }
}

impl PortIo for X86Platform {
    #[inline]
    fn read_u8(&self, port: u16) -> u8 {
        // SAFETY: Construction of `X86Platform` vouched for port ownership.
        unsafe { port::inb(port) }
    }

    #[inline]
    fn write_u8(&self, port: u16, value: u8) {
        // SAFETY: Construction of `X86Platform` vouched for port ownership.
        unsafe { port::outb(port, value) }
    }
}

impl InterruptFlag for X86Platform {
    #[inline]
    fn disable(&self) {
        instructions::cli();
    }

    #[inline]
    fn enable(&self) {
        // SAFETY: Every slot is either empty (acknowledged by `dispatch`) or
        // holds an installed handler.
        unsafe { instructions::sti() }
    }
}

impl VectorTable for X86Platform {
    fn save_current(&self, vector: InterruptVector) -> HandlerRef {
        dispatch::load(vector)
    }

    unsafe fn install(&self, vector: InterruptVector, handler: &'static dyn InterruptService) {
        // SAFETY: The caller has disabled interrupts.
        unsafe { dispatch::install(vector, handler) }
    }

    unsafe fn restore(&self, vector: InterruptVector, previous: HandlerRef) {
        // SAFETY: The caller has disabled interrupts.
        unsafe { dispatch::store(vector, previous) }
    }

    fn chain(&self, vector: InterruptVector, previous: HandlerRef) {
        if !previous.invoke(vector) {
            self.acknowledge_stray(vector);
        }
    }
}
