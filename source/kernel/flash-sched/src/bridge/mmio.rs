// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Register-level bridge to the FLASH accelerator
//! OWNERS: @kernel-sched-team
//! PUBLIC API: Mmio, VolatileMmio, RegisterLayout, MmioBridge
//! DEPENDS_ON: flash_wire (words), bridge::IrqLatch (optional reply path)
//! INVARIANTS: change = two writes, low word first; schedule = one write then bounded reply polling
//!
//! Registers are 32 bits wide and addressed by word index. Readiness of the
//! reply register is a per-layout `pending_mask`: a reply word with any of
//! those bits set means the device has not answered yet. A mask of zero takes
//! the first read as the answer, leaving id truncation to the codec.

use core::ptr::{read_volatile, write_volatile, NonNull};

use log::trace;

use super::{DeviceBridge, IrqLatch, Request, Response};
use crate::error::{Error, Result};

/// Default readiness rule: a completed answer never sets the upper half.
pub const REPLY_PENDING_MASK: u32 = 0xFFFF_0000;

/// Value the schedule-request register is written with; the device ignores it.
const SCHED_REQ_WORD: u32 = 0;

/// Minimal 32-bit register accessor.
pub trait Mmio {
    /// Writes a 32-bit value to register `offset`.
    ///
    /// # Safety
    /// `offset` must name a register inside the mapped window.
    unsafe fn write32(&self, offset: usize, value: u32);
    /// Reads a 32-bit value from register `offset`.
    ///
    /// # Safety
    /// `offset` must name a register inside the mapped window.
    unsafe fn read32(&self, offset: usize) -> u32;
}

impl<M: Mmio + ?Sized> Mmio for &M {
    unsafe fn write32(&self, offset: usize, value: u32) {
        // SAFETY: forwarded contract.
        unsafe { (**self).write32(offset, value) }
    }

    unsafe fn read32(&self, offset: usize) -> u32 {
        // SAFETY: forwarded contract.
        unsafe { (**self).read32(offset) }
    }
}

/// Volatile accessor over a mapped register window.
pub struct VolatileMmio {
    base: NonNull<u32>,
    len: usize,
}

// SAFETY: the window is device memory, not Rust-owned data; access is serialized by the client.
unsafe impl Send for VolatileMmio {}
// SAFETY: see `Send`.
unsafe impl Sync for VolatileMmio {}

impl VolatileMmio {
    /// Wraps `len` consecutive 32-bit registers starting at `base`.
    ///
    /// # Safety
    /// `base` must point to a mapping of at least `len` registers that stays
    /// valid for the lifetime of the returned value.
    pub const unsafe fn new(base: NonNull<u32>, len: usize) -> Self {
        Self { base, len }
    }
}

impl Mmio for VolatileMmio {
    unsafe fn write32(&self, offset: usize, value: u32) {
        if offset >= self.len {
            return;
        }
        // SAFETY: `offset` is inside the window checked above.
        unsafe { write_volatile(self.base.as_ptr().add(offset), value) }
    }

    /// Out-of-window reads look like a device that has not answered.
    unsafe fn read32(&self, offset: usize) -> u32 {
        if offset >= self.len {
            return u32::MAX;
        }
        // SAFETY: `offset` is inside the window checked above.
        unsafe { read_volatile(self.base.as_ptr().add(offset)) }
    }
}

/// Register indexes used by a device revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterLayout {
    pub schedule: usize,
    pub change: usize,
    pub reply: usize,
    /// Reply bits meaning "not answered yet"; zero trusts the first read.
    pub pending_mask: u32,
}

impl RegisterLayout {
    /// Layout of the kernel-resident class.
    pub const MATURE: Self = Self { schedule: 0, change: 1, reply: 0, pending_mask: REPLY_PENDING_MASK };
    /// Layout used by the early user-space harness, with the two request registers swapped.
    pub const HARNESS: Self = Self { schedule: 1, change: 0, reply: 0, pending_mask: REPLY_PENDING_MASK };

    /// Same registers with a different readiness rule.
    pub const fn with_pending_mask(mut self, pending_mask: u32) -> Self {
        self.pending_mask = pending_mask;
        self
    }

    /// Number of registers the layout touches.
    pub const fn span(&self) -> usize {
        let mut max = self.schedule;
        if self.change > max {
            max = self.change;
        }
        if self.reply > max {
            max = self.reply;
        }
        max + 1
    }
}

impl Default for RegisterLayout {
    fn default() -> Self {
        Self::MATURE
    }
}

/// [`DeviceBridge`] speaking the register protocol over an [`Mmio`] window.
pub struct MmioBridge<'a, M: Mmio> {
    regs: M,
    layout: RegisterLayout,
    latch: Option<&'a IrqLatch>,
}

impl<'a, M: Mmio> MmioBridge<'a, M> {
    pub fn new(regs: M, layout: RegisterLayout) -> Self {
        Self { regs, layout, latch: None }
    }

    /// Also accept replies delivered through the interrupt line.
    pub fn with_irq_latch(mut self, latch: &'a IrqLatch) -> Self {
        self.latch = Some(latch);
        self
    }

    pub fn layout(&self) -> RegisterLayout {
        self.layout
    }

    pub fn registers(&self) -> &M {
        &self.regs
    }

    fn write_change(&self, low: u32, high: u32) {
        trace!(target: "flash::mmio", "change words low={:#010x} high={:#010x}", low, high);
        // SAFETY: the window behind `regs` covers `layout.span()` registers; `VolatileMmio` also rejects out-of-window offsets.
        unsafe {
            self.regs.write32(self.layout.change, low);
            self.regs.write32(self.layout.change, high);
        }
    }

    fn await_reply(&self, spin_budget: u32) -> Result<u32> {
        // Whatever the latch holds predates this request.
        if let Some(stale) = self.latch.and_then(IrqLatch::take_word) {
            trace!(target: "flash::mmio", "dropping stale irq word {:#010x}", stale);
        }
        // SAFETY: see `write_change`.
        unsafe { self.regs.write32(self.layout.schedule, SCHED_REQ_WORD) };
        for _ in 0..spin_budget {
            if let Some(word) = self.latch.and_then(IrqLatch::take_word) {
                trace!(target: "flash::mmio", "reply via irq {:#010x}", word);
                return Ok(word);
            }
            // SAFETY: see `write_change`.
            let word = unsafe { self.regs.read32(self.layout.reply) };
            if word & self.layout.pending_mask == 0 {
                trace!(target: "flash::mmio", "reply {:#010x}", word);
                return Ok(word);
            }
            core::hint::spin_loop();
        }
        Err(Error::Timeout { spins: spin_budget })
    }
}

impl<M: Mmio> DeviceBridge for MmioBridge<'_, M> {
    fn request(&self, request: Request) -> Result<Response> {
        match request {
            Request::Change(msg) => {
                let [low, high] = msg.to_words();
                self.write_change(low, high);
                Ok(Response::Accepted)
            }
            Request::Schedule { spin_budget } => self.await_reply(spin_budget).map(Response::Reply),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use flash_wire::{ChangeKind, ChangeMessage, EntityId, TaskState};
    use std::vec::Vec;

    /// Records writes; reads pop from a scripted list, repeating the last value.
    struct ScriptedRegs {
        writes: RefCell<Vec<(usize, u32)>>,
        reads: RefCell<Vec<u32>>,
    }

    impl ScriptedRegs {
        fn new(reads: &[u32]) -> Self {
            let mut reads = reads.to_vec();
            reads.reverse();
            Self { writes: RefCell::new(Vec::new()), reads: RefCell::new(reads) }
        }
    }

    impl Mmio for ScriptedRegs {
        unsafe fn write32(&self, offset: usize, value: u32) {
            self.writes.borrow_mut().push((offset, value));
        }

        unsafe fn read32(&self, _offset: usize) -> u32 {
            let mut reads = self.reads.borrow_mut();
            if reads.len() > 1 {
                reads.pop().unwrap_or(u32::MAX)
            } else {
                reads.last().copied().unwrap_or(u32::MAX)
            }
        }
    }

    #[test]
    fn change_writes_low_then_high_to_change_register() {
        let bridge = MmioBridge::new(ScriptedRegs::new(&[]), RegisterLayout::MATURE);
        let msg = ChangeMessage::new(ChangeKind::NEW, EntityId::from_raw(7), 5, TaskState::RUNNABLE);
        assert_eq!(bridge.request(Request::Change(msg)), Ok(Response::Accepted));
        let [low, high] = msg.to_words();
        assert_eq!(*bridge.registers().writes.borrow(), [(1, low), (1, high)]);
    }

    #[test]
    fn schedule_polls_until_reply_ready() {
        let bridge = MmioBridge::new(
            ScriptedRegs::new(&[u32::MAX, u32::MAX, 0x0000_002A]),
            RegisterLayout::MATURE,
        );
        let resp = bridge.request(Request::Schedule { spin_budget: 10 });
        assert_eq!(resp, Ok(Response::Reply(42)));
        assert_eq!(*bridge.registers().writes.borrow(), [(0, SCHED_REQ_WORD)]);
    }

    #[test]
    fn schedule_times_out_when_device_is_silent() {
        let bridge = MmioBridge::new(ScriptedRegs::new(&[u32::MAX]), RegisterLayout::MATURE);
        assert_eq!(
            bridge.request(Request::Schedule { spin_budget: 16 }),
            Err(Error::Timeout { spins: 16 })
        );
    }

    /// Raises the interrupt with `word` when the schedule register is written.
    struct IrqRegs<'a> {
        latch: &'a IrqLatch,
        schedule: usize,
        word: u32,
        writes: RefCell<Vec<(usize, u32)>>,
    }

    impl Mmio for IrqRegs<'_> {
        unsafe fn write32(&self, offset: usize, value: u32) {
            self.writes.borrow_mut().push((offset, value));
            if offset == self.schedule {
                self.latch.on_interrupt(self.word);
            }
        }

        unsafe fn read32(&self, _offset: usize) -> u32 {
            u32::MAX
        }
    }

    #[test]
    fn irq_latch_short_circuits_polling() {
        let latch = IrqLatch::new();
        let regs = IrqRegs { latch: &latch, schedule: 1, word: 11, writes: RefCell::new(Vec::new()) };
        let bridge = MmioBridge::new(regs, RegisterLayout::HARNESS).with_irq_latch(&latch);
        assert_eq!(bridge.request(Request::Schedule { spin_budget: 1 }), Ok(Response::Reply(11)));
        assert_eq!(*bridge.registers().writes.borrow(), [(1, SCHED_REQ_WORD)]);
    }

    #[test]
    fn stale_irq_word_is_not_taken_as_the_answer() {
        let latch = IrqLatch::new();
        latch.on_interrupt(5);
        let bridge = MmioBridge::new(ScriptedRegs::new(&[9]), RegisterLayout::MATURE).with_irq_latch(&latch);
        assert_eq!(bridge.request(Request::Schedule { spin_budget: 4 }), Ok(Response::Reply(9)));
        assert!(!latch.is_pending());
    }

    #[test]
    fn zero_pending_mask_takes_first_read() {
        let layout = RegisterLayout::MATURE.with_pending_mask(0);
        let bridge = MmioBridge::new(ScriptedRegs::new(&[0x0001_0007, 0x0000_0003]), layout);
        assert_eq!(bridge.request(Request::Schedule { spin_budget: 1000 }), Ok(Response::Reply(0x0001_0007)));
        assert_eq!(flash_wire::decode_reply(0x0001_0007), EntityId::from_raw(7));
    }

    #[test]
    fn default_pending_mask_waits_out_upper_half() {
        let bridge = MmioBridge::new(ScriptedRegs::new(&[0x0001_0007]), RegisterLayout::MATURE);
        assert_eq!(
            bridge.request(Request::Schedule { spin_budget: 8 }),
            Err(Error::Timeout { spins: 8 })
        );

        let layout = RegisterLayout::MATURE.with_pending_mask(0x8000_0000);
        let bridge = MmioBridge::new(ScriptedRegs::new(&[0x8000_0000, 0x0001_0007]), layout);
        assert_eq!(bridge.request(Request::Schedule { spin_budget: 8 }), Ok(Response::Reply(0x0001_0007)));
    }

    #[test]
    fn layouts_span_two_registers() {
        assert_eq!(RegisterLayout::MATURE.span(), 2);
        assert_eq!(RegisterLayout::HARNESS.span(), 2);
    }
}
