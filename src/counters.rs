//! Counter/timer bank: a fixed array of slots, each optionally bound to
//! a pin and its interrupt source. Slot runtime state lives in a shared
//! cell of individual atomics so the interrupt path never takes a lock;
//! the main loop tears the interrupt down before any multi-field
//! mutation, so the two sides never race on the same slot.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::board::{PinMode, PinTable};
use crate::hal::{Clock, IrqHub, Trigger};
use crate::store::SlotRecord;

pub const MAX_SLOTS: usize = 8;

/// Pin sentinel for an unbound slot.
pub const DETACHED: u8 = 0xFF;

#[derive(Debug, Error)]
pub enum BankError {
    #[error("invalid slot {0}")]
    InvalidSlot(u8),
    #[error("invalid pin {0}")]
    InvalidPin(u8),
    #[error("pin {0} has no interrupt capability")]
    NoInterrupt(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotMode {
    Counter,
    Timer,
}

impl SlotMode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SlotMode::Counter),
            1 => Some(SlotMode::Timer),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            SlotMode::Counter => 0,
            SlotMode::Timer => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    Continuous,
    OneShot,
}

impl Timing {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Timing::Continuous),
            1 => Some(Timing::OneShot),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Timing::Continuous => 0,
            Timing::OneShot => 1,
        }
    }
}

const MODE_COUNTER: u8 = 0;
const MODE_TIMER: u8 = 1;
const TIMING_ONESHOT: u8 = 1;

/// ISR-shared slot state. Every field is individually atomic; `tick` is
/// the complete interrupt body and performs no allocation.
#[derive(Debug, Default)]
pub struct SlotCell {
    enabled: AtomicBool,
    running: AtomicBool,
    count: AtomicU32,
    start_us: AtomicU64,
    captured_us: AtomicU32,
    mode: AtomicU8,
    timing: AtomicU8,
}

impl SlotCell {
    fn reset_primitive(&self) {
        self.count.store(0, Ordering::Release);
        self.captured_us.store(0, Ordering::Release);
        self.start_us.store(0, Ordering::Release);
        self.running.store(false, Ordering::Release);
    }

    /// One trigger event. Counter slots count; timer slots toggle between
    /// running and stopped, capturing the elapsed time on stop. A OneShot
    /// timer disarms itself after its single start/stop cycle.
    pub fn tick(&self, now_us: u64) {
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }
        match self.mode.load(Ordering::Acquire) {
            MODE_COUNTER => {
                self.count.fetch_add(1, Ordering::AcqRel);
            }
            MODE_TIMER => {
                if !self.running.load(Ordering::Acquire) {
                    self.start_us.store(now_us, Ordering::Release);
                    self.running.store(true, Ordering::Release);
                } else {
                    let start = self.start_us.load(Ordering::Acquire);
                    self.captured_us
                        .store(now_us.saturating_sub(start) as u32, Ordering::Release);
                    self.running.store(false, Ordering::Release);
                    if self.timing.load(Ordering::Acquire) == TIMING_ONESHOT {
                        self.enabled.store(false, Ordering::Release);
                    }
                }
            }
            _ => {}
        }
    }
}

struct Slot {
    pin: u8,
    mode: SlotMode,
    trigger: Trigger,
    timing: Timing,
    instant: bool,
    cell: Arc<SlotCell>,
}

impl Slot {
    fn detached() -> Self {
        Self {
            pin: DETACHED,
            mode: SlotMode::Counter,
            trigger: Trigger::Falling,
            timing: Timing::Continuous,
            instant: false,
            cell: Arc::new(SlotCell::default()),
        }
    }
}

pub struct CounterBank {
    slots: [Slot; MAX_SLOTS],
    irq: Arc<dyn IrqHub>,
    clock: Arc<dyn Clock>,
}

impl CounterBank {
    pub fn new(irq: Arc<dyn IrqHub>, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot::detached()),
            irq,
            clock,
        }
    }

    /// Bind a slot to a pin and interrupt, or to nothing (`DETACHED`) for
    /// a software-driven slot. Re-attaching first detaches the slot, and
    /// any other slot already bound to the same pin is evicted: one
    /// interrupt source per pin.
    #[allow(clippy::too_many_arguments)]
    pub fn attach(
        &mut self,
        pins: &mut PinTable,
        slot: u8,
        pin: u8,
        mode: SlotMode,
        trigger: Trigger,
        mut timing: Timing,
        mut instant: bool,
    ) -> Result<(), BankError> {
        if slot as usize >= MAX_SLOTS {
            return Err(BankError::InvalidSlot(slot));
        }
        if pin != DETACHED {
            if pin >= pins.count() {
                return Err(BankError::InvalidPin(pin));
            }
            if !pins.has_interrupt(pin) {
                return Err(BankError::NoInterrupt(pin));
            }
        }

        self.detach_slot(slot as usize);
        if pin != DETACHED {
            for idx in 0..MAX_SLOTS {
                if self.slots[idx].pin == pin {
                    tracing::debug!(slot = idx, pin, "evicting prior attachment");
                    self.detach_slot(idx);
                }
            }
        }

        // A pin-less timer has no hardware trigger; it is driven through
        // the program hooks and always reports instantaneously.
        if pin == DETACHED && mode == SlotMode::Timer {
            timing = Timing::Continuous;
            instant = true;
        }

        // Attaching a Low trigger on a floating input hangs the interrupt
        // line; force the pull-up before arming.
        if pin != DETACHED && trigger == Trigger::Low {
            pins.force_mode(pin, PinMode::InputPullup);
        }

        let entry = &mut self.slots[slot as usize];
        entry.pin = pin;
        entry.mode = mode;
        entry.trigger = trigger;
        entry.timing = timing;
        entry.instant = instant;
        entry.cell.reset_primitive();
        entry.cell.mode.store(mode.code(), Ordering::Release);
        entry.cell.timing.store(timing.code(), Ordering::Release);
        entry.cell.enabled.store(true, Ordering::Release);

        if pin != DETACHED {
            let cell = entry.cell.clone();
            let clock = self.clock.clone();
            if let Err(err) = self
                .irq
                .attach(pin, trigger, Arc::new(move || cell.tick(clock.micros())))
            {
                // A failed hookup must not leave the slot claiming the pin.
                tracing::debug!(slot, pin, "interrupt hookup failed: {err}");
                self.detach_slot(slot as usize);
                return Err(BankError::NoInterrupt(pin));
            }
        }
        tracing::debug!(slot, pin, ?mode, ?trigger, ?timing, instant, "slot attached");
        Ok(())
    }

    pub fn detach(&mut self, slot: u8) -> Result<(), BankError> {
        if slot as usize >= MAX_SLOTS {
            return Err(BankError::InvalidSlot(slot));
        }
        self.detach_slot(slot as usize);
        Ok(())
    }

    /// Interrupt teardown strictly precedes state mutation; once `detach`
    /// returns, no ISR for this slot can be in flight or fire again.
    fn detach_slot(&mut self, idx: usize) {
        let entry = &mut self.slots[idx];
        if entry.pin != DETACHED {
            self.irq.detach(entry.pin);
        }
        entry.cell.enabled.store(false, Ordering::Release);
        entry.cell.running.store(false, Ordering::Release);
        entry.pin = DETACHED;
    }

    /// Zero the underlying primitive and re-arm (a OneShot timer becomes
    /// ready for another capture cycle).
    pub fn reset(&mut self, slot: u8) -> Result<(), BankError> {
        let entry = self
            .slots
            .get(slot as usize)
            .ok_or(BankError::InvalidSlot(slot))?;
        entry.cell.reset_primitive();
        entry.cell.enabled.store(true, Ordering::Release);
        Ok(())
    }

    /// `(active, value)` per the status query contract: counters report
    /// the running count, timers either the live elapsed time (instant
    /// reporting, while running) or the last captured duration.
    pub fn status(&self, slot: u8) -> Result<(bool, u32), BankError> {
        let entry = self
            .slots
            .get(slot as usize)
            .ok_or(BankError::InvalidSlot(slot))?;
        let cell = &entry.cell;
        match entry.mode {
            SlotMode::Counter => Ok((
                cell.enabled.load(Ordering::Acquire),
                cell.count.load(Ordering::Acquire),
            )),
            SlotMode::Timer => {
                let running = cell.running.load(Ordering::Acquire);
                let value = if entry.instant && running {
                    let start = cell.start_us.load(Ordering::Acquire);
                    self.clock.micros().saturating_sub(start) as u32
                } else {
                    cell.captured_us.load(Ordering::Acquire)
                };
                Ok((running, value))
            }
        }
    }

    pub fn mode_of(&self, slot: u8) -> Option<SlotMode> {
        self.slots.get(slot as usize).map(|s| s.mode)
    }

    pub fn count_of(&self, slot: u8) -> Option<u32> {
        self.slots
            .get(slot as usize)
            .map(|s| s.cell.count.load(Ordering::Acquire))
    }

    pub fn set_count(&self, slot: u8, value: u32) -> bool {
        match self.slots.get(slot as usize) {
            Some(s) => {
                s.cell.count.store(value, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn set_enabled(&self, slot: u8, enabled: bool) -> bool {
        match self.slots.get(slot as usize) {
            Some(s) => {
                s.cell.enabled.store(enabled, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self, slot: u8) -> bool {
        self.slots
            .get(slot as usize)
            .is_some_and(|s| s.pin != DETACHED)
    }

    /// Software drive for pin-less slots: one synthetic trigger event.
    pub fn pulse(&self, slot: u8) -> bool {
        match self.slots.get(slot as usize) {
            Some(s) => {
                s.cell.tick(self.clock.micros());
                true
            }
            None => false,
        }
    }

    /// Detach everything, e.g. on soft reset.
    pub fn clear(&mut self) {
        for idx in 0..MAX_SLOTS {
            self.detach_slot(idx);
        }
    }

    /// Attachment tuples for the persistent configuration record.
    pub fn records(&self) -> [SlotRecord; MAX_SLOTS] {
        std::array::from_fn(|idx| {
            let s = &self.slots[idx];
            SlotRecord {
                pin: s.pin,
                mode: s.mode.code(),
                trigger: s.trigger.code(),
                timing: s.timing.code(),
                report: u8::from(!s.instant),
            }
        })
    }
}
