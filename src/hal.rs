//! Trait seams between the controller core and the physical (or
//! simulated) hardware. All traits are object-safe; the controller holds
//! `Arc<dyn ...>` handles so the same core runs against `sim::SimBoard`
//! in tests and against a real port on target hardware.

use std::sync::Arc;

use thiserror::Error;

use crate::board::PinMode;

#[derive(Debug, Error)]
pub enum HalError {
    #[error("pin {0} is out of range")]
    BadPin(u8),
    #[error("pin {0} has no interrupt capability")]
    NoInterrupt(u8),
}

/// Edge or level condition that fires an attached interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Falling,
    Rising,
    Change,
    Low,
}

impl Trigger {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Trigger::Falling),
            1 => Some(Trigger::Rising),
            2 => Some(Trigger::Change),
            3 => Some(Trigger::Low),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Trigger::Falling => 0,
            Trigger::Rising => 1,
            Trigger::Change => 2,
            Trigger::Low => 3,
        }
    }
}

/// Handler invoked in interrupt context. Must be O(1) and allocation-free.
pub type IsrHandler = Arc<dyn Fn() + Send + Sync>;

/// Raw pin access by validated pin id.
pub trait Gpio: Send + Sync {
    fn pin_count(&self) -> u8;
    fn apply_mode(&self, pin: u8, mode: PinMode);
    fn digital_read(&self, pin: u8) -> bool;
    fn digital_write(&self, pin: u8, high: bool);
    fn analog_read(&self, pin: u8) -> u16;
    fn pwm_write(&self, pin: u8, duty: u16);
}

/// Interrupt registration. A handler registered here may fire at any
/// point, concurrently with the main loop; callers must tear down the
/// source (`detach`) before mutating state the handler touches.
pub trait IrqHub: Send + Sync {
    fn attach(&self, pin: u8, trigger: Trigger, handler: IsrHandler) -> Result<(), HalError>;
    fn detach(&self, pin: u8);
}

/// Monotonic time source for timer slots.
pub trait Clock: Send + Sync {
    fn micros(&self) -> u64;

    fn millis(&self) -> u64 {
        self.micros() / 1_000
    }
}

/// Byte-addressed non-volatile memory. Writes out of range are dropped;
/// reads out of range return 0xFF (erased-cell convention).
pub trait NvMem: Send + Sync {
    fn len(&self) -> usize;
    fn read_byte(&self, addr: usize) -> u8;
    fn write_byte(&self, addr: usize, value: u8);

    /// Flush any write-behind image. No-op for true EEPROM-like memory.
    fn sync(&self) {}
}
