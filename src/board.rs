//! Pin descriptor table: per-pin capability and current mode, with the
//! read/write dispatch rules of the remote protocol. The table is a
//! fixed-size arena indexed by pin number; entries past the board's pin
//! count are inert.

use std::sync::Arc;

use thiserror::Error;

use crate::config::BoardProfile;
use crate::hal::Gpio;

pub const MAX_PINS: usize = 32;

/// Native PWM duty range (8-bit, Arduino-style analogWrite).
pub const PWM_MAX: u32 = 255;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("invalid pin {0}")]
    InvalidPin(u8),
    #[error("pin {0} is reserved")]
    ReservedPin(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinKind {
    Digital,
    Analog,
    PwmCapable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
    InputPullup,
    PwmOutput,
    Reserved,
}

impl PinMode {
    /// Wire codes cover only the remotely settable modes; `Reserved` is
    /// never accepted from the protocol.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PinMode::Input),
            1 => Some(PinMode::Output),
            2 => Some(PinMode::InputPullup),
            3 => Some(PinMode::PwmOutput),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            PinMode::Input => 0,
            PinMode::Output => 1,
            PinMode::InputPullup => 2,
            PinMode::PwmOutput => 3,
            PinMode::Reserved => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PinDescriptor {
    pub kind: PinKind,
    pub mode: PinMode,
    pub has_interrupt: bool,
}

pub struct PinTable {
    pins: [PinDescriptor; MAX_PINS],
    count: u8,
    gpio: Arc<dyn Gpio>,
}

impl PinTable {
    pub fn new(profile: &BoardProfile, gpio: Arc<dyn Gpio>) -> Self {
        let count = profile.pin_count.min(MAX_PINS as u8);
        let mut pins = [PinDescriptor {
            kind: PinKind::Digital,
            mode: PinMode::Input,
            has_interrupt: false,
        }; MAX_PINS];
        for (id, pin) in pins.iter_mut().enumerate().take(count as usize) {
            let id = id as u8;
            if profile.analog_pins.contains(&id) {
                pin.kind = PinKind::Analog;
            } else if profile.pwm_pins.contains(&id) {
                pin.kind = PinKind::PwmCapable;
            }
            pin.has_interrupt = profile.interrupt_pins.contains(&id);
            if profile.reserved_pins.contains(&id) {
                pin.mode = PinMode::Reserved;
            }
        }
        Self { pins, count, gpio }
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn descriptor(&self, pin: u8) -> Option<&PinDescriptor> {
        if pin < self.count {
            Some(&self.pins[pin as usize])
        } else {
            None
        }
    }

    pub fn mode_of(&self, pin: u8) -> Option<PinMode> {
        self.descriptor(pin).map(|d| d.mode)
    }

    pub fn has_interrupt(&self, pin: u8) -> bool {
        self.descriptor(pin).is_some_and(|d| d.has_interrupt)
    }

    /// Remote mode change. Rejects out-of-range pins and any pin the
    /// board profile marked reserved.
    pub fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), BoardError> {
        if pin >= self.count {
            return Err(BoardError::InvalidPin(pin));
        }
        let slot = &mut self.pins[pin as usize];
        if slot.mode == PinMode::Reserved || mode == PinMode::Reserved {
            return Err(BoardError::ReservedPin(pin));
        }
        slot.mode = mode;
        self.gpio.apply_mode(pin, mode);
        Ok(())
    }

    /// Internal mode override used for Low-trigger pull-up forcing and
    /// power-on defaults sampling. Bypasses the reserved check and
    /// returns the previous mode so callers can restore it.
    pub fn force_mode(&mut self, pin: u8, mode: PinMode) -> Option<PinMode> {
        if pin >= self.count {
            return None;
        }
        let prev = self.pins[pin as usize].mode;
        self.pins[pin as usize].mode = mode;
        self.gpio.apply_mode(pin, mode);
        Some(prev)
    }

    /// Read a pin: analog pins report the converter value, everything
    /// else the digital level. Unavailable pins read as 0.
    pub fn read(&self, pin: u8) -> u32 {
        let Some(desc) = self.descriptor(pin) else {
            return 0;
        };
        match desc.kind {
            PinKind::Analog => u32::from(self.gpio.analog_read(pin)),
            PinKind::Digital | PinKind::PwmCapable => u32::from(self.gpio.digital_read(pin)),
        }
    }

    /// Write a pin. Values are masked to 1 bit for plain outputs and to
    /// the native PWM range for PWM outputs. Writes to pins that are not
    /// configured as outputs are silent no-ops; that is protocol policy,
    /// not an error.
    pub fn write(&self, pin: u8, value: u32) {
        let Some(desc) = self.descriptor(pin) else {
            return;
        };
        match desc.mode {
            PinMode::Output => self.gpio.digital_write(pin, value & 1 != 0),
            PinMode::PwmOutput => self.gpio.pwm_write(pin, value.min(PWM_MAX) as u16),
            _ => {}
        }
    }

    pub fn digital_level(&self, pin: u8) -> bool {
        self.gpio.digital_read(pin)
    }

    /// Mode byte image used by the persistent configuration record.
    pub fn mode_codes(&self) -> [u8; MAX_PINS] {
        let mut codes = [0u8; MAX_PINS];
        for (code, pin) in codes.iter_mut().zip(self.pins.iter()) {
            *code = pin.mode.code();
        }
        codes
    }
}
