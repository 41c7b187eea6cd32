//! Simulated hardware: a board whose pins are plain state that tests
//! (and the TCP bridge binary) can drive, plus clocks and a RAM-backed
//! non-volatile memory with an optional file image so configuration
//! survives process restarts.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use rand::Rng;

use crate::board::{PinMode, MAX_PINS};
use crate::hal::{Clock, Gpio, HalError, IrqHub, IsrHandler, NvMem, Trigger};

struct SimPin {
    level: bool,
    /// Externally driven level wins over the pull-up default.
    driven: bool,
    analog: u16,
    pwm: u16,
    irq: Option<(Trigger, IsrHandler)>,
}

impl SimPin {
    fn new() -> Self {
        Self { level: false, driven: false, analog: 0, pwm: 0, irq: None }
    }
}

pub struct SimBoard {
    pins: Mutex<Vec<SimPin>>,
    count: u8,
    noise: bool,
}

impl SimBoard {
    pub fn new(count: u8) -> Self {
        let count = count.min(MAX_PINS as u8);
        Self {
            pins: Mutex::new((0..count).map(|_| SimPin::new()).collect()),
            count,
            noise: false,
        }
    }

    pub fn with_noise(mut self, noise: bool) -> Self {
        self.noise = noise;
        self
    }

    /// Drive a pin from "outside" and fire the attached interrupt if the
    /// level transition matches its trigger. The handler runs after the
    /// pin lock is released, like a real ISR preempting the main loop.
    pub fn drive(&self, pin: u8, high: bool) {
        let handler = {
            let mut pins = self.pins.lock().unwrap();
            let Some(entry) = pins.get_mut(pin as usize) else {
                return;
            };
            let prev = entry.level;
            entry.level = high;
            entry.driven = true;
            entry.irq.as_ref().and_then(|(trigger, handler)| {
                trigger_fires(*trigger, prev, high).then(|| handler.clone())
            })
        };
        if let Some(handler) = handler {
            handler();
        }
    }

    pub fn set_analog(&self, pin: u8, value: u16) {
        if let Some(entry) = self.pins.lock().unwrap().get_mut(pin as usize) {
            entry.analog = value;
        }
    }

    pub fn pwm_duty(&self, pin: u8) -> u16 {
        self.pins
            .lock()
            .unwrap()
            .get(pin as usize)
            .map_or(0, |p| p.pwm)
    }

    pub fn irq_attached(&self, pin: u8) -> bool {
        self.pins
            .lock()
            .unwrap()
            .get(pin as usize)
            .is_some_and(|p| p.irq.is_some())
    }
}

fn trigger_fires(trigger: Trigger, prev: bool, now: bool) -> bool {
    match trigger {
        Trigger::Falling => prev && !now,
        Trigger::Rising => !prev && now,
        Trigger::Change => prev != now,
        Trigger::Low => !now,
    }
}

impl Gpio for SimBoard {
    fn pin_count(&self) -> u8 {
        self.count
    }

    fn apply_mode(&self, pin: u8, mode: PinMode) {
        let mut pins = self.pins.lock().unwrap();
        if let Some(entry) = pins.get_mut(pin as usize) {
            // Pull-up floats the line high unless something drives it.
            if mode == PinMode::InputPullup && !entry.driven {
                entry.level = true;
            }
        }
    }

    fn digital_read(&self, pin: u8) -> bool {
        self.pins
            .lock()
            .unwrap()
            .get(pin as usize)
            .is_some_and(|p| p.level)
    }

    fn digital_write(&self, pin: u8, high: bool) {
        if let Some(entry) = self.pins.lock().unwrap().get_mut(pin as usize) {
            entry.level = high;
        }
    }

    fn analog_read(&self, pin: u8) -> u16 {
        let base = self
            .pins
            .lock()
            .unwrap()
            .get(pin as usize)
            .map_or(0, |p| p.analog);
        if self.noise {
            let jitter = rand::rng().random_range(-4i32..=4);
            (i32::from(base) + jitter).clamp(0, 1023) as u16
        } else {
            base
        }
    }

    fn pwm_write(&self, pin: u8, duty: u16) {
        if let Some(entry) = self.pins.lock().unwrap().get_mut(pin as usize) {
            entry.pwm = duty;
        }
    }
}

impl IrqHub for SimBoard {
    fn attach(&self, pin: u8, trigger: Trigger, handler: IsrHandler) -> Result<(), HalError> {
        let mut pins = self.pins.lock().unwrap();
        let entry = pins.get_mut(pin as usize).ok_or(HalError::BadPin(pin))?;
        entry.irq = Some((trigger, handler));
        Ok(())
    }

    fn detach(&self, pin: u8) {
        if let Some(entry) = self.pins.lock().unwrap().get_mut(pin as usize) {
            entry.irq = None;
        }
    }
}

/// Wall-clock monotonic time.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Deterministic clock for tests; time moves only when advanced.
#[derive(Default)]
pub struct ManualClock {
    us: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_micros(&self, delta: u64) {
        self.us.fetch_add(delta, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn micros(&self) -> u64 {
        self.us.load(Ordering::Acquire)
    }
}

/// RAM-backed non-volatile memory. With a file image attached, `sync`
/// rewrites the image so the contents survive restarts.
pub struct RamNvMem {
    bytes: Mutex<Vec<u8>>,
    image: Option<PathBuf>,
}

impl RamNvMem {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0xFF; len]),
            image: None,
        }
    }

    /// Load an existing image file, or start erased if it is missing or
    /// the wrong size.
    pub fn with_image(path: impl AsRef<Path>, len: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = match std::fs::read(&path) {
            Ok(data) if data.len() == len => data,
            Ok(_) => {
                tracing::warn!(path = %path.display(), "image size mismatch, starting erased");
                vec![0xFF; len]
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => vec![0xFF; len],
            Err(err) => return Err(err),
        };
        Ok(Self {
            bytes: Mutex::new(bytes),
            image: Some(path),
        })
    }
}

impl NvMem for RamNvMem {
    fn len(&self) -> usize {
        self.bytes.lock().unwrap().len()
    }

    fn read_byte(&self, addr: usize) -> u8 {
        self.bytes.lock().unwrap().get(addr).copied().unwrap_or(0xFF)
    }

    fn write_byte(&self, addr: usize, value: u8) {
        if let Some(cell) = self.bytes.lock().unwrap().get_mut(addr) {
            *cell = value;
        }
    }

    fn sync(&self) {
        if let Some(path) = &self.image {
            let bytes = self.bytes.lock().unwrap().clone();
            if let Err(err) = std::fs::write(path, bytes) {
                tracing::error!(path = %path.display(), "failed to sync image: {err}");
            }
        }
    }
}
