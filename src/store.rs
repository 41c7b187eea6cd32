//! Persistent configuration layer: a cursor-based typed stream over
//! non-volatile memory and the fixed-address configuration record.
//!
//! The layout is an ABI: field addresses are computed from the sizes of
//! the preceding fields, never from stored length prefixes, so the image
//! shape must not change silently between versions.

use std::sync::Arc;

use thiserror::Error;

use crate::board::MAX_PINS;
use crate::counters::MAX_SLOTS;
use crate::hal::NvMem;
use crate::transport::TransportKind;

/// Magic device identifier; the record is trusted only when the image
/// leads with this constant.
pub const DEVICE_ID: u32 = 0x5049_4E31; // "PIN1"

/// Fixed NUL-padded capacity of the transport parameter field. The field
/// is ASCII-only; non-ASCII bytes are dropped on write.
pub const PARAMS_CAPACITY: usize = 64;

const ADDR_DEVICE_ID: usize = 0;
const ADDR_PIN_MODES: usize = ADDR_DEVICE_ID + 4;
const ADDR_SLOTS: usize = ADDR_PIN_MODES + MAX_PINS;
const SLOT_RECORD_LEN: usize = 5;
const ADDR_TRANSPORT: usize = ADDR_SLOTS + MAX_SLOTS * SLOT_RECORD_LEN;

/// Total persisted image length.
pub const IMAGE_LEN: usize = ADDR_TRANSPORT + 1 + PARAMS_CAPACITY;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration store is uninitialized or foreign")]
    NotInitialized,
}

/// One slot attachment tuple as persisted, raw wire codes. The report
/// flag follows the wire convention: 0 instantaneous, 1 latched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRecord {
    pub pin: u8,
    pub mode: u8,
    pub trigger: u8,
    pub timing: u8,
    pub report: u8,
}

impl SlotRecord {
    pub const fn detached() -> Self {
        Self { pin: 0xFF, mode: 0, trigger: 0, timing: 0, report: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRecord {
    pub pin_modes: [u8; MAX_PINS],
    pub slots: [SlotRecord; MAX_SLOTS],
    pub transport: TransportKind,
    pub params: String,
}

/// Sequential typed read/write cursor with an explicit address register.
pub struct EeCursor<'a> {
    mem: &'a dyn NvMem,
    addr: usize,
}

impl<'a> EeCursor<'a> {
    pub fn new(mem: &'a dyn NvMem) -> Self {
        Self { mem, addr: 0 }
    }

    pub fn seek(&mut self, addr: usize) -> &mut Self {
        self.addr = addr;
        self
    }

    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn read_u8(&mut self) -> u8 {
        let value = self.mem.read_byte(self.addr);
        self.addr += 1;
        value
    }

    pub fn write_u8(&mut self, value: u8) {
        self.mem.write_byte(self.addr, value);
        self.addr += 1;
    }

    pub fn read_u32(&mut self) -> u32 {
        let bytes = [self.read_u8(), self.read_u8(), self.read_u8(), self.read_u8()];
        u32::from_le_bytes(bytes)
    }

    pub fn write_u32(&mut self, value: u32) {
        for byte in value.to_le_bytes() {
            self.write_u8(byte);
        }
    }

    /// Read a NUL-padded string field of fixed capacity. The cursor
    /// always advances by `cap`.
    pub fn read_str(&mut self, cap: usize) -> String {
        let mut out = String::with_capacity(cap);
        let mut done = false;
        for _ in 0..cap {
            let byte = self.read_u8();
            if byte == 0 {
                done = true;
            }
            if !done && byte.is_ascii() {
                out.push(byte as char);
            }
        }
        out
    }

    /// Write a string into a fixed NUL-padded ASCII field, truncating to
    /// `cap`. Non-ASCII bytes are dropped, matching what `read_str` can
    /// reproduce.
    pub fn write_str(&mut self, text: &str, cap: usize) {
        let mut bytes = text.bytes().filter(u8::is_ascii);
        for _ in 0..cap {
            self.write_u8(bytes.next().unwrap_or(0));
        }
    }
}

pub struct ConfigStore {
    mem: Arc<dyn NvMem>,
}

impl ConfigStore {
    pub fn new(mem: Arc<dyn NvMem>) -> Self {
        Self { mem }
    }

    /// Validate the leading device identifier, then read the rest of the
    /// image. A mismatch means uninitialized or foreign memory; nothing
    /// past the identifier is read in that case.
    pub fn load(&self) -> Result<ConfigRecord, StoreError> {
        let mut cursor = EeCursor::new(self.mem.as_ref());
        if cursor.read_u32() != DEVICE_ID {
            return Err(StoreError::NotInitialized);
        }
        let mut pin_modes = [0u8; MAX_PINS];
        for mode in &mut pin_modes {
            *mode = cursor.read_u8();
        }
        let slots = std::array::from_fn(|_| SlotRecord {
            pin: cursor.read_u8(),
            mode: cursor.read_u8(),
            trigger: cursor.read_u8(),
            timing: cursor.read_u8(),
            report: cursor.read_u8(),
        });
        let transport = TransportKind::from_code(cursor.read_u8()).unwrap_or(TransportKind::Serial);
        let params = cursor.read_str(PARAMS_CAPACITY);
        Ok(ConfigRecord { pin_modes, slots, transport, params })
    }

    /// Write the full image from address 0 in the fixed field order.
    pub fn store(&self, record: &ConfigRecord) {
        let mut cursor = EeCursor::new(self.mem.as_ref());
        cursor.write_u32(DEVICE_ID);
        for mode in &record.pin_modes {
            cursor.write_u8(*mode);
        }
        for slot in &record.slots {
            cursor.write_u8(slot.pin);
            cursor.write_u8(slot.mode);
            cursor.write_u8(slot.trigger);
            cursor.write_u8(slot.timing);
            cursor.write_u8(slot.report);
        }
        cursor.write_u8(record.transport.code());
        cursor.write_str(&record.params, PARAMS_CAPACITY);
        self.mem.sync();
        tracing::debug!(len = IMAGE_LEN, "configuration stored");
    }

    /// Poison the identifier so the next load reports `NotInitialized`;
    /// used for forced re-initialization.
    pub fn invalidate(&self) {
        let mut cursor = EeCursor::new(self.mem.as_ref());
        cursor.write_u32(!DEVICE_ID);
        self.mem.sync();
    }
}
