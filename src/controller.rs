//! Device controller orchestration: polls the transport, verifies and
//! dispatches incoming messages, and formats replies. Stateless between
//! polls apart from the acknowledge flag; command side effects land in
//! the pin table, the counter/timer bank, and the configuration store.

use std::fmt::Write as _;
use std::sync::Arc;

use thiserror::Error;

use crate::board::{BoardError, PinMode, PinTable};
use crate::config::HostConfig;
use crate::counters::{BankError, CounterBank, SlotMode, Timing, DETACHED};
use crate::hal::{Clock, Gpio, IrqHub, NvMem, Trigger};
use crate::program::ProgramSink;
use crate::protocol::{self, ArgValue, Integrity};
use crate::registry::{Action, CommandSpec, Dispatch, Registry};
use crate::store::{ConfigRecord, ConfigStore, StoreError, DEVICE_ID};
use crate::transport::{Connection, TransportKind};

/// Fixed outbound frame buffer size; longer reply bodies are truncated.
pub const REPLY_CAPACITY: usize = 128;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The full error taxonomy. Everything here is recovered locally: the
/// protocol has no error-reply channel, so failed commands are silent
/// no-ops logged at debug level.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Bank(#[from] BankError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("argument count does not match declared arity")]
    ArityMismatch,
    #[error("integrity suffix mismatch")]
    IntegrityMismatch,
}

/// Room reserved for the `:checksum` suffix on integrity-echoing frames.
const SUFFIX_HEADROOM: usize = 4;

/// Reply collector with per-frame truncation to the frame budget.
#[derive(Debug)]
pub struct ReplyBuf {
    limit: usize,
    lines: Vec<String>,
}

impl Default for ReplyBuf {
    fn default() -> Self {
        Self::with_limit(REPLY_CAPACITY)
    }
}

impl ReplyBuf {
    fn with_limit(limit: usize) -> Self {
        Self { limit, lines: Vec::new() }
    }

    /// Buffer for frames that will carry an integrity suffix: the body
    /// budget shrinks so the suffixed frame still fits [`REPLY_CAPACITY`].
    pub fn with_suffix_headroom() -> Self {
        Self::with_limit(REPLY_CAPACITY - SUFFIX_HEADROOM)
    }

    pub fn push(&mut self, mut body: String) {
        if body.len() > self.limit {
            let mut cut = self.limit;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        self.lines.push(body);
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

pub struct Controller {
    pins: PinTable,
    bank: CounterBank,
    store: ConfigStore,
    registry: Registry,
    clock: Arc<dyn Clock>,
    ack: bool,
    echo_integrity: bool,
    defaults_pin: Option<u8>,
    default_transport: (TransportKind, String),
    transport_record: (TransportKind, String),
    program: Option<Box<dyn ProgramSink>>,
}

impl Controller {
    pub fn new(
        config: &HostConfig,
        gpio: Arc<dyn Gpio>,
        irq: Arc<dyn IrqHub>,
        clock: Arc<dyn Clock>,
        mem: Arc<dyn NvMem>,
        extensions: Vec<CommandSpec>,
    ) -> Self {
        let default_transport = (
            TransportKind::from_code(config.transport.kind).unwrap_or(TransportKind::Ethernet),
            config.transport.params.clone(),
        );
        Self {
            pins: PinTable::new(&config.board, gpio),
            bank: CounterBank::new(irq, clock.clone()),
            store: ConfigStore::new(mem),
            registry: Registry::new(extensions),
            clock,
            ack: false,
            echo_integrity: false,
            defaults_pin: config.board.defaults_pin,
            default_transport: default_transport.clone(),
            transport_record: default_transport,
            program: None,
        }
    }

    pub fn set_program_sink(&mut self, sink: Box<dyn ProgramSink>) {
        self.program = Some(sink);
    }

    /// Startup: sample the power-on defaults pin, then either apply the
    /// stored configuration or fall back to the hard-coded transport.
    /// The store is never modified here.
    pub fn init(&mut self) {
        if self.defaults_pin_low() {
            tracing::info!("power-on defaults pin low; bypassing stored configuration");
            self.transport_record = self.default_transport.clone();
            return;
        }
        match self.store.load() {
            Ok(record) => {
                tracing::info!("applying stored configuration");
                self.apply_record(&record);
            }
            Err(StoreError::NotInitialized) => {
                tracing::info!("store uninitialized; using default transport configuration");
                self.transport_record = self.default_transport.clone();
            }
        }
    }

    /// Sample the designated input: temporarily force pull-up, read,
    /// restore the configured mode.
    fn defaults_pin_low(&mut self) -> bool {
        let Some(pin) = self.defaults_pin else {
            return false;
        };
        let Some(prev) = self.pins.force_mode(pin, PinMode::InputPullup) else {
            return false;
        };
        let low = !self.pins.digital_level(pin);
        self.pins.force_mode(pin, prev);
        low
    }

    fn apply_record(&mut self, record: &ConfigRecord) {
        for pin in 0..self.pins.count() {
            let Some(mode) = PinMode::from_code(record.pin_modes[pin as usize]) else {
                continue;
            };
            if self.pins.mode_of(pin) == Some(PinMode::Reserved) {
                continue;
            }
            if let Err(err) = self.pins.set_mode(pin, mode) {
                self.note(err.into());
            }
        }
        self.bank.clear();
        for (slot, rec) in record.slots.iter().enumerate() {
            if rec.pin == DETACHED {
                continue;
            }
            let (Some(mode), Some(trigger), Some(timing)) = (
                SlotMode::from_code(rec.mode),
                Trigger::from_code(rec.trigger),
                Timing::from_code(rec.timing),
            ) else {
                continue;
            };
            if let Err(err) = self.bank.attach(
                &mut self.pins,
                slot as u8,
                rec.pin,
                mode,
                trigger,
                timing,
                rec.report == 0,
            ) {
                self.note(err.into());
            }
        }
        self.transport_record = (record.transport, record.params.clone());
    }

    fn snapshot_record(&self) -> ConfigRecord {
        ConfigRecord {
            pin_modes: self.pins.mode_codes(),
            slots: self.bank.records(),
            transport: self.transport_record.0,
            params: self.transport_record.1.clone(),
        }
    }

    /// One poll cycle: drain every complete line the transport has
    /// buffered, in arrival order.
    pub fn poll(&mut self, conn: &mut dyn Connection) {
        while let Some(line) = conn.receive() {
            self.handle_line(&line, conn);
        }
    }

    fn handle_line(&mut self, raw: &str, conn: &mut dyn Connection) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }
        let (payload, integrity) = protocol::split_integrity(line);
        let payload = match integrity {
            Integrity::Valid => {
                self.echo_integrity = true;
                payload
            }
            Integrity::Absent => {
                self.echo_integrity = false;
                payload
            }
            Integrity::Invalid => {
                // A mismatching numeric tail may just be payload (a
                // host:port parameter with a small port). The line is kept
                // whole when it dispatches as-is; otherwise it is corrupt.
                if !matches!(self.registry.dispatch(line), Dispatch::Matched(..)) {
                    self.note(ControllerError::IntegrityMismatch);
                    return;
                }
                self.echo_integrity = false;
                line
            }
        };

        let mut out = if self.echo_integrity {
            ReplyBuf::with_suffix_headroom()
        } else {
            ReplyBuf::default()
        };
        match self.registry.dispatch(payload) {
            Dispatch::Matched(spec, args) => {
                self.execute(&spec, &args, &mut out);
                if self.ack && spec.action.is_write() {
                    out.push(spec.key.to_string());
                }
            }
            Dispatch::ArityMismatch => self.note(ControllerError::ArityMismatch),
            Dispatch::Unknown => {
                if let Some(program) = self.program.as_mut() {
                    if program.loading() {
                        program.accept(payload);
                        return;
                    }
                }
                tracing::trace!(payload, "unknown key ignored");
            }
        }
        for body in out.into_lines() {
            self.send_frame(conn, &body);
        }
    }

    fn send_frame(&self, conn: &mut dyn Connection, body: &str) {
        if self.echo_integrity {
            conn.send(&format!("{body}:{}", protocol::checksum(body)));
        } else {
            conn.send(body);
        }
    }

    fn note(&self, err: ControllerError) {
        tracing::debug!("command ignored: {err}");
    }

    fn execute(&mut self, spec: &CommandSpec, args: &[ArgValue], out: &mut ReplyBuf) {
        match spec.action {
            Action::SetAck => self.ack = args[0].as_bool(),
            Action::SetPinMode => {
                let Some(mode) = PinMode::from_code(args[1].as_u8()) else {
                    return;
                };
                if let Err(err) = self.pins.set_mode(args[0].as_u8(), mode) {
                    self.note(err.into());
                }
            }
            Action::PinMode => {
                let pin = args[0].as_u8();
                if let Some(mode) = self.pins.mode_of(pin) {
                    out.push(format!("pmd={pin},{}", mode.code()));
                }
            }
            Action::ReadPin => {
                let pin = args[0].as_u8();
                if pin < self.pins.count() {
                    out.push(format!("{pin}={}", self.pins.read(pin)));
                }
            }
            Action::WritePin => self.pins.write(args[0].as_u8(), args[1].as_u32()),
            Action::ReadList => {
                let last = self.pins.count().saturating_sub(1);
                for pin in protocol::parse_index_list(args[0].as_str(), last) {
                    out.push(format!("{pin}={}", self.pins.read(pin)));
                }
            }
            Action::WriteList => {
                let last = self.pins.count().saturating_sub(1);
                let value = args[1].as_u32();
                for pin in protocol::parse_index_list(args[0].as_str(), last) {
                    self.pins.write(pin, value);
                }
            }
            Action::Attach => {
                let (Some(mode), Some(trigger), Some(timing)) = (
                    SlotMode::from_code(args[2].as_u8()),
                    Trigger::from_code(args[3].as_u8()),
                    Timing::from_code(args[4].as_u8()),
                ) else {
                    return;
                };
                if let Err(err) = self.bank.attach(
                    &mut self.pins,
                    args[0].as_u8(),
                    args[1].as_u8(),
                    mode,
                    trigger,
                    timing,
                    // report flag: 0 instantaneous, 1 latched
                    args[5].as_u8() == 0,
                ) {
                    self.note(err.into());
                }
            }
            Action::Detach => {
                if let Err(err) = self.bank.detach(args[0].as_u8()) {
                    self.note(err.into());
                }
            }
            Action::ResetSlot => {
                if let Err(err) = self.bank.reset(args[0].as_u8()) {
                    self.note(err.into());
                }
            }
            Action::SlotStatus => {
                let slot = args[0].as_u8();
                match self.bank.status(slot) {
                    Ok((active, value)) => {
                        out.push(format!("tms={slot},{},{value}", u8::from(active)));
                    }
                    Err(err) => self.note(err.into()),
                }
            }
            Action::StoreConfig => self.store.store(&self.snapshot_record()),
            Action::LoadConfig => match self.store.load() {
                Ok(record) => self.apply_record(&record),
                Err(err) => self.note(err.into()),
            },
            Action::Invalidate => self.store.invalidate(),
            Action::ConnParams => {
                let (kind, params) = &self.transport_record;
                out.push(format!("cnp={},{params}", kind.code()));
            }
            Action::SetConnParams => {
                let Some(kind) = TransportKind::from_code(args[0].as_u8()) else {
                    return;
                };
                self.transport_record = (kind, args[1].as_str().to_string());
            }
            Action::Info => {
                let mut body = String::new();
                let _ = write!(
                    body,
                    "inf={DEVICE_ID},{VERSION},{},{}",
                    self.pins.count(),
                    crate::counters::MAX_SLOTS
                );
                out.push(body);
            }
            Action::SoftReset => self.reset(),
            Action::Custom(handler) => handler(self, args, out),
        }
    }

    /// Explicit soft reset: detach every slot, return non-reserved pins
    /// to inputs, clear the ack flag, and re-run startup initialization.
    pub fn reset(&mut self) {
        tracing::info!("soft reset");
        self.bank.clear();
        for pin in 0..self.pins.count() {
            if self.pins.mode_of(pin) != Some(PinMode::Reserved) {
                let _ = self.pins.set_mode(pin, PinMode::Input);
            }
        }
        self.ack = false;
        self.init();
    }

    /// Symbolic state read for the scripting collaborator: `#n` pin
    /// value, `%n` timer elapsed, `+n` count, `*n` active, `$0` millis.
    pub fn sys_get(&self, token: &str) -> Option<u32> {
        let mut chars = token.chars();
        let sigil = chars.next()?;
        if sigil == '$' {
            return Some(self.clock.millis() as u32);
        }
        let idx: u8 = chars.as_str().trim().parse().ok()?;
        match sigil {
            '#' => Some(self.pins.read(idx)),
            '%' => match self.bank.mode_of(idx)? {
                SlotMode::Timer => self.bank.status(idx).ok().map(|(_, value)| value),
                SlotMode::Counter => None,
            },
            '+' => self.bank.count_of(idx),
            '*' => self.bank.status(idx).ok().map(|(active, _)| u32::from(active)),
            _ => None,
        }
    }

    /// Symbolic state write: `#n` pin write, `+n` count override, `*n`
    /// enable/disable an attached slot or pulse a software-driven one.
    pub fn sys_set(&mut self, token: &str, value: u32) -> bool {
        let mut chars = token.chars();
        let Some(sigil) = chars.next() else {
            return false;
        };
        let Ok(idx) = chars.as_str().trim().parse::<u8>() else {
            return false;
        };
        match sigil {
            '#' => {
                self.pins.write(idx, value);
                true
            }
            '+' => self.bank.set_count(idx, value),
            '*' => {
                if self.bank.is_attached(idx) {
                    self.bank.set_enabled(idx, value != 0)
                } else {
                    self.bank.pulse(idx)
                }
            }
            _ => false,
        }
    }

    pub fn ack(&self) -> bool {
        self.ack
    }

    pub fn pins(&self) -> &PinTable {
        &self.pins
    }

    pub fn bank(&self) -> &CounterBank {
        &self.bank
    }

    pub fn transport_record(&self) -> (TransportKind, &str) {
        (self.transport_record.0, &self.transport_record.1)
    }
}
