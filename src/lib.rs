//! Remote GPIO / counter-timer command host.
//!
//! Models a microcontroller-style board (pin descriptor table, a bank of
//! interrupt-driven counter/timer slots, a byte-addressed non-volatile
//! store) behind trait seams and exposes it to a remote peer through a
//! compact newline-delimited text protocol (`key=arg0,arg1,...` with an
//! optional `:checksum` integrity suffix).

pub mod board;
pub mod config;
pub mod controller;
pub mod counters;
pub mod hal;
pub mod program;
pub mod protocol;
pub mod registry;
pub mod sim;
pub mod store;
pub mod transport;

pub use board::{BoardError, PinDescriptor, PinKind, PinMode, PinTable, MAX_PINS};
pub use config::{load_config, BoardProfile, ConfigError, HostConfig};
pub use controller::{Controller, ControllerError, ReplyBuf, REPLY_CAPACITY};
pub use counters::{BankError, CounterBank, SlotMode, Timing, DETACHED, MAX_SLOTS};
pub use hal::{Clock, Gpio, HalError, IrqHub, IsrHandler, NvMem, Trigger};
pub use program::ProgramSink;
pub use registry::{Action, CommandSpec, Registry};
pub use store::{ConfigRecord, ConfigStore, SlotRecord, StoreError, DEVICE_ID};
pub use transport::{ChannelConnection, ChannelRemote, Connection, LoopbackConnection, TransportKind};
