//! Sorted fixed command table and message dispatch. Each command pairs a
//! short textual key with a tagged argument-shape descriptor and an
//! action the controller executes; a single generic parse-and-invoke
//! routine replaces per-arity handler plumbing.

use crate::controller::{Controller, ReplyBuf};
use crate::protocol::{self, ArgKind, ArgValue};

pub type CustomHandler = fn(&mut Controller, &[ArgValue], &mut ReplyBuf);

#[derive(Clone, Copy)]
pub enum Action {
    Attach,
    ConnParams,
    Detach,
    Info,
    Invalidate,
    LoadConfig,
    PinMode,
    ReadList,
    ReadPin,
    ResetSlot,
    SetAck,
    SetConnParams,
    SetPinMode,
    SlotStatus,
    SoftReset,
    StoreConfig,
    WriteList,
    WritePin,
    Custom(CustomHandler),
}

impl Action {
    /// Write-style commands have no reply of their own; they echo the
    /// bare key as acknowledgement when the ack flag is set. Custom
    /// commands are treated as read-style and manage their own replies.
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Action::ConnParams
                | Action::Info
                | Action::PinMode
                | Action::ReadList
                | Action::ReadPin
                | Action::SlotStatus
                | Action::Custom(_)
        )
    }
}

#[derive(Clone, Copy)]
pub struct CommandSpec {
    pub key: &'static str,
    pub shape: &'static [ArgKind],
    pub action: Action,
}

const NO_ARGS: &[ArgKind] = &[];
const ONE_BOOL: &[ArgKind] = &[ArgKind::Bool];
const ONE_U8: &[ArgKind] = &[ArgKind::U8];
const ONE_STR: &[ArgKind] = &[ArgKind::Str];
const PIN_MODE: &[ArgKind] = &[ArgKind::U8, ArgKind::U8];
const PIN_VALUE: &[ArgKind] = &[ArgKind::U8, ArgKind::U32];
const LIST_VALUE: &[ArgKind] = &[ArgKind::Str, ArgKind::U32];
const KIND_PARAMS: &[ArgKind] = &[ArgKind::U8, ArgKind::Str];
const ATTACH: &[ArgKind] = &[
    ArgKind::U8, // slot
    ArgKind::U8, // pin (0xFF detaches)
    ArgKind::U8, // operating mode: 0 counter, 1 timer
    ArgKind::U8, // trigger: 0 falling, 1 rising, 2 change, 3 low
    ArgKind::U8, // timing: 0 continuous, 1 one-shot
    ArgKind::U8, // report mode: 0 instantaneous, 1 latched
];

const BUILTINS: &[CommandSpec] = &[
    CommandSpec { key: "ack", shape: ONE_BOOL, action: Action::SetAck },
    CommandSpec { key: "atc", shape: ATTACH, action: Action::Attach },
    CommandSpec { key: "cnp", shape: NO_ARGS, action: Action::ConnParams },
    CommandSpec { key: "dtc", shape: ONE_U8, action: Action::Detach },
    CommandSpec { key: "inf", shape: NO_ARGS, action: Action::Info },
    CommandSpec { key: "inv", shape: NO_ARGS, action: Action::Invalidate },
    CommandSpec { key: "ldc", shape: NO_ARGS, action: Action::LoadConfig },
    CommandSpec { key: "pmd", shape: ONE_U8, action: Action::PinMode },
    CommandSpec { key: "rdl", shape: ONE_STR, action: Action::ReadList },
    CommandSpec { key: "rdp", shape: ONE_U8, action: Action::ReadPin },
    CommandSpec { key: "rse", shape: NO_ARGS, action: Action::SoftReset },
    CommandSpec { key: "rst", shape: ONE_U8, action: Action::ResetSlot },
    CommandSpec { key: "scp", shape: KIND_PARAMS, action: Action::SetConnParams },
    CommandSpec { key: "spm", shape: PIN_MODE, action: Action::SetPinMode },
    CommandSpec { key: "sto", shape: NO_ARGS, action: Action::StoreConfig },
    CommandSpec { key: "tms", shape: ONE_U8, action: Action::SlotStatus },
    CommandSpec { key: "wrl", shape: LIST_VALUE, action: Action::WriteList },
    CommandSpec { key: "wrp", shape: PIN_VALUE, action: Action::WritePin },
];

/// Immutable after construction: built-ins plus caller extensions,
/// sorted once by key because lookup is a binary search.
pub struct Registry {
    table: Vec<CommandSpec>,
}

pub enum Dispatch {
    /// Key matched and arguments converted.
    Matched(CommandSpec, Vec<ArgValue>),
    /// Key matched but the argument count or a conversion failed.
    ArityMismatch,
    /// No such key.
    Unknown,
}

impl Registry {
    pub fn new(extensions: Vec<CommandSpec>) -> Self {
        let mut table: Vec<CommandSpec> = BUILTINS.to_vec();
        table.extend(extensions);
        table.sort_by(|a, b| a.key.cmp(b.key));
        debug_assert!(
            table.windows(2).all(|w| w[0].key < w[1].key),
            "command keys must be unique"
        );
        Self { table }
    }

    pub fn lookup(&self, key: &str) -> Option<&CommandSpec> {
        self.table
            .binary_search_by(|spec| spec.key.cmp(key))
            .ok()
            .map(|idx| &self.table[idx])
    }

    /// Extract the leading key (up to the first `=` or end of line),
    /// locate it, and hand the remainder to the argument parser.
    pub fn dispatch(&self, line: &str) -> Dispatch {
        let (key, rest) = match line.split_once('=') {
            Some((key, rest)) => (key, rest),
            None => (line, ""),
        };
        let Some(spec) = self.lookup(key.trim()) else {
            return Dispatch::Unknown;
        };
        match protocol::parse_args(rest, spec.shape) {
            Some(args) => Dispatch::Matched(*spec, args),
            None => Dispatch::ArityMismatch,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
