//! The `Connection` seam: the controller only ever sees whole text
//! frames; socket and serial mechanics live behind this trait. Receive
//! is non-blocking so the controller's poll cycle never stalls.

use std::collections::VecDeque;

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Serial,
    Wifi,
    Ethernet,
}

impl TransportKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TransportKind::Serial),
            1 => Some(TransportKind::Wifi),
            2 => Some(TransportKind::Ethernet),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            TransportKind::Serial => 0,
            TransportKind::Wifi => 1,
            TransportKind::Ethernet => 2,
        }
    }
}

pub trait Connection: Send {
    fn open(&mut self);
    fn close(&mut self);
    fn is_open(&self) -> bool;
    /// Hand one outbound frame to the transport.
    fn send(&mut self, frame: &str);
    /// One complete inbound frame, or `None` if nothing is pending.
    fn receive(&mut self) -> Option<String>;
    fn kind(&self) -> TransportKind;
    fn params(&self) -> String;
}

/// Channel-backed connection used by the TCP bridge in the binary: the
/// socket task feeds inbound lines through one channel and drains
/// outbound frames from the other.
pub struct ChannelConnection {
    kind: TransportKind,
    params: String,
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
    open: bool,
}

/// The transport-side ends of a [`ChannelConnection`].
pub struct ChannelRemote {
    pub line_tx: mpsc::UnboundedSender<String>,
    pub frame_rx: mpsc::UnboundedReceiver<String>,
}

impl ChannelConnection {
    pub fn endpoints(kind: TransportKind, params: &str) -> (Self, ChannelRemote) {
        let (line_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, frame_rx) = mpsc::unbounded_channel();
        (
            Self {
                kind,
                params: params.to_string(),
                inbound,
                outbound,
                open: false,
            },
            ChannelRemote { line_tx, frame_rx },
        )
    }
}

impl Connection for ChannelConnection {
    fn open(&mut self) {
        self.open = true;
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn send(&mut self, frame: &str) {
        if self.open && self.outbound.send(frame.to_string()).is_err() {
            tracing::warn!("outbound channel closed; frame dropped");
        }
    }

    fn receive(&mut self) -> Option<String> {
        if !self.open {
            return None;
        }
        self.inbound.try_recv().ok()
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn params(&self) -> String {
        self.params.clone()
    }
}

/// In-memory connection for tests: push inbound lines, collect replies.
#[derive(Default)]
pub struct LoopbackConnection {
    incoming: VecDeque<String>,
    outgoing: Vec<String>,
}

impl LoopbackConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) {
        self.incoming.push_back(line.to_string());
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }
}

impl Connection for LoopbackConnection {
    fn open(&mut self) {}

    fn close(&mut self) {}

    fn is_open(&self) -> bool {
        true
    }

    fn send(&mut self, frame: &str) {
        self.outgoing.push(frame.to_string());
    }

    fn receive(&mut self) -> Option<String> {
        self.incoming.pop_front()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn params(&self) -> String {
        "loopback".to_string()
    }
}
