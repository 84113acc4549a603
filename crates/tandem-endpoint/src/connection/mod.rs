//! The seam between an endpoint runtime and its transport.
//!
//! [`channel`] returns two halves. The runtime owns the
//! [`ConnectionAdapter`]: it pushes [`TransportCommand`]s and drains
//! [`TransportEvent`]s. A transport driver owns the [`TransportHandle`]:
//! it executes commands against the real socket and reports what happened.
//!
//! Both directions are unbounded queues drained by a single task, so
//! `send_text` never blocks and frames leave in the order they were sent.

pub mod memory;
pub mod websocket;

use tandem_core::TransportError;
use tokio::sync::mpsc;

/// Something the transport observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established. Emitted at most once.
    Opened,
    /// One inbound text frame.
    Message(String),
    /// A connection-scoped failure.
    Error(TransportError),
    /// The connection is gone. Emitted at most once, always last.
    Closed,
}

/// Something the runtime wants the transport to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCommand {
    /// Write one text frame.
    SendText(String),
    /// Start closing the connection.
    Close,
}

/// Runtime-side half of a connection.
#[derive(Debug)]
pub struct ConnectionAdapter {
    commands: mpsc::UnboundedSender<TransportCommand>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl ConnectionAdapter {
    /// Queue one text frame for the transport.
    pub fn send_text(&self, frame: String) -> Result<(), TransportError> {
        self.commands
            .send(TransportCommand::SendText(frame))
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Ask the transport to close. A transport that is already gone is fine.
    pub fn close(&self) {
        let _ = self.commands.send(TransportCommand::Close);
    }

    /// Whether the transport side has been dropped.
    pub fn is_detached(&self) -> bool {
        self.commands.is_closed()
    }

    /// Take the event stream. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events.take()
    }
}

/// Transport-side half of a connection.
///
/// Enforces the event contract: `Opened` and `Closed` at most once each,
/// and nothing after `Closed`.
#[derive(Debug)]
pub struct TransportHandle {
    events: mpsc::UnboundedSender<TransportEvent>,
    commands: mpsc::UnboundedReceiver<TransportCommand>,
    opened: bool,
    closed: bool,
}

impl TransportHandle {
    fn emit(&self, event: TransportEvent) {
        // The runtime may already be gone; nothing to deliver to.
        let _ = self.events.send(event);
    }

    /// Report that the connection is established.
    pub fn opened(&mut self) {
        if self.opened || self.closed {
            return;
        }
        self.opened = true;
        self.emit(TransportEvent::Opened);
    }

    /// Report one inbound text frame.
    pub fn message(&self, text: String) {
        if !self.closed {
            self.emit(TransportEvent::Message(text));
        }
    }

    /// Report a connection-scoped failure.
    pub fn error(&self, error: TransportError) {
        if !self.closed {
            self.emit(TransportEvent::Error(error));
        }
    }

    /// Report that the connection is gone.
    pub fn closed(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.emit(TransportEvent::Closed);
    }

    /// Whether `closed` has been reported.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next command from the runtime. `None` once the adapter is dropped.
    pub async fn next_command(&mut self) -> Option<TransportCommand> {
        self.commands.recv().await
    }

    /// Next already-queued command, without waiting.
    pub fn try_next_command(&mut self) -> Option<TransportCommand> {
        self.commands.try_recv().ok()
    }
}

/// Create a connected adapter/handle pair.
pub fn channel() -> (ConnectionAdapter, TransportHandle) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (
        ConnectionAdapter {
            commands: command_tx,
            events: Some(event_rx),
        },
        TransportHandle {
            events: event_tx,
            commands: command_rx,
            opened: false,
            closed: false,
        },
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
