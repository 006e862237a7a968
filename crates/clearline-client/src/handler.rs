//! Lifecycle and push callbacks.
//!
//! Callbacks run on the driver task, so they must not block. Implementations
//! that need to do real work should hand the event off, which is what
//! [`EventForwarder`] does.

use clearline_proto::payloads::{BalanceUpdate, ChannelUpdate, TransferNotification};
use tokio::sync::mpsc;

use crate::error::ClientError;

/// Receives connection lifecycle events and server pushes.
///
/// Every method defaults to a no-op.
pub trait ClientHandler: Send + Sync + 'static {
    /// Transport opened.
    fn on_open(&self) {}

    /// Link closed, whether requested or not.
    fn on_close(&self) {}

    /// Asynchronous failure not tied to a caller's request.
    fn on_error(&self, _error: &ClientError) {}

    /// Handshake succeeded; requests are now accepted.
    fn on_authenticated(&self) {}

    /// Authoritative balance snapshot for a channel.
    fn on_balance_update(&self, _update: &BalanceUpdate) {}

    /// Channel status changed.
    fn on_channel_update(&self, _update: &ChannelUpdate) {}

    /// A transfer touching one of our channels settled.
    fn on_transfer_notification(&self, _notification: &TransferNotification) {}
}

/// Handler that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl ClientHandler for NoopHandler {}

/// Owned copy of a handler callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// `on_open`
    Open,
    /// `on_close`
    Closed,
    /// `on_error`
    Error(ClientError),
    /// `on_authenticated`
    Authenticated,
    /// `on_balance_update`
    BalanceUpdate(BalanceUpdate),
    /// `on_channel_update`
    ChannelUpdate(ChannelUpdate),
    /// `on_transfer_notification`
    TransferNotification(TransferNotification),
}

/// Handler that forwards every callback into an unbounded channel.
#[derive(Debug, Clone)]
pub struct EventForwarder {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl EventForwarder {
    /// Forwarder plus the receiving end of its event stream.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: ClientEvent) {
        // Receiver gone means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

impl ClientHandler for EventForwarder {
    fn on_open(&self) {
        self.forward(ClientEvent::Open);
    }

    fn on_close(&self) {
        self.forward(ClientEvent::Closed);
    }

    fn on_error(&self, error: &ClientError) {
        self.forward(ClientEvent::Error(error.clone()));
    }

    fn on_authenticated(&self) {
        self.forward(ClientEvent::Authenticated);
    }

    fn on_balance_update(&self, update: &BalanceUpdate) {
        self.forward(ClientEvent::BalanceUpdate(update.clone()));
    }

    fn on_channel_update(&self, update: &ChannelUpdate) {
        self.forward(ClientEvent::ChannelUpdate(update.clone()));
    }

    fn on_transfer_notification(&self, notification: &TransferNotification) {
        self.forward(ClientEvent::TransferNotification(notification.clone()));
    }
}
