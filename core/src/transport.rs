//! The push channel as seen by the rest of the client.
//!
//! Implementations live in the connector crates; everything here is shared by them.

use chrono::{DateTime, Utc};
use punchcard_proto::{Envelope, OutboundMessage, UserId};
use punchcard_signals::{Read, SubscriptionGuard};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Connection status as reported to subscribers. Errors are reported here and never thrown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub error: Option<String>,
}

impl ConnectionStatus {
    pub fn connected() -> Self { Self { connected: true, error: None } }

    pub fn disconnected() -> Self { Self::default() }

    pub fn failed(error: impl Into<String>) -> Self { Self { connected: false, error: Some(error.into()) } }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.connected, &self.error) {
            (true, _) => write!(f, "connected"),
            (false, None) => write!(f, "disconnected"),
            (false, Some(error)) => write!(f, "disconnected ({error})"),
        }
    }
}

/// An inbound message, relevant or not
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    pub kind: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self { Self { kind: kind.into(), payload, received_at: Utc::now() } }

    /// Wraps a decoded frame, stamping it with the time of receipt
    pub fn received(envelope: Envelope) -> Self { Self::new(envelope.kind, Value::Array(envelope.data)) }
}

pub type StatusListener = Box<dyn Fn(ConnectionStatus) + Send + Sync + 'static>;
pub type EventListener = Box<dyn Fn(DomainEvent) + Send + Sync + 'static>;

/// A long-lived duplex connection to the server.
///
/// Connecting is lazy: the connection is established when the first listener registers
/// (or [`PushTransport::connect`] is called). Reconnection and re-registration after a drop
/// are the transport's own business.
pub trait PushTransport: Send + Sync {
    /// Starts connecting if not already started. Idempotent.
    fn connect(&self);

    fn status(&self) -> Read<ConnectionStatus>;

    /// Delivers the current status immediately, then every change
    fn on_connection_change(&self, listener: StatusListener) -> SubscriptionGuard;

    /// Delivers every inbound message in wire order
    fn on_event(&self, listener: EventListener) -> SubscriptionGuard;

    /// Records the identity to register. Registration is sent right away when connected,
    /// otherwise once immediately after the next successful connection, and again after
    /// every reconnect.
    fn set_user_id(&self, user_id: UserId);
}

/// Identity bookkeeping shared by transport implementations.
///
/// Registration is sent once per connection and identity pairing.
#[derive(Debug, Default)]
pub struct Registrar {
    user_id: Option<UserId>,
    link: Option<mpsc::UnboundedSender<OutboundMessage>>,
    registered: Option<UserId>,
}

impl Registrar {
    pub fn user_id(&self) -> Option<&UserId> { self.user_id.as_ref() }

    pub fn set_user_id(&mut self, user_id: UserId) {
        self.user_id = Some(user_id);
        self.flush();
    }

    /// A new connection is up; `link` carries frames to it
    pub fn connected(&mut self, link: mpsc::UnboundedSender<OutboundMessage>) {
        self.link = Some(link);
        self.registered = None;
        self.flush();
    }

    pub fn disconnected(&mut self) {
        self.link = None;
        self.registered = None;
    }

    fn flush(&mut self) {
        let (Some(user_id), Some(link)) = (&self.user_id, &self.link) else {
            return;
        };
        if self.registered.as_ref() == Some(user_id) {
            return;
        }
        if link.send(OutboundMessage::RegisterUser { user_id: user_id.clone() }).is_ok() {
            info!("registered user {}", user_id);
            self.registered = Some(user_id.clone());
        } else {
            debug!("connection closed before registration of {}", user_id);
            self.link = None;
        }
    }
}
