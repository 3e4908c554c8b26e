//! An in-process push channel: a [`LocalPushServer`] handle that plays the server, and the
//! [`LocalTransport`] it is paired with.
//!
//! Everything is synchronous. A pushed event is delivered to the transport's listeners
//! before [`LocalPushServer::push`] returns, which keeps tests deterministic.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use punchcard_core::transport::{ConnectionStatus, DomainEvent, EventListener, PushTransport, Registrar, StatusListener};
use punchcard_proto::{Envelope, LoyaltyEvent, OutboundMessage, UserId, LOYALTY_EVENT_KIND};
use punchcard_signals::{Broadcast, Mut, Read, SubscriptionGuard};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

struct Shared {
    status: Mut<ConnectionStatus>,
    events: Broadcast<DomainEvent>,
    registrar: Mutex<Registrar>,
    link: mpsc::UnboundedSender<OutboundMessage>,
    received: Mutex<mpsc::UnboundedReceiver<OutboundMessage>>,
    /// the transport has asked to be connected
    wanted: AtomicBool,
    online: AtomicBool,
}

impl Shared {
    fn registrar(&self) -> MutexGuard<'_, Registrar> { self.registrar.lock().unwrap_or_else(|p| p.into_inner()) }

    fn establish(&self) {
        if !self.wanted.load(Ordering::Acquire) || !self.online.load(Ordering::Acquire) || self.status.with(|s| s.connected) {
            return;
        }
        self.registrar().connected(self.link.clone());
        self.status.set(ConnectionStatus::connected());
        info!("local transport connected");
    }
}

/// Creates a server and the transport that talks to it. The transport stays disconnected
/// until it is asked to connect.
pub fn pair() -> (LocalPushServer, LocalTransport) {
    let (link, received) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        status: Mut::new(ConnectionStatus::disconnected()),
        events: Broadcast::new(),
        registrar: Mutex::new(Registrar::default()),
        link,
        received: Mutex::new(received),
        wanted: AtomicBool::new(false),
        online: AtomicBool::new(true),
    });
    (LocalPushServer { shared: shared.clone() }, LocalTransport { shared })
}

/// The server end of a [`pair`]
#[derive(Clone)]
pub struct LocalPushServer {
    shared: Arc<Shared>,
}

impl LocalPushServer {
    /// Delivers a frame to the transport. Frames pushed while disconnected are lost, just as
    /// they would be on a real socket; returns whether it was delivered.
    pub fn push(&self, kind: &str, data: Vec<Value>) -> bool {
        if !self.is_connected() {
            debug!("dropping {} frame: transport not connected", kind);
            return false;
        }
        self.shared.events.send(DomainEvent::received(Envelope { kind: kind.to_string(), data }));
        true
    }

    pub fn push_loyalty(&self, event: LoyaltyEvent) -> anyhow::Result<bool> {
        let Envelope { kind, data } = event.into_envelope(LOYALTY_EVENT_KIND)?;
        Ok(self.push(&kind, data))
    }

    /// Drops the connection. The transport reconnects once the server is back online.
    pub fn go_offline(&self) {
        self.shared.online.store(false, Ordering::Release);
        self.shared.registrar().disconnected();
        self.shared.status.set_if_changed(ConnectionStatus::failed("server went away"));
        info!("local server offline");
    }

    pub fn go_online(&self) {
        self.shared.online.store(true, Ordering::Release);
        info!("local server online");
        self.shared.establish();
    }

    pub fn is_connected(&self) -> bool { self.shared.status.with(|s| s.connected) }

    /// Users registered since the last call, in the order the registrations arrived
    pub fn registrations(&self) -> Vec<UserId> {
        let mut received = self.shared.received.lock().unwrap_or_else(|p| p.into_inner());
        let mut users = Vec::new();
        while let Ok(OutboundMessage::RegisterUser { user_id }) = received.try_recv() {
            users.push(user_id);
        }
        users
    }
}

/// The client end of a [`pair`]
pub struct LocalTransport {
    shared: Arc<Shared>,
}

impl PushTransport for LocalTransport {
    fn connect(&self) {
        if !self.shared.wanted.swap(true, Ordering::AcqRel) {
            debug!("local transport connecting");
        }
        self.shared.establish();
    }

    fn status(&self) -> Read<ConnectionStatus> { self.shared.status.read() }

    fn on_connection_change(&self, listener: StatusListener) -> SubscriptionGuard {
        let guard = self.shared.status.read().subscribe_now(move |status: ConnectionStatus| listener(status));
        self.connect();
        guard.into()
    }

    fn on_event(&self, listener: EventListener) -> SubscriptionGuard {
        let guard = self.shared.events.listen(move |event: DomainEvent| listener(event));
        self.connect();
        guard.into()
    }

    fn set_user_id(&self, user_id: UserId) { self.shared.registrar().set_user_id(user_id); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use punchcard_proto::{CardDto, LoyaltyEventType};
    use std::sync::Mutex;

    #[test]
    fn connects_lazily_and_registers_once_per_connection() {
        let (server, transport) = pair();
        transport.set_user_id("u1".into());
        assert!(!server.is_connected());
        assert!(server.registrations().is_empty());

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let _status = {
            let statuses = statuses.clone();
            transport.on_connection_change(Box::new(move |status: ConnectionStatus| statuses.lock().unwrap().push(status.connected)))
        };
        assert!(server.is_connected());
        assert_eq!(server.registrations(), [UserId::from("u1")]);

        server.go_offline();
        server.go_online();
        assert_eq!(server.registrations(), [UserId::from("u1")]);
        assert_eq!(*statuses.lock().unwrap(), [false, true, false, true]);
    }

    #[test]
    fn events_are_delivered_in_push_order() {
        let (server, transport) = pair();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _events = {
            let seen = seen.clone();
            transport.on_event(Box::new(move |event: DomainEvent| seen.lock().unwrap().push(event.kind)))
        };

        assert!(server.push("first", vec![]));
        let punch = LoyaltyEvent { event_type: LoyaltyEventType::PunchAdded, user_id: "u1".into(), punch_card: CardDto::new("c1", 1, 5) };
        assert!(server.push_loyalty(punch).unwrap());
        server.go_offline();
        assert!(!server.push("lost", vec![]));

        assert_eq!(*seen.lock().unwrap(), ["first", LOYALTY_EVENT_KIND]);
    }
}
