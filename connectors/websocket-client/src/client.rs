use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use punchcard_core::{
    config::TransportConfig,
    transport::{ConnectionStatus, DomainEvent, EventListener, PushTransport, Registrar, StatusListener},
};
use punchcard_proto::{Envelope, OutboundMessage, UserId};
use punchcard_signals::{Broadcast, Mut, Read, SubscriptionGuard};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use thiserror::Error;
use tokio::{
    net::TcpStream,
    select,
    sync::{mpsc, Notify},
    task::JoinHandle,
    time::sleep,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid server url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported url scheme {0:?}")]
    UnsupportedScheme(String),
}

struct Inner {
    server_url: Url,
    config: TransportConfig,
    status: Mut<ConnectionStatus>,
    events: Broadcast<DomainEvent>,
    registrar: Mutex<Registrar>,
    shutdown: Notify,
    shutdown_requested: AtomicBool,
}

impl Inner {
    fn registrar(&self) -> MutexGuard<'_, Registrar> { self.registrar.lock().unwrap_or_else(|p| p.into_inner()) }
}

/// Push transport over a WebSocket
pub struct WebsocketTransport {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl WebsocketTransport {
    /// Creates the transport without connecting. `http(s)` urls are mapped to `ws(s)`, and a
    /// url without a scheme is assumed to be `wss`.
    pub fn new(server_url: &str, config: TransportConfig) -> Result<Self, TransportError> {
        let server_url = Self::normalize_url(server_url)?;
        info!("Creating WebSocket transport for {}", server_url);

        Ok(Self {
            inner: Arc::new(Inner {
                server_url,
                config,
                status: Mut::new(ConnectionStatus::disconnected()),
                events: Broadcast::new(),
                registrar: Mutex::new(Registrar::default()),
                shutdown: Notify::new(),
                shutdown_requested: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
            started: AtomicBool::new(false),
        })
    }

    fn normalize_url(raw: &str) -> Result<Url, TransportError> {
        let with_scheme = if raw.contains("://") { raw.to_string() } else { format!("wss://{raw}") };
        let mut url = Url::parse(&with_scheme).map_err(|source| TransportError::InvalidUrl { url: raw.to_string(), source })?;
        let scheme = match url.scheme() {
            "ws" | "wss" => return Ok(url),
            "http" => "ws",
            "https" => "wss",
            other => return Err(TransportError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme).map_err(|()| TransportError::UnsupportedScheme(scheme.to_string()))?;
        Ok(url)
    }

    pub fn server_url(&self) -> &Url { &self.inner.server_url }

    pub fn is_connected(&self) -> bool { self.inner.status.with(|s| s.connected) }

    /// Resolves once connected. Starts connecting if nothing has yet.
    pub async fn wait_connected(&self) {
        self.connect();
        self.inner.status.read().wait_for(|s: &ConnectionStatus| s.connected).await
    }

    /// Closes the connection and stops reconnecting
    pub async fn shutdown(&self) {
        info!("Shutting down WebSocket transport");
        self.started.store(true, Ordering::Release);

        let task = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(task) = task {
            self.inner.shutdown_requested.store(true, Ordering::Release);
            self.inner.shutdown.notify_waiters();

            match task.await {
                Ok(()) => info!("WebSocket transport shutdown completed"),
                Err(e) => warn!("Connection task join error during shutdown: {}", e),
            }
        } else {
            info!("WebSocket transport was not running");
        }
    }

    /// Main connection loop with automatic reconnection
    async fn run_connection_loop(inner: Arc<Inner>) {
        let mut backoff = inner.config.initial_backoff;
        info!("Starting websocket connection loop to {}", inner.server_url);

        while !inner.shutdown_requested.load(Ordering::Acquire) {
            select! {
                _ = inner.shutdown.notified() => break,
                result = Self::connect_once(&inner) => {
                    let delay = match result {
                        Ok(()) => {
                            info!("Connection to {} closed", inner.server_url);
                            backoff = inner.config.initial_backoff;
                            backoff
                        }
                        Err(e) => {
                            error!("Connection to {} failed: {}", inner.server_url, e);
                            inner.status.set_if_changed(ConnectionStatus::failed(e.to_string()));
                            let delay = backoff;
                            backoff = inner.config.next_backoff(backoff);
                            delay
                        }
                    };
                    if inner.shutdown_requested.load(Ordering::Acquire) {
                        break;
                    }

                    info!("Reconnecting in {:?}", delay);
                    select! {
                        _ = inner.shutdown.notified() => break,
                        _ = sleep(delay) => {}
                    }
                }
            }
        }

        inner.registrar().disconnected();
        inner.status.set_if_changed(ConnectionStatus::disconnected());
        info!("Websocket connection loop stopped");
    }

    /// Attempt a single connection and serve it until it closes
    async fn connect_once(inner: &Arc<Inner>) -> anyhow::Result<()> {
        info!("Attempting to connect to {}", inner.server_url);
        let (ws_stream, _) = connect_async(inner.server_url.as_str()).await?;
        info!("WebSocket handshake completed with {}", inner.server_url);

        let (mut sink, mut stream) = ws_stream.split();
        let (link, mut outgoing) = mpsc::unbounded_channel();
        inner.status.set_if_changed(ConnectionStatus::connected());
        // queues the registration frame, if we know who we are
        inner.registrar().connected(link);

        let result = loop {
            select! {
                _ = inner.shutdown.notified() => {
                    debug!("Connection received shutdown signal");
                    let _ = sink.close().await;
                    break Ok(());
                }
                Some(message) = outgoing.recv() => {
                    if let Err(e) = Self::handle_outgoing_message(&mut sink, message).await {
                        break Err(e);
                    }
                }
                message = stream.next() => {
                    match Self::handle_incoming_message(inner, message, &mut sink).await {
                        Ok(MessageResult::Continue) => continue,
                        Ok(MessageResult::Break) => break Ok(()),
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        inner.registrar().disconnected();
        if result.is_ok() {
            inner.status.set_if_changed(ConnectionStatus::disconnected());
        }
        result
    }

    async fn handle_outgoing_message(sink: &mut WsSink, message: OutboundMessage) -> anyhow::Result<()> {
        match message.encode() {
            Ok(text) => {
                sink.send(Message::Text(text.into())).await?;
                debug!("Sent {:?}", message);
            }
            Err(e) => error!("Failed to serialize outgoing message: {}", e),
        }
        Ok(())
    }

    async fn handle_incoming_message(
        inner: &Arc<Inner>,
        msg: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
        sink: &mut WsSink,
    ) -> anyhow::Result<MessageResult> {
        match msg {
            Some(Ok(Message::Text(text))) => {
                match Envelope::decode(&text) {
                    Ok(envelope) => {
                        debug!("Received {} frame", envelope.kind);
                        inner.events.send(DomainEvent::received(envelope));
                    }
                    Err(e) => warn!("Dropping malformed frame: {}", e),
                }
                Ok(MessageResult::Continue)
            }
            Some(Ok(Message::Close(_))) => {
                info!("WebSocket connection closed by server");
                Ok(MessageResult::Break)
            }
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                if let Err(e) = sink.send(Message::Pong(data)).await {
                    warn!("Failed to send pong: {}", e);
                    return Err(e.into());
                }
                Ok(MessageResult::Continue)
            }
            Some(Ok(Message::Pong(_))) => {
                debug!("Received pong");
                Ok(MessageResult::Continue)
            }
            Some(Ok(Message::Binary(data))) => {
                debug!("Ignoring {} byte binary frame", data.len());
                Ok(MessageResult::Continue)
            }
            Some(Ok(_)) => {
                debug!("Received other message type");
                Ok(MessageResult::Continue)
            }
            Some(Err(e)) => {
                error!("WebSocket error: {}", e);
                Err(e.into())
            }
            None => {
                info!("WebSocket stream closed");
                Ok(MessageResult::Break)
            }
        }
    }
}

impl PushTransport for WebsocketTransport {
    fn connect(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let task = runtime.spawn(Self::run_connection_loop(self.inner.clone()));
                *self.task.lock().unwrap_or_else(|p| p.into_inner()) = Some(task);
            }
            Err(e) => {
                error!("Cannot connect outside of a tokio runtime: {}", e);
                self.inner.status.set_if_changed(ConnectionStatus::failed(e.to_string()));
                self.started.store(false, Ordering::Release);
            }
        }
    }

    fn status(&self) -> Read<ConnectionStatus> { self.inner.status.read() }

    fn on_connection_change(&self, listener: StatusListener) -> SubscriptionGuard {
        let guard = self.inner.status.read().subscribe_now(move |status: ConnectionStatus| listener(status));
        self.connect();
        guard.into()
    }

    fn on_event(&self, listener: EventListener) -> SubscriptionGuard {
        let guard = self.inner.events.listen(move |event: DomainEvent| listener(event));
        self.connect();
        guard.into()
    }

    fn set_user_id(&self, user_id: UserId) { self.inner.registrar().set_user_id(user_id); }
}

#[derive(Debug)]
enum MessageResult {
    Continue,
    Break,
}

impl Drop for WebsocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().ok().and_then(|task| task.take()) {
            debug!("WebSocket transport dropped, requesting shutdown");
            self.inner.shutdown_requested.store(true, Ordering::Release);
            self.inner.shutdown.notify_waiters();
            task.abort();
        }
    }
}
