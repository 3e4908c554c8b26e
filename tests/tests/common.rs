use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use punchcard_core::{
    sequencer::{Sequencer, SequencerSnapshot},
    AnimationSignal, DomainEvent,
};
use punchcard_proto::{CardDto, LoyaltyEvent, LoyaltyEventType, LOYALTY_EVENT_KIND};
use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, Level};

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() { tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().init(); }

#[allow(unused)]
pub fn loyalty(event_type: LoyaltyEventType, user: &str, card: CardDto) -> LoyaltyEvent {
    LoyaltyEvent { event_type, user_id: user.into(), punch_card: card }
}

#[allow(unused)]
pub fn frame(event_type: LoyaltyEventType, user: &str, card: CardDto) -> String {
    loyalty(event_type, user, card).into_envelope(LOYALTY_EVENT_KIND).unwrap().encode().unwrap()
}

/// Resolves once the sequencer is waiting for `signal`
#[allow(unused)]
pub async fn awaiting(sequencer: &Sequencer, signal: AnimationSignal) {
    sequencer.state().wait_for(move |s: &SequencerSnapshot| s.waiting_for == Some(signal)).await
}

/// Collects delivered events for later inspection
#[allow(unused)]
pub fn event_watcher() -> (Box<dyn Fn(DomainEvent) + Send + Sync>, mpsc::UnboundedReceiver<DomainEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Box::new(move |event: DomainEvent| {
        let _ = tx.send(event);
    }), rx)
}

/// A bare WebSocket server that records what clients send and lets the test push frames
/// to, or hang up on, each accepted connection.
#[allow(unused)]
pub struct TestServer {
    pub url: String,
    connections: mpsc::UnboundedReceiver<TestConnection>,
    frames: mpsc::UnboundedReceiver<String>,
    task: JoinHandle<()>,
}

/// One accepted client. Dropping it closes the connection.
#[allow(unused)]
pub struct TestConnection {
    outgoing: mpsc::UnboundedSender<Message>,
}

#[allow(unused)]
impl TestServer {
    pub async fn start() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("ws://{}", listener.local_addr()?);
        let (connections_tx, connections) = mpsc::unbounded_channel();
        let (frames_tx, frames) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                let Ok(ws) = accept_async(stream).await else { continue };
                debug!("test server accepted {}", peer);
                let (mut sink, mut stream) = ws.split();
                let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel();
                if connections_tx.send(TestConnection { outgoing }).is_err() {
                    break;
                }
                let frames_tx = frames_tx.clone();
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            message = outgoing_rx.recv() => match message {
                                Some(message) => {
                                    if sink.send(message).await.is_err() {
                                        break;
                                    }
                                }
                                None => {
                                    let _ = sink.close().await;
                                    break;
                                }
                            },
                            incoming = stream.next() => match incoming {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = frames_tx.send(text.as_str().to_owned());
                                }
                                Some(Ok(_)) => {}
                                Some(Err(_)) | None => break,
                            },
                        }
                    }
                });
            }
        });

        Ok(Self { url, connections, frames, task })
    }

    pub async fn next_connection(&mut self) -> TestConnection {
        tokio::time::timeout(Duration::from_secs(5), self.connections.recv()).await.expect("client did not connect").expect("server stopped")
    }

    /// Next text frame sent by any client
    pub async fn next_frame(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.frames.recv()).await.expect("no frame from client").expect("server stopped")
    }

    /// Frames that arrived so far, without waiting
    pub fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

impl Drop for TestServer {
    fn drop(&mut self) { self.task.abort(); }
}

#[allow(unused)]
impl TestConnection {
    pub fn send_text(&self, text: impl Into<String>) {
        let text: String = text.into();
        self.outgoing.send(Message::Text(text.into())).unwrap();
    }
}

/// Records every value a listener is called with
#[allow(unused)]
pub fn recorder<T: Send + 'static>() -> (Box<dyn Fn(T) + Send + Sync>, Arc<Mutex<Vec<T>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = {
        let seen = seen.clone();
        Box::new(move |value: T| seen.lock().unwrap().push(value))
    };
    (record, seen)
}
