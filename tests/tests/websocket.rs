use std::{sync::Arc, time::Duration};

use anyhow::Result;
use punchcard_core::{
    config::{TransportConfig, WalletConfig},
    AnimationSignal, ConnectionStatus, PushTransport, WalletRuntime,
};
use punchcard_proto::{CardDto, LoyaltyEvent, LoyaltyEventType, OutboundMessage, UserId};
use punchcard_websocket_client::WebsocketTransport;
use tracing::info;

mod common;
use common::*;

fn fast_reconnect() -> TransportConfig { TransportConfig { initial_backoff: Duration::from_millis(50), max_backoff: Duration::from_millis(200) } }

fn registration(frame: &str) -> UserId {
    match OutboundMessage::decode(frame).unwrap() {
        OutboundMessage::RegisterUser { user_id } => user_id,
    }
}

#[tokio::test]
async fn test_registration_is_deferred_until_connected() -> Result<()> {
    let mut server = TestServer::start().await?;
    let transport = WebsocketTransport::new(&server.url, fast_reconnect())?;

    // identity before any connection exists
    transport.set_user_id("u1".into());
    assert!(!transport.is_connected());

    let (watch, _events) = event_watcher();
    let _guard = transport.on_event(watch);
    let _connection = server.next_connection().await;

    assert_eq!(registration(&server.next_frame().await), UserId::from("u1"));
    transport.wait_connected().await;

    // nothing further is sent for the same identity on the same connection
    transport.set_user_id("u1".into());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.drain_frames().is_empty());

    // a new identity is sent straight away
    transport.set_user_id("u2".into());
    assert_eq!(registration(&server.next_frame().await), UserId::from("u2"));

    transport.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_events_arrive_in_wire_order() -> Result<()> {
    let mut server = TestServer::start().await?;
    let transport = WebsocketTransport::new(&server.url, fast_reconnect())?;

    let (watch, mut events) = event_watcher();
    let _guard = transport.on_event(watch);
    let connection = server.next_connection().await;
    transport.wait_connected().await;

    connection.send_text(frame(LoyaltyEventType::PunchAdded, "u1", CardDto::new("c1", 1, 5)));
    connection.send_text("not a frame");
    connection.send_text(r#"{"kind":"presence","data":[]}"#);
    connection.send_text(frame(LoyaltyEventType::CardCreated, "u1", CardDto::new("c2", 0, 8)));

    let mut kinds = Vec::new();
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv()).await?.expect("transport dropped the listener");
        kinds.push(event.kind.clone());
        if event.kind != "presence" {
            let loyalty = LoyaltyEvent::from_payload(&event.kind, &event.payload)?;
            info!("received {} for {}", loyalty.event_type, loyalty.punch_card.id);
        }
    }
    // the malformed frame is skipped, not fatal
    assert_eq!(kinds, ["loyalty_event", "presence", "loyalty_event"]);
    assert!(transport.is_connected());

    transport.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_reconnect_registers_again() -> Result<()> {
    let mut server = TestServer::start().await?;
    let transport = WebsocketTransport::new(&server.url, fast_reconnect())?;
    transport.set_user_id("u1".into());

    let (record, statuses) = recorder::<ConnectionStatus>();
    let _guard = transport.on_connection_change(record);

    let first = server.next_connection().await;
    assert_eq!(registration(&server.next_frame().await), UserId::from("u1"));
    transport.wait_connected().await;

    // server hangs up; the transport reconnects on its own
    drop(first);
    let _second = server.next_connection().await;
    assert_eq!(registration(&server.next_frame().await), UserId::from("u1"));
    transport.wait_connected().await;

    let connected: Vec<bool> = statuses.lock().unwrap().iter().map(|s| s.connected).collect();
    assert_eq!(connected.first(), Some(&false));
    assert_eq!(connected.iter().filter(|c| **c).count(), 2);
    assert_eq!(connected.last(), Some(&true));

    transport.shutdown().await;
    assert_eq!(transport.status().get(), ConnectionStatus::disconnected());
    Ok(())
}

#[tokio::test]
async fn test_pushed_punch_reaches_the_cards() -> Result<()> {
    let mut server = TestServer::start().await?;
    let transport = Arc::new(WebsocketTransport::new(&server.url, fast_reconnect())?);
    let runtime = WalletRuntime::new(transport.clone(), WalletConfig::default());
    runtime.load_cards(vec![CardDto::new("c1", 2, 5)]);

    runtime.login("u1".into());
    let connection = server.next_connection().await;
    assert_eq!(registration(&server.next_frame().await), UserId::from("u1"));

    connection.send_text(frame(LoyaltyEventType::PunchAdded, "u2", CardDto::new("c1", 4, 5)));
    connection.send_text(frame(LoyaltyEventType::PunchAdded, "u1", CardDto::new("c1", 3, 5)));
    awaiting(runtime.sequencer(), AnimationSignal::PunchAnimationComplete).await;

    let card = runtime.cards().get(&"c1".into()).unwrap();
    assert_eq!(card.current_punches, 3);
    assert_eq!(card.animation.punch_animation.map(|p| p.punch_index), Some(2));

    runtime.presentation().animation_finished(AnimationSignal::PunchAnimationComplete);
    runtime.sequencer().wait_idle().await;
    assert!(runtime.cards().get(&"c1".into()).unwrap().animation.is_clear());

    runtime.shutdown().await;
    transport.shutdown().await;
    Ok(())
}
