use std::{sync::Arc, time::Duration};

use anyhow::Result;
use punchcard_connector_local_process::{pair, LocalPushServer};
use punchcard_core::{config::WalletConfig, WalletRuntime};
use punchcard_proto::{CardDto, CardStatus, LoyaltyEvent, LoyaltyEventType, UserId};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::presenter::{render, HeadlessPresenter};

pub const DEMO_USER: &str = "demo-user";

/// Plays a short scripted session against an in-process server: punches that arrive
/// together with a new card, a completed card, a dropped connection and a redemption
pub async fn run(user_id: UserId, config: WalletConfig, animation: Duration) -> Result<()> {
    let (server, transport) = pair();
    let runtime = WalletRuntime::new(Arc::new(transport), config);
    let _presenter = HeadlessPresenter::start(runtime.presentation(), animation);

    let rejected = runtime.load_cards(vec![CardDto::new("coffee", 3, 5), CardDto::new("bagel", 9, 10)]);
    if !rejected.is_empty() {
        warn!("{} seed cards rejected", rejected.len());
    }
    runtime.login(user_id.clone());
    info!("server registrations: {:?}", server.registrations());

    let script = [
        (0, LoyaltyEventType::PunchAdded, CardDto::new("coffee", 4, 5)),
        (200, LoyaltyEventType::CardCreated, CardDto::new("sandwich", 0, 8)),
        (300, LoyaltyEventType::PunchAdded, CardDto::new("bagel", 10, 10)),
    ];
    for (delay, event_type, card) in script {
        sleep(Duration::from_millis(delay)).await;
        push(&server, &user_id, event_type, card)?;
    }
    // addressed to someone else; the wallet must not react
    push(&server, &UserId::from("someone-else"), LoyaltyEventType::PunchAdded, CardDto::new("coffee", 5, 5))?;
    runtime.sequencer().wait_idle().await;

    server.go_offline();
    sleep(Duration::from_millis(500)).await;
    server.go_online();
    info!("server registrations after reconnect: {:?}", server.registrations());

    push(&server, &user_id, LoyaltyEventType::RewardRedeemed, CardDto::new("bagel", 10, 10).with_status(CardStatus::RewardRedeemed))?;
    runtime.sequencer().wait_idle().await;

    info!("final cards: {}", render(&runtime.presentation().cards()));
    runtime.shutdown().await;
    Ok(())
}

fn push(server: &LocalPushServer, user_id: &UserId, event_type: LoyaltyEventType, punch_card: CardDto) -> Result<()> {
    info!("server pushes {} for {} to {}", event_type, punch_card.id, user_id);
    if !server.push_loyalty(LoyaltyEvent { event_type, user_id: user_id.clone(), punch_card })? {
        warn!("event lost: transport not connected");
    }
    Ok(())
}
