use std::{sync::Arc, time::Duration};

use anyhow::Result;
use punchcard_connector_local_process::{pair, LocalPushServer};
use punchcard_core::{
    card::LoyaltyCard,
    config::{SequencerConfig, WalletConfig},
    AnimationSignal, WalletRuntime,
};
use punchcard_proto::{CardDto, CardId, CardStatus, LoyaltyEventType::*, UserId};
use tokio::time::Instant;

mod common;
use common::*;

fn wallet(config: WalletConfig) -> (LocalPushServer, WalletRuntime) {
    let (server, transport) = pair();
    let runtime = WalletRuntime::new(Arc::new(transport), config);
    (server, runtime)
}

fn ids(cards: &[LoyaltyCard]) -> Vec<CardId> { cards.iter().map(|c| c.id.clone()).collect() }

#[tokio::test(start_paused = true)]
async fn test_punch_and_new_card_play_as_one_timeline() -> Result<()> {
    let (server, runtime) = wallet(WalletConfig::default());
    let presentation = runtime.presentation();
    runtime.load_cards(vec![CardDto::new("coffee", 3, 5)]);
    runtime.login("u1".into());
    let start = Instant::now();

    // a new card and a punch arrive close together
    server.push_loyalty(loyalty(CardCreated, "u1", CardDto::new("bagel", 0, 10)))?;
    server.push_loyalty(loyalty(PunchAdded, "u1", CardDto::new("coffee", 4, 5)))?;

    awaiting(runtime.sequencer(), AnimationSignal::PunchAnimationComplete).await;
    assert_eq!(ids(&presentation.cards()), [CardId::from("coffee")]);
    assert_eq!(presentation.cards()[0].animation.punch_animation.map(|p| p.punch_index), Some(3));
    presentation.animation_finished(AnimationSignal::PunchAnimationComplete);

    awaiting(runtime.sequencer(), AnimationSignal::SlideInAnimationComplete).await;
    assert!(start.elapsed() >= Duration::from_millis(2500));
    let cards = presentation.cards();
    assert_eq!(ids(&cards), [CardId::from("bagel"), CardId::from("coffee")]);
    assert!(cards[0].animation.slide_animation);
    assert!(cards[1].animation.is_clear());

    assert!(presentation.animation_finished_named("SLIDE_IN_ANIMATION_COMPLETE"));
    runtime.sequencer().wait_idle().await;
    assert!(presentation.cards().iter().all(|c| c.animation.is_clear()));

    runtime.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_replayed_events_do_not_replay_animations() -> Result<()> {
    let (server, runtime) = wallet(WalletConfig::default());
    runtime.login("u1".into());

    let created = loyalty(CardCreated, "u1", CardDto::new("bagel", 0, 10));
    server.push_loyalty(created.clone())?;
    server.push_loyalty(created)?;
    awaiting(runtime.sequencer(), AnimationSignal::SlideInAnimationComplete).await;
    runtime.presentation().animation_finished(AnimationSignal::SlideInAnimationComplete);
    runtime.sequencer().wait_idle().await;

    let generation = runtime.sequencer().state().get().generation;
    server.push_loyalty(loyalty(CardCreated, "u1", CardDto::new("bagel", 0, 10)))?;
    server.push_loyalty(loyalty(PunchAdded, "u1", CardDto::new("bagel", 0, 10)))?;

    assert_eq!(runtime.cards().visible().len(), 1);
    assert_eq!(runtime.sequencer().state().get().generation, generation);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_other_users_events_change_nothing() -> Result<()> {
    let (server, runtime) = wallet(WalletConfig::default());
    runtime.load_cards(vec![CardDto::new("c1", 3, 5)]);
    runtime.login("u2".into());

    server.push_loyalty(loyalty(PunchAdded, "u1", CardDto::new("c1", 4, 5)))?;
    server.push_loyalty(loyalty(CardCreated, "u1", CardDto::new("c9", 0, 5)))?;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let cards = runtime.cards().visible();
    assert_eq!(ids(&cards), [CardId::from("c1")]);
    assert_eq!(cards[0].current_punches, 3);
    assert!(cards[0].animation.is_clear());
    assert!(!runtime.cards().is_staged(&"c9".into()));
    assert!(runtime.sequencer().state().get().is_idle());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_completed_card_is_highlighted_then_redeemed() -> Result<()> {
    let (server, runtime) = wallet(WalletConfig::default());
    let presentation = runtime.presentation();
    runtime.load_cards(vec![CardDto::new("c1", 4, 5), CardDto::new("c2", 1, 5)]);
    runtime.login("u1".into());

    server.push_loyalty(loyalty(PunchAdded, "u1", CardDto::new("c1", 5, 5)))?;
    awaiting(runtime.sequencer(), AnimationSignal::PunchAnimationComplete).await;
    presentation.animation_finished(AnimationSignal::PunchAnimationComplete);
    awaiting(runtime.sequencer(), AnimationSignal::HighlightAnimationComplete).await;
    assert_eq!(runtime.cards().get(&"c1".into()).unwrap().status, CardStatus::RewardReady);
    presentation.animation_finished(AnimationSignal::HighlightAnimationComplete);
    runtime.sequencer().wait_idle().await;

    let redeemed = CardDto::new("c1", 5, 5).with_status(CardStatus::RewardRedeemed);
    server.push_loyalty(loyalty(RewardRedeemed, "u1", redeemed.clone()))?;
    awaiting(runtime.sequencer(), AnimationSignal::CompletionOverlayClosed).await;
    // the overlay is up; a replay of the same redemption must not queue it again
    let generation = runtime.sequencer().state().get().generation;
    server.push_loyalty(loyalty(RewardRedeemed, "u1", redeemed))?;
    assert_eq!(runtime.sequencer().state().get().generation, generation);

    presentation.overlay_closed();
    awaiting(runtime.sequencer(), AnimationSignal::SlideOutAnimationComplete).await;
    presentation.animation_finished(AnimationSignal::SlideOutAnimationComplete);
    runtime.sequencer().wait_idle().await;

    assert_eq!(ids(&presentation.cards()), [CardId::from("c2")]);
    runtime.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_unblocks_a_missing_signal() -> Result<()> {
    let config = WalletConfig { sequencer: SequencerConfig { signal_watchdog: Some(Duration::from_secs(2)) }, ..WalletConfig::default() };
    let (server, runtime) = wallet(config);
    runtime.load_cards(vec![CardDto::new("c1", 1, 5)]);
    runtime.login("u1".into());
    let start = Instant::now();

    // the presentation never reports the punch as finished
    server.push_loyalty(loyalty(PunchAdded, "u1", CardDto::new("c1", 2, 5)))?;
    runtime.sequencer().wait_idle().await;

    assert!(start.elapsed() >= Duration::from_secs(2));
    assert!(runtime.cards().get(&"c1".into()).unwrap().animation.is_clear());
    runtime.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_logout_settles_running_animations() -> Result<()> {
    let (server, runtime) = wallet(WalletConfig::default());
    runtime.load_cards(vec![CardDto::new("c1", 1, 5)]);
    runtime.login("u1".into());

    server.push_loyalty(loyalty(PunchAdded, "u1", CardDto::new("c1", 2, 5)))?;
    server.push_loyalty(loyalty(CardCreated, "u1", CardDto::new("c2", 0, 5)))?;
    awaiting(runtime.sequencer(), AnimationSignal::PunchAnimationComplete).await;

    runtime.logout();
    runtime.sequencer().wait_idle().await;

    let cards = runtime.cards().visible();
    assert_eq!(ids(&cards), [CardId::from("c2"), CardId::from("c1")]);
    assert!(cards.iter().all(|c| c.animation.is_clear()));

    // a late signal from the presentation has nothing to act on
    runtime.presentation().animation_finished(AnimationSignal::PunchAnimationComplete);
    server.push_loyalty(loyalty(PunchAdded, "u1", CardDto::new("c1", 3, 5)))?;
    assert_eq!(runtime.cards().get(&"c1".into()).unwrap().current_punches, 2);
    Ok(())
}

#[tokio::test]
async fn test_reconnect_registers_again_and_resumes_delivery() -> Result<()> {
    let (server, runtime) = wallet(WalletConfig::default());
    runtime.load_cards(vec![CardDto::new("c1", 1, 5)]);

    runtime.login("u1".into());
    assert_eq!(server.registrations(), [UserId::from("u1")]);

    server.go_offline();
    assert!(!runtime.connection_status().get().connected);
    assert!(!server.push_loyalty(loyalty(PunchAdded, "u1", CardDto::new("c1", 2, 5)))?);

    server.go_online();
    assert!(runtime.connection_status().get().connected);
    assert_eq!(server.registrations(), [UserId::from("u1")]);

    assert!(server.push_loyalty(loyalty(PunchAdded, "u1", CardDto::new("c1", 2, 5)))?);
    assert_eq!(runtime.cards().get(&"c1".into()).unwrap().current_punches, 2);
    runtime.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_runtime_connects_before_login_but_registers_on_login() -> Result<()> {
    let (server, runtime) = wallet(WalletConfig::default());
    assert!(server.is_connected());
    assert!(runtime.connection_status().get().connected);
    assert!(server.registrations().is_empty());

    // events before login are delivered but not routed
    assert!(server.push_loyalty(loyalty(CardCreated, "u1", CardDto::new("c1", 0, 5)))?);
    assert!(!runtime.cards().is_staged(&"c1".into()));

    runtime.login("u1".into());
    assert_eq!(server.registrations(), [UserId::from("u1")]);
    runtime.shutdown().await;
    Ok(())
}
