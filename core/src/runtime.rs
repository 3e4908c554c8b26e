use std::sync::Arc;

use punchcard_proto::{CardDto, InvalidCard, UserId};
use punchcard_signals::{ListenerGuard, Read};
use tracing::info;

use crate::{
    animation::AnimationSignal,
    card::{CardCollection, CardSet, LoyaltyCard},
    config::WalletConfig,
    router::DomainEventRouter,
    sequencer::Sequencer,
    transport::{ConnectionStatus, PushTransport},
};

/// The wallet's client core, wired together: transport events feed the router, the router
/// drives the sequencer, the sequencer animates the cards.
pub struct WalletRuntime {
    transport: Arc<dyn PushTransport>,
    cards: CardCollection,
    sequencer: Sequencer,
    router: DomainEventRouter,
}

impl WalletRuntime {
    /// Must be called from within a tokio runtime. Subscribing the router to the transport's
    /// events opens the connection; identity is only registered by [`WalletRuntime::login`].
    pub fn new(transport: Arc<dyn PushTransport>, config: WalletConfig) -> Self {
        let cards = CardCollection::new();
        let sequencer = Sequencer::new(config.sequencer);
        let router = DomainEventRouter::attach(transport.as_ref(), cards.clone(), sequencer.clone(), config.router);
        Self { transport, cards, sequencer, router }
    }

    /// Starts routing `user_id`'s events and registers the identity with the server,
    /// connecting if necessary
    pub fn login(&self, user_id: UserId) {
        info!("login as {}", user_id);
        self.router.set_session_user(Some(user_id.clone()));
        self.transport.set_user_id(user_id);
        self.transport.connect();
    }

    /// Stops routing events and abandons any running animation
    pub fn logout(&self) {
        info!("logout");
        self.router.set_session_user(None);
        self.router.stop();
    }

    pub fn load_cards(&self, cards: Vec<CardDto>) -> Vec<InvalidCard> { self.router.load_cards(cards) }

    pub fn cards(&self) -> &CardCollection { &self.cards }

    pub fn sequencer(&self) -> &Sequencer { &self.sequencer }

    pub fn router(&self) -> &DomainEventRouter { &self.router }

    pub fn connection_status(&self) -> Read<ConnectionStatus> { self.transport.status() }

    pub fn presentation(&self) -> PresentationBridge { PresentationBridge { cards: self.cards.clone(), sequencer: self.sequencer.clone() } }

    pub async fn shutdown(&self) {
        self.router.stop();
        self.sequencer.shutdown().await;
        info!("wallet runtime shut down");
    }
}

/// What a presentation layer gets to see and do: read the cards, and report animations
/// that have finished playing
#[derive(Clone)]
pub struct PresentationBridge {
    cards: CardCollection,
    sequencer: Sequencer,
}

impl PresentationBridge {
    pub fn cards(&self) -> Vec<LoyaltyCard> { self.cards.visible() }

    /// Calls `listener` with the visible cards now and after every change
    pub fn watch(&self, listener: impl Fn(Vec<LoyaltyCard>) + Send + Sync + 'static) -> ListenerGuard<CardSet> { self.cards.subscribe(listener) }

    pub fn animation_finished(&self, signal: AnimationSignal) { self.sequencer.signal(signal) }

    /// Same as [`PresentationBridge::animation_finished`] for callers that only have the
    /// signal's wire name. Returns false for names that are not part of the vocabulary.
    pub fn animation_finished_named(&self, name: &str) -> bool { self.sequencer.dispatch(name) }

    pub fn overlay_closed(&self) { self.animation_finished(AnimationSignal::CompletionOverlayClosed) }
}
