//! Turns push events into card updates and animation timelines.
//!
//! The router is the only writer of the cards' business fields. It never schedules anything
//! itself: every visual it wants played goes into a plan, and the whole plan is handed to the
//! [`Sequencer`] as one timeline.

mod plan;

use std::sync::{Arc, Mutex};

use punchcard_proto::{CardDto, CardId, CardStatus, InvalidCard, LoyaltyEvent, LoyaltyEventType, UserId};
use punchcard_signals::SubscriptionGuard;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    card::{CardCollection, Staged, Upserted},
    config::RouterConfig,
    error::Ignored,
    sequencer::{Generation, Sequencer, SequencerSnapshot},
    transport::{DomainEvent, PushTransport},
};
use plan::{SharedPlan, Visual};

/// What the router did with a relevant event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub event: LoyaltyEventType,
    pub card: CardId,
    /// The timeline that now carries the event's animations, if the event added any
    pub timeline: Option<Generation>,
}

#[derive(Clone)]
pub struct DomainEventRouter {
    inner: Arc<Inner>,
}

struct Inner {
    cards: CardCollection,
    sequencer: Sequencer,
    config: RouterConfig,
    session: Mutex<Option<UserId>>,
    plan: SharedPlan,
    subscriptions: Mutex<Vec<SubscriptionGuard>>,
}

impl DomainEventRouter {
    /// Creates a router fed by `transport`'s event stream. Events are routed in the order the
    /// transport delivers them, on the transport's delivery thread.
    pub fn attach(transport: &dyn PushTransport, cards: CardCollection, sequencer: Sequencer, config: RouterConfig) -> Self {
        let router = Self::new(cards, sequencer, config);
        let inner = Arc::downgrade(&router.inner);
        let events = transport.on_event(Box::new(move |event: DomainEvent| {
            if let Some(inner) = inner.upgrade() {
                let _ = inner.route(&event);
            }
        }));
        router.inner.hold(events);
        router
    }

    /// Creates a router that only sees events passed to [`DomainEventRouter::handle_event`]
    pub fn new(cards: CardCollection, sequencer: Sequencer, config: RouterConfig) -> Self {
        let inner = Arc::new(Inner {
            cards,
            sequencer,
            config,
            session: Mutex::new(None),
            plan: SharedPlan::new(),
            subscriptions: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&inner);
        let settle = inner.sequencer.state().subscribe(move |snapshot: SequencerSnapshot| {
            if let Some(inner) = weak.upgrade() {
                inner.settle(&snapshot);
            }
        });
        inner.hold(settle.into());

        Self { inner }
    }

    /// Sets (or clears) the user whose events are relevant
    pub fn set_session_user(&self, user_id: Option<UserId>) {
        let mut session = self.inner.session.lock().unwrap_or_else(|p| p.into_inner());
        if *session != user_id {
            info!("router session user: {:?}", user_id.as_ref().map(UserId::as_str));
            *session = user_id;
        }
    }

    pub fn session_user(&self) -> Option<UserId> { self.inner.session.lock().unwrap_or_else(|p| p.into_inner()).clone() }

    /// Routes a single event. Irrelevant events are dropped with a debug log and reported
    /// as `Err`; they never touch the cards or the sequencer.
    pub fn handle_event(&self, event: &DomainEvent) -> Result<Routed, Ignored> { self.inner.route(event) }

    /// Seeds the cards from an initial fetch, without animation
    pub fn load_cards(&self, cards: Vec<CardDto>) -> Vec<InvalidCard> {
        let count = cards.len();
        let rejected = self.inner.cards.load(cards);
        for invalid in &rejected {
            warn!("skipping card from initial fetch: {}", invalid);
        }
        info!("loaded {} of {} cards", count - rejected.len(), count);
        rejected
    }

    /// Abandons whatever is playing. Cards that were waiting to be revealed are shown and
    /// all animation flags are cleared.
    pub fn stop(&self) { self.inner.sequencer.stop() }

    pub fn cards(&self) -> &CardCollection { &self.inner.cards }
}

impl Inner {
    fn hold(&self, subscription: SubscriptionGuard) { self.subscriptions.lock().unwrap_or_else(|p| p.into_inner()).push(subscription); }

    fn route(&self, event: &DomainEvent) -> Result<Routed, Ignored> {
        let result = self.apply(event);
        match &result {
            Ok(routed) => debug!("routed {} for card {} (timeline: {:?})", routed.event, routed.card, routed.timeline),
            Err(reason) => debug!("ignoring {} event: {}", event.kind, reason),
        }
        result
    }

    fn apply(&self, event: &DomainEvent) -> Result<Routed, Ignored> {
        let session = self.session.lock().unwrap_or_else(|p| p.into_inner()).clone().ok_or(Ignored::NoSession)?;
        let LoyaltyEvent { event_type, user_id, punch_card } = LoyaltyEvent::from_payload(&event.kind, &event.payload)?;
        if user_id != session {
            return Err(Ignored::OtherUser);
        }

        let visuals = match event_type {
            LoyaltyEventType::PunchAdded => self.punch_added(&punch_card)?,
            LoyaltyEventType::CardCreated => self.card_created(&punch_card)?,
            LoyaltyEventType::RewardRedeemed => self.reward_redeemed(&punch_card)?,
        };
        Ok(Routed { event: event_type, timeline: self.play(visuals), card: punch_card.id })
    }

    fn punch_added(&self, dto: &CardDto) -> Result<Vec<Visual>, Ignored> {
        let (punched, completed) = match self.cards.upsert(dto)? {
            Upserted::Inserted { status } => (dto.current_punches > 0, status == CardStatus::RewardReady),
            Upserted::Updated { previous_punches, previous_status, status } => {
                (dto.current_punches > previous_punches, status == CardStatus::RewardReady && previous_status != CardStatus::RewardReady)
            }
            // not on screen yet; its reveal shows the latest punches
            Upserted::Staged => (false, false),
        };

        let mut visuals = Vec::new();
        if punched {
            visuals.push(Visual::Punch { card: dto.id.clone(), punch_index: dto.current_punches - 1 });
        }
        if completed {
            visuals.push(Visual::Highlight { card: dto.id.clone() });
        }
        Ok(visuals)
    }

    fn card_created(&self, dto: &CardDto) -> Result<Vec<Visual>, Ignored> {
        Ok(match self.cards.stage(dto)? {
            Staged::New => vec![Visual::Reveal { card: dto.id.clone(), not_before: Instant::now() + self.config.reveal_grace }],
            Staged::Known => Vec::new(),
        })
    }

    fn reward_redeemed(&self, dto: &CardDto) -> Result<Vec<Visual>, Ignored> {
        let redeemed = CardDto { status: Some(CardStatus::RewardRedeemed), ..dto.clone() };
        if self.cards.is_staged(&dto.id) {
            self.cards.stage(&redeemed)?;
            return Ok(Vec::new());
        }
        if !self.cards.is_visible(&dto.id) {
            return Err(Ignored::UnknownCard(dto.id.clone()));
        }

        Ok(match self.cards.upsert(&redeemed)? {
            Upserted::Updated { previous_status, .. } if previous_status != CardStatus::RewardRedeemed => {
                vec![Visual::RewardClaimed { card: dto.id.clone() }, Visual::SlideOut { card: dto.id.clone() }]
            }
            _ => Vec::new(),
        })
    }

    /// Adds `visuals` to the plan and, if any were new, replaces the running timeline with
    /// one that plays the whole plan
    fn play(&self, visuals: Vec<Visual>) -> Option<Generation> {
        let mut plan = self.plan.lock();
        let mut added = false;
        for visual in visuals {
            added |= plan.push(visual);
        }
        if !added {
            return None;
        }

        let (shared, cards) = (self.plan.clone(), self.cards.clone());
        let generation = self.sequencer.enqueue_with(move || shared.build(&cards));
        plan.generation = Some(generation);
        Some(generation)
    }

    /// Runs whenever the sequencer state changes. Visuals are still pending when our timeline
    /// went idle (stopped) or a timeline we did not enqueue took its place; either way they will
    /// never play, so put the cards into their final state.
    fn settle(&self, snapshot: &SequencerSnapshot) {
        let (stopped, abandoned) = {
            let mut plan = self.plan.lock();
            let Some(ours) = plan.generation else { return };
            let replaced = snapshot.generation > ours;
            let stopped = snapshot.generation == ours && snapshot.is_idle();
            if !(replaced || stopped) || plan.is_empty() {
                return;
            }
            plan.generation = None;
            (stopped, plan.take())
        };

        for visual in &abandoned {
            match visual {
                Visual::Reveal { card, .. } => {
                    self.cards.reveal(card, |_| {});
                }
                Visual::SlideOut { card } => {
                    self.cards.remove(card);
                }
                Visual::Punch { card, .. } | Visual::Highlight { card } | Visual::RewardClaimed { card } => {
                    // a replacing timeline may already be animating other cards
                    if !stopped {
                        self.cards.clear_flags(card);
                    }
                }
            }
        }
        if stopped {
            self.cards.clear_all_flags();
        }
        info!("timeline {} abandoned with {} visuals pending; cards settled", snapshot.generation, abandoned.len());
    }
}
