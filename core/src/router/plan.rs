use std::sync::{Arc, Mutex, MutexGuard};

use punchcard_proto::CardId;
use tokio::time::Instant;

use crate::{
    animation::AnimationSignal,
    card::{AnimationFlags, CardCollection, PunchAnimation},
    error::EffectError,
    sequencer::{ActionStep, Generation, SequenceItem},
};

/// One visual the router wants played
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Visual {
    Punch { card: CardId, punch_index: u32 },
    Highlight { card: CardId },
    /// Slide a staged card in, not before `not_before`
    Reveal { card: CardId, not_before: Instant },
    RewardClaimed { card: CardId },
    SlideOut { card: CardId },
}

impl Visual {
    fn same_as(&self, other: &Visual) -> bool {
        match (self, other) {
            (Visual::Reveal { card: a, .. }, Visual::Reveal { card: b, .. }) => a == b,
            (a, b) => a == b,
        }
    }
}

/// Visuals that have been requested but not yet played out, in play order.
///
/// Every new request re-enqueues the whole plan, which is how events that arrive close
/// together end up in a single timeline instead of replacing each other.
#[derive(Debug, Default)]
pub(crate) struct Plan {
    pending: Vec<(u64, Visual)>,
    next_id: u64,
    /// Generation of the timeline that carries the current plan
    pub(crate) generation: Option<Generation>,
}

impl Plan {
    /// Adds a visual unless an equivalent one is already pending. Reveals always play
    /// last so a new card never slides in on top of another card's animation.
    pub(crate) fn push(&mut self, visual: Visual) -> bool {
        if self.pending.iter().any(|(_, v)| v.same_as(&visual)) {
            return false;
        }
        self.next_id += 1;
        let at = match visual {
            Visual::Reveal { .. } => self.pending.len(),
            _ => self.pending.iter().position(|(_, v)| matches!(v, Visual::Reveal { .. })).unwrap_or(self.pending.len()),
        };
        self.pending.insert(at, (self.next_id, visual));
        true
    }

    pub(crate) fn complete(&mut self, id: u64) { self.pending.retain(|(pending, _)| *pending != id); }

    pub(crate) fn is_empty(&self) -> bool { self.pending.is_empty() }

    pub(crate) fn take(&mut self) -> Vec<Visual> { std::mem::take(&mut self.pending).into_iter().map(|(_, v)| v).collect() }

    #[cfg(test)]
    pub(crate) fn visuals(&self) -> Vec<Visual> { self.pending.iter().map(|(_, v)| v.clone()).collect() }
}

#[derive(Clone)]
pub(crate) struct SharedPlan(Arc<Mutex<Plan>>);

impl SharedPlan {
    pub(crate) fn new() -> Self { Self(Arc::new(Mutex::new(Plan::default()))) }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Plan> { self.0.lock().unwrap_or_else(|p| p.into_inner()) }

    /// Turns the pending visuals into a timeline. Each visual's last step marks it
    /// complete once it has played out.
    pub(crate) fn build(&self, cards: &CardCollection) -> Vec<SequenceItem> {
        let pending = self.lock().pending.clone();
        let mut items = Vec::new();
        for (id, visual) in pending {
            self.steps_for(id, visual, cards, &mut items);
        }
        items
    }

    fn steps_for(&self, id: u64, visual: Visual, cards: &CardCollection, items: &mut Vec<SequenceItem>) {
        match visual {
            Visual::Punch { card, punch_index } => {
                let punch = PunchAnimation { punch_index };
                items.push(
                    self.flag_step(id, format!("punch {card} #{punch_index}"), cards, card, AnimationSignal::PunchAnimationComplete, move |flags, on| {
                        let value = on.then_some(punch);
                        // only clear our own punch, a newer one may have replaced it
                        if !on && flags.punch_animation != Some(punch) {
                            return false;
                        }
                        std::mem::replace(&mut flags.punch_animation, value) != value
                    })
                    .into(),
                )
            }
            Visual::Highlight { card } => items.push(
                self.flag_step(id, format!("highlight {card}"), cards, card, AnimationSignal::HighlightAnimationComplete, |flags, on| {
                    std::mem::replace(&mut flags.highlighted, on) != on
                })
                .into(),
            ),
            Visual::Reveal { card, not_before } => {
                let remaining = not_before.saturating_duration_since(Instant::now());
                if !remaining.is_zero() {
                    items.push(SequenceItem::TimedWait(remaining));
                }
                items.push(self.reveal_step(id, card, cards).into());
            }
            Visual::RewardClaimed { card } => items.push(
                self.flag_step(id, format!("reward claimed {card}"), cards, card, AnimationSignal::CompletionOverlayClosed, |flags, on| {
                    std::mem::replace(&mut flags.reward_claimed_animation, on) != on
                })
                .into(),
            ),
            Visual::SlideOut { card } => items.push(self.slide_out_step(id, card, cards).into()),
        }
    }

    /// A step that raises a flag, waits for `signal` and lowers the flag again.
    /// `toggle(flags, on)` sets the flag and returns whether anything changed.
    fn flag_step(
        &self,
        id: u64,
        label: String,
        cards: &CardCollection,
        card: CardId,
        signal: AnimationSignal,
        toggle: impl Fn(&mut AnimationFlags, bool) -> bool + Send + Sync + Clone + 'static,
    ) -> ActionStep {
        let (raise_cards, raise_card, raise) = (cards.clone(), card.clone(), toggle.clone());
        let (lower_cards, plan) = (cards.clone(), self.clone());
        ActionStep::new(label, move || match raise_cards.update_flags(&raise_card, |flags| raise(flags, true)) {
            // an already raised flag means the visual is playing; re-entry must not replay it
            Some(_) => Ok(()),
            None => Err(EffectError::CardMissing(raise_card.clone())),
        })
        .wait_for(signal)
        .cleanup(move || {
            plan.lock().complete(id);
            lower_cards.update_flags(&card, |flags| toggle(flags, false));
            Ok(())
        })
    }

    fn reveal_step(&self, id: u64, card: CardId, cards: &CardCollection) -> ActionStep {
        let (reveal_cards, reveal_card) = (cards.clone(), card.clone());
        let (settle_cards, plan) = (cards.clone(), self.clone());
        ActionStep::new(format!("reveal {card}"), move || {
            if reveal_cards.reveal(&reveal_card, |flags| flags.slide_animation = true) {
                Ok(())
            } else {
                Err(EffectError::CardMissing(reveal_card.clone()))
            }
        })
        .wait_for(AnimationSignal::SlideInAnimationComplete)
        .cleanup(move || {
            plan.lock().complete(id);
            settle_cards.update_flags(&card, |flags| std::mem::replace(&mut flags.slide_animation, false));
            Ok(())
        })
    }

    fn slide_out_step(&self, id: u64, card: CardId, cards: &CardCollection) -> ActionStep {
        let (slide_cards, slide_card) = (cards.clone(), card.clone());
        let (remove_cards, plan) = (cards.clone(), self.clone());
        ActionStep::new(format!("slide out {card}"), move || match slide_cards.update_flags(&slide_card, |flags| {
            !std::mem::replace(&mut flags.slide_out_animation, true)
        }) {
            Some(_) => Ok(()),
            None => Err(EffectError::CardMissing(slide_card.clone())),
        })
        .wait_for(AnimationSignal::SlideOutAnimationComplete)
        .cleanup(move || {
            plan.lock().complete(id);
            remove_cards.remove(&card);
            Ok(())
        })
    }
}
