use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use punchcard_core::{
    card::{CardSet, LoyaltyCard},
    signals::ListenerGuard,
    AnimationSignal, PresentationBridge,
};
use punchcard_proto::CardId;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Stands in for a UI: logs the cards whenever they change and reports every animation it
/// is asked to play as finished after a fixed delay.
pub struct HeadlessPresenter {
    _watch: ListenerGuard<CardSet>,
}

impl HeadlessPresenter {
    /// Must be called from within a tokio runtime
    pub fn start(presentation: PresentationBridge, animation: Duration) -> Self {
        let runtime = Handle::current();
        let playing = Arc::new(Mutex::new(HashSet::<(CardId, AnimationSignal)>::new()));
        let bridge = presentation.clone();

        let watch = presentation.watch(move |cards: Vec<LoyaltyCard>| {
            info!("cards: {}", render(&cards));

            let raised: HashSet<(CardId, AnimationSignal)> =
                cards.iter().flat_map(|card| raised_signals(card).into_iter().map(|signal| (card.id.clone(), signal))).collect();
            let mut playing = playing.lock().unwrap_or_else(|p| p.into_inner());
            for (card, signal) in raised.difference(&playing) {
                debug!("playing {} on {}", signal, card);
                let bridge = bridge.clone();
                let signal = *signal;
                runtime.spawn(async move {
                    tokio::time::sleep(animation).await;
                    bridge.animation_finished(signal);
                });
            }
            *playing = raised;
        });

        Self { _watch: watch }
    }
}

/// The completion signal of every animation currently requested on `card`
fn raised_signals(card: &LoyaltyCard) -> Vec<AnimationSignal> {
    let flags = &card.animation;
    [
        (flags.punch_animation.is_some(), AnimationSignal::PunchAnimationComplete),
        (flags.highlighted, AnimationSignal::HighlightAnimationComplete),
        (flags.slide_animation, AnimationSignal::SlideInAnimationComplete),
        (flags.slide_out_animation, AnimationSignal::SlideOutAnimationComplete),
        (flags.reward_claimed_animation, AnimationSignal::CompletionOverlayClosed),
    ]
    .into_iter()
    .filter_map(|(raised, signal)| raised.then_some(signal))
    .collect()
}

pub fn render(cards: &[LoyaltyCard]) -> String {
    if cards.is_empty() {
        return "(none)".to_string();
    }
    cards
        .iter()
        .map(|card| {
            let mut line = format!("{} {}/{} {}", card.id, card.current_punches, card.total_punches, card.status);
            let signals = raised_signals(card);
            if !signals.is_empty() {
                let names: Vec<&str> = signals.iter().map(AnimationSignal::as_str).collect();
                line.push_str(&format!(" [{}]", names.join(",")));
            }
            line
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use punchcard_core::card::{AnimationFlags, PunchAnimation};
    use punchcard_proto::CardStatus;

    fn card(id: &str, animation: AnimationFlags) -> LoyaltyCard {
        LoyaltyCard { id: id.into(), current_punches: 3, total_punches: 5, status: CardStatus::Active, loyalty_program_id: None, animation }
    }

    #[test]
    fn renders_cards_with_their_pending_animations() {
        let punched = card("c1", AnimationFlags { punch_animation: Some(PunchAnimation { punch_index: 2 }), ..Default::default() });
        let quiet = card("c2", AnimationFlags::default());

        assert_eq!(render(&[punched, quiet]), "c1 3/5 ACTIVE [PUNCH_ANIMATION_COMPLETE] | c2 3/5 ACTIVE");
        assert_eq!(render(&[]), "(none)");
    }
}
