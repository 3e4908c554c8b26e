use punchcard_proto::{CardDto, CardId, CardStatus, InvalidCard};
use punchcard_signals::{ListenerGuard, Mut, Read};

/// Which punch slot is currently playing its "stamp" animation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PunchAnimation {
    pub punch_index: u32,
}

/// Transient presentation state of a card. Carries no business meaning and can be
/// cleared at any time without touching the punch count or status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnimationFlags {
    pub highlighted: bool,
    pub punch_animation: Option<PunchAnimation>,
    pub slide_animation: bool,
    pub slide_out_animation: bool,
    pub reward_claimed_animation: bool,
}

impl AnimationFlags {
    pub fn is_clear(&self) -> bool { *self == Self::default() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoyaltyCard {
    pub id: CardId,
    pub current_punches: u32,
    pub total_punches: u32,
    pub status: CardStatus,
    pub loyalty_program_id: Option<String>,
    pub animation: AnimationFlags,
}

impl LoyaltyCard {
    fn new(dto: &CardDto, status: CardStatus) -> Self {
        Self {
            id: dto.id.clone(),
            current_punches: dto.current_punches,
            total_punches: dto.total_punches,
            status,
            loyalty_program_id: dto.loyalty_program_id.clone(),
            animation: AnimationFlags::default(),
        }
    }

    /// Merges the business fields of `dto`, leaving the animation flags alone
    fn merge(&mut self, dto: &CardDto, status: CardStatus) {
        self.current_punches = dto.current_punches;
        self.total_punches = dto.total_punches;
        self.status = status;
        if dto.loyalty_program_id.is_some() {
            self.loyalty_program_id = dto.loyalty_program_id.clone();
        }
    }
}

/// Outcome of [`CardCollection::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// The card was unknown and is now visible
    Inserted { status: CardStatus },
    /// A visible card was updated
    Updated { previous_punches: u32, previous_status: CardStatus, status: CardStatus },
    /// A card still waiting to be revealed was updated
    Staged,
}

/// Outcome of [`CardCollection::stage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staged {
    /// The card was unknown and now waits to be revealed
    New,
    /// The card was already visible or staged; only its business fields were merged
    Known,
}

/// Visible cards in display order, plus cards that exist but have not been revealed yet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardSet {
    pub visible: Vec<LoyaltyCard>,
    pub staged: Vec<LoyaltyCard>,
}

impl CardSet {
    fn visible_mut(&mut self, id: &CardId) -> Option<&mut LoyaltyCard> { self.visible.iter_mut().find(|c| c.id == *id) }

    fn staged_mut(&mut self, id: &CardId) -> Option<&mut LoyaltyCard> { self.staged.iter_mut().find(|c| c.id == *id) }
}

/// The wallet's card collection.
///
/// Two parties write to it: the event router (business fields) and sequence steps
/// (animation flags). Every mutation is a field-scoped merge on a single card, so neither
/// can overwrite what the other just wrote.
#[derive(Clone)]
pub struct CardCollection {
    cards: std::sync::Arc<Mut<CardSet>>,
}

impl Default for CardCollection {
    fn default() -> Self { Self::new() }
}

impl CardCollection {
    pub fn new() -> Self { Self { cards: std::sync::Arc::new(Mut::new(CardSet::default())) } }

    /// Seeds the collection from an initial fetch. Cards are shown in the given order
    /// without any animation; invalid cards are skipped and reported.
    pub fn load(&self, dtos: impl IntoIterator<Item = CardDto>) -> Vec<InvalidCard> {
        let mut rejected = Vec::new();
        self.cards.update(|set| {
            for dto in dtos {
                let status = match dto.validate() {
                    Ok(status) => status,
                    Err(e) => {
                        rejected.push(e);
                        continue;
                    }
                };
                if let Some(card) = set.visible_mut(&dto.id) {
                    card.merge(&dto, status);
                } else if let Some(card) = set.staged_mut(&dto.id) {
                    card.merge(&dto, status);
                } else {
                    set.visible.push(LoyaltyCard::new(&dto, status));
                }
            }
        });
        rejected
    }

    /// Inserts or updates a card's business fields. Unknown cards become visible at the front.
    pub fn upsert(&self, dto: &CardDto) -> Result<Upserted, InvalidCard> {
        let status = dto.validate()?;
        Ok(self.cards.update(|set| {
            if let Some(card) = set.visible_mut(&dto.id) {
                let (previous_punches, previous_status) = (card.current_punches, card.status);
                card.merge(dto, status);
                Upserted::Updated { previous_punches, previous_status, status }
            } else if let Some(card) = set.staged_mut(&dto.id) {
                card.merge(dto, status);
                Upserted::Staged
            } else {
                set.visible.insert(0, LoyaltyCard::new(dto, status));
                Upserted::Inserted { status }
            }
        }))
    }

    /// Records a card that must not be shown until [`CardCollection::reveal`] is called
    pub fn stage(&self, dto: &CardDto) -> Result<Staged, InvalidCard> {
        let status = dto.validate()?;
        Ok(self.cards.update(|set| {
            if let Some(card) = set.visible_mut(&dto.id) {
                card.merge(dto, status);
                Staged::Known
            } else if let Some(card) = set.staged_mut(&dto.id) {
                card.merge(dto, status);
                Staged::Known
            } else {
                set.staged.push(LoyaltyCard::new(dto, status));
                Staged::New
            }
        }))
    }

    /// Moves a staged card to the front of the visible list and applies `flags` to it.
    /// A card that is already visible only gets `flags` applied. Returns false if the card
    /// is unknown.
    pub fn reveal(&self, id: &CardId, flags: impl FnOnce(&mut AnimationFlags)) -> bool {
        self.cards.update_if(|set| {
            if let Some(pos) = set.staged.iter().position(|c| c.id == *id) {
                let mut card = set.staged.remove(pos);
                flags(&mut card.animation);
                set.visible.insert(0, card);
                true
            } else if let Some(card) = set.visible_mut(id) {
                flags(&mut card.animation);
                true
            } else {
                false
            }
        })
    }

    /// Reveals every staged card without animation
    pub fn reveal_all_staged(&self) -> usize {
        let mut revealed = 0;
        self.cards.update_if(|set| {
            revealed = set.staged.len();
            for card in std::mem::take(&mut set.staged) {
                set.visible.insert(0, card);
            }
            revealed > 0
        });
        revealed
    }

    /// Applies `f` to a visible card's flags. `f` returns whether it changed anything;
    /// listeners are only notified if it did. Returns `None` if the card is not visible.
    pub fn update_flags(&self, id: &CardId, f: impl FnOnce(&mut AnimationFlags) -> bool) -> Option<bool> {
        let mut found = false;
        let changed = self.cards.update_if(|set| match set.visible_mut(id) {
            Some(card) => {
                found = true;
                f(&mut card.animation)
            }
            None => false,
        });
        found.then_some(changed)
    }

    pub fn clear_flags(&self, id: &CardId) -> bool {
        self.update_flags(id, |flags| {
            let changed = !flags.is_clear();
            *flags = AnimationFlags::default();
            changed
        })
        .unwrap_or(false)
    }

    pub fn clear_all_flags(&self) -> bool {
        self.cards.update_if(|set| {
            let mut changed = false;
            for card in set.visible.iter_mut().chain(set.staged.iter_mut()) {
                if !card.animation.is_clear() {
                    card.animation = AnimationFlags::default();
                    changed = true;
                }
            }
            changed
        })
    }

    pub fn remove(&self, id: &CardId) -> Option<LoyaltyCard> {
        let mut removed = None;
        self.cards.update_if(|set| {
            if let Some(pos) = set.visible.iter().position(|c| c.id == *id) {
                removed = Some(set.visible.remove(pos));
            } else if let Some(pos) = set.staged.iter().position(|c| c.id == *id) {
                removed = Some(set.staged.remove(pos));
            }
            removed.is_some()
        });
        removed
    }

    /// A visible card
    pub fn get(&self, id: &CardId) -> Option<LoyaltyCard> { self.cards.with(|set| set.visible.iter().find(|c| c.id == *id).cloned()) }

    pub fn is_visible(&self, id: &CardId) -> bool { self.cards.with(|set| set.visible.iter().any(|c| c.id == *id)) }

    pub fn is_staged(&self, id: &CardId) -> bool { self.cards.with(|set| set.staged.iter().any(|c| c.id == *id)) }

    /// The read model handed to the presentation: visible cards in display order
    pub fn visible(&self) -> Vec<LoyaltyCard> { self.cards.with(|set| set.visible.clone()) }

    pub fn read(&self) -> Read<CardSet> { self.cards.read() }

    /// Calls `listener` with the visible cards now and after every change
    pub fn subscribe(&self, listener: impl Fn(Vec<LoyaltyCard>) + Send + Sync + 'static) -> ListenerGuard<CardSet> {
        self.cards.read().subscribe_now(move |set: CardSet| listener(set.visible))
    }
}
