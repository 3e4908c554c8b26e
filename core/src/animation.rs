//! Names of the signals exchanged between the sequencer and the presentation layer.
//!
//! The presentation emits one of these whenever a visual it was asked to play has finished
//! (or the user dismissed it). They are the only coupling between the two sides, so both
//! must use this enum; the string forms are what a DOM `animationend` handler reports.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::IntoStaticStr, strum::EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AnimationSignal {
    PunchAnimationComplete,
    HighlightAnimationComplete,
    SlideInAnimationComplete,
    SlideOutAnimationComplete,
    CompletionOverlayClosed,
}

impl AnimationSignal {
    pub fn as_str(&self) -> &'static str { self.into() }

    /// Parses a signal name reported by the presentation. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> { Self::from_str(name).ok() }
}
