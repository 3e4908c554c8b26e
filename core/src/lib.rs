pub mod animation;
pub mod card;
pub mod config;
pub mod error;
pub mod router;
pub mod runtime;
pub mod sequencer;
pub mod transport;

pub use animation::AnimationSignal;
pub use card::{AnimationFlags, CardCollection, LoyaltyCard};
pub use router::{DomainEventRouter, Routed};
pub use runtime::{PresentationBridge, WalletRuntime};
pub use sequencer::{ActionStep, SequenceItem, Sequencer};
pub use transport::{ConnectionStatus, DomainEvent, PushTransport};

pub use punchcard_proto as proto;
pub use punchcard_signals as signals;
