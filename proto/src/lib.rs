//! Wire types shared by the punchcard push channel and its clients.
//!
//! Inbound frames are JSON envelopes of the form `{ "kind": ..., "data": [...] }`. For the
//! loyalty domain `data[0]` is a [`LoyaltyEvent`]. The only outbound frame is the
//! `register_user` message which binds a connection to a user identity.

pub mod card;
pub mod error;
pub mod id;
pub mod message;

pub use card::*;
pub use error::*;
pub use id::*;
pub use message::*;
