use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a wallet user as assigned by the server
#[derive(PartialEq, Eq, Hash, Clone, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

/// Identifier of a loyalty (punch) card
#[derive(PartialEq, Eq, Hash, Clone, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}({})", stringify!($name), self.0) }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self { Self(value.to_string()) }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self { Self(value) }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool { self.0 == other }
        }
    };
}

string_id!(UserId);
string_id!(CardId);
