//! The [Id] type.
//!
//! Ids are opaque 64-bit values which name one logical entity across every table of a store.  The store never
//! allocates them: whoever owns the raw data (a loader, a history reader, the UI) picks them and hands them in.  All
//! ordered structures in the crate sort by id, so id order is also iteration order.
use std::str::FromStr;

use crate::errors::Error;

#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
#[display(fmt = "{}", _0)]
pub struct Id(u64);

impl Id {
    pub const fn new(raw: u64) -> Id {
        Id(raw)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl From<Id> for u64 {
    fn from(id: Id) -> u64 {
        id.0
    }
}

/// Ids parse from their decimal form, which is also what they display as.
impl FromStr for Id {
    type Err = Error;

    fn from_str(text: &str) -> Result<Id, Error> {
        text.trim()
            .parse::<u64>()
            .map(Id)
            .map_err(|source| Error::InvalidId {
                text: text.to_string(),
                source,
            })
    }
}
