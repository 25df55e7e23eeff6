//! Lexicographically sortable, time-prefixed identifiers.
//!
//! Every ledger entity (account, transfer, entry, hold, outbox event, audit
//! row) is keyed by a [`Id`], a thin wrapper around a ULID. ULIDs are
//! 128 bits, Crockford base32 encoded to 26 ASCII characters, sort the same
//! way as strings and as the underlying integers, and carry a millisecond
//! timestamp in their high bits — exactly the shape the core needs without
//! a central sequence generator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::{Generator, Ulid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(Ulid);

impl Id {
    /// Generates a new id using the calling thread's monotonic generator.
    ///
    /// `ulid::Generator` guarantees strictly increasing ids for calls made
    /// from the same generator within the same millisecond (and falls back
    /// to the wall clock once the millisecond advances), which is what keeps
    /// ids generated back-to-back in one request monotonic even under clock
    /// coalescing.
    pub fn generate() -> Self {
        thread_local! {
            static GEN: std::cell::RefCell<Generator> = std::cell::RefCell::new(Generator::new());
        }
        GEN.with(|g| {
            let mut g = g.borrow_mut();
            // A monotonic generator only fails if the clock has moved
            // backwards far enough to exhaust the per-ms random tail; retry
            // with a fresh generator in that vanishingly unlikely case.
            match g.generate() {
                Ok(ulid) => Id(ulid),
                Err(_) => Id(Ulid::new()),
            }
        })
    }

    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ulid::from_string(s).map(Id)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Id {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl From<Ulid> for Id {
    fn from(u: Ulid) -> Self {
        Id(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_monotonic() {
        let ids: Vec<Id> = (0..1000).map(|_| Id::generate()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted, "ids generated in sequence must already be sorted");

        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len(), "ids must be collision-free");
    }

    #[test]
    fn round_trips_through_string() {
        let id = Id::generate();
        let s = id.to_string();
        let parsed: Id = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn display_is_26_chars_of_crockford_base32() {
        let id = Id::generate();
        let s = id.to_string();
        assert_eq!(s.len(), 26);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
