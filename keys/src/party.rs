// Copyright (c) 2026 The Headrace Project

//! Party identities.

use crate::signing::VerificationKey;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Index of a party in the ordered party list of a head.
///
/// The party list is fixed at initialisation, so an index identifies a
/// party for the lifetime of the head.
pub type PartyIndex = u32;

/// A head participant: a verification key plus its position in the ordered
/// party list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Party {
    /// Position in the ordered party list.
    pub index: PartyIndex,

    /// The party's snapshot-signing verification key.
    pub verification_key: VerificationKey,
}

impl Party {
    /// Create a party from its list position and key.
    pub fn new(index: PartyIndex, verification_key: VerificationKey) -> Self {
        Self {
            index,
            verification_key,
        }
    }
}

// Parties are totally ordered by list position; the key only breaks ties
// between inconsistent lists.
impl Ord for Party {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index
            .cmp(&other.index)
            .then_with(|| self.verification_key.cmp(&other.verification_key))
    }
}

impl PartialOrd for Party {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "party {} ({})", self.index, self.verification_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::SigningKey;

    #[test]
    fn test_party_ordering_by_index() {
        let a = Party::new(0, SigningKey::generate().verification_key());
        let b = Party::new(1, SigningKey::generate().verification_key());
        assert!(a < b);
    }
}
