// Copyright (c) 2026 The Headrace Project

//! Multi-signature aggregation over a common message.
//!
//! A [`MultiSignature`] collects one Ed25519 signature per party. It is
//! complete when every party in the head has contributed, and valid when
//! every contribution verifies over the same message under its party's key.

use crate::party::{Party, PartyIndex};
use crate::signing::PartySignature;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An aggregate of per-party signatures over one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSignature {
    signatures: BTreeMap<PartyIndex, PartySignature>,
}

impl MultiSignature {
    /// An empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate a set of per-party signatures.
    pub fn aggregate(signatures: impl IntoIterator<Item = (PartyIndex, PartySignature)>) -> Self {
        Self {
            signatures: signatures.into_iter().collect(),
        }
    }

    /// Record `party`'s signature. Returns false when the party had already
    /// signed (the existing signature is kept).
    pub fn insert(&mut self, party: PartyIndex, signature: PartySignature) -> bool {
        if self.signatures.contains_key(&party) {
            return false;
        }
        self.signatures.insert(party, signature);
        true
    }

    /// Whether `party` has contributed a signature.
    pub fn contains(&self, party: PartyIndex) -> bool {
        self.signatures.contains_key(&party)
    }

    /// Number of collected signatures.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Whether no signatures were collected yet.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// True when every listed party has contributed.
    pub fn is_complete(&self, parties: &[Party]) -> bool {
        parties.iter().all(|p| self.signatures.contains_key(&p.index))
    }

    /// Verify every signature over `message` under the matching party key.
    ///
    /// Fails when a signature is missing, does not verify, or belongs to no
    /// listed party. Returns the indices of offending parties.
    pub fn verify_all(
        &self,
        parties: &[Party],
        domain: &str,
        message: &[u8],
    ) -> Result<(), Vec<PartyIndex>> {
        let mut bad = Vec::new();
        for party in parties {
            match self.signatures.get(&party.index) {
                Some(sig) if party.verification_key.verify(domain, message, sig) => {}
                _ => bad.push(party.index),
            }
        }
        for index in self.signatures.keys() {
            if !parties.iter().any(|p| p.index == *index) {
                bad.push(*index);
            }
        }
        if bad.is_empty() {
            Ok(())
        } else {
            Err(bad)
        }
    }

    /// Iterate over the collected `(party, signature)` pairs in party order.
    pub fn iter(&self) -> impl Iterator<Item = (PartyIndex, &PartySignature)> {
        self.signatures.iter().map(|(i, s)| (*i, s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_separators::SNAPSHOT_SIGNING_DOMAIN;
    use crate::signing::SigningKey;

    fn keys_and_parties(n: u32) -> (Vec<SigningKey>, Vec<Party>) {
        let keys: Vec<_> = (0..n).map(|_| SigningKey::generate()).collect();
        let parties = keys
            .iter()
            .enumerate()
            .map(|(i, k)| Party::new(i as u32, k.verification_key()))
            .collect();
        (keys, parties)
    }

    #[test]
    fn test_complete_and_valid() {
        let (keys, parties) = keys_and_parties(3);
        let mut agg = MultiSignature::new();
        for (i, key) in keys.iter().enumerate() {
            agg.insert(i as u32, key.sign(SNAPSHOT_SIGNING_DOMAIN, b"body"));
        }
        assert!(agg.is_complete(&parties));
        assert!(agg
            .verify_all(&parties, SNAPSHOT_SIGNING_DOMAIN, b"body")
            .is_ok());
    }

    #[test]
    fn test_incomplete_without_every_party() {
        let (keys, parties) = keys_and_parties(3);
        let mut agg = MultiSignature::new();
        agg.insert(0, keys[0].sign(SNAPSHOT_SIGNING_DOMAIN, b"body"));
        assert!(!agg.is_complete(&parties));
    }

    #[test]
    fn test_verify_flags_wrong_message() {
        let (keys, parties) = keys_and_parties(2);
        let mut agg = MultiSignature::new();
        agg.insert(0, keys[0].sign(SNAPSHOT_SIGNING_DOMAIN, b"body"));
        agg.insert(1, keys[1].sign(SNAPSHOT_SIGNING_DOMAIN, b"other"));
        let bad = agg
            .verify_all(&parties, SNAPSHOT_SIGNING_DOMAIN, b"body")
            .unwrap_err();
        assert_eq!(bad, vec![1]);
    }

    #[test]
    fn test_duplicate_insert_keeps_first() {
        let (keys, _) = keys_and_parties(1);
        let mut agg = MultiSignature::new();
        let first = keys[0].sign(SNAPSHOT_SIGNING_DOMAIN, b"a");
        let second = keys[0].sign(SNAPSHOT_SIGNING_DOMAIN, b"b");
        assert!(agg.insert(0, first));
        assert!(!agg.insert(0, second));
        assert_eq!(agg.iter().next().map(|(_, s)| *s), Some(first));
    }
}
