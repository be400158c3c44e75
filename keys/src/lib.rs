// Copyright (c) 2026 The Headrace Project

//! Headrace party identities and signing keys.
//!
//! Every participant in a head is a [`Party`]: an Ed25519 verification key
//! plus an index into the ordered party list fixed at head initialisation.
//! This crate provides key generation, domain-separated signing and
//! verification, multi-signature aggregation over snapshot bodies, and the
//! on-disk keyfile for a node's own identity.

pub mod domain_separators;
mod keyfile;
mod multisig;
mod party;
mod signing;

pub use keyfile::{read_keyfile, write_keyfile, KeyfileError};
pub use multisig::MultiSignature;
pub use party::{Party, PartyIndex};
pub use signing::{PartySignature, SignatureError, SigningKey, VerificationKey};
