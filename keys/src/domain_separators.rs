// Copyright (c) 2026 The Headrace Project

//! Domain separator strings for everything this crate signs or hashes.
//!
//! Every signature made with a party key is bound to one of these tags so
//! that a signature produced for one purpose can never be replayed in
//! another context.

/// Prepended to snapshot bodies before signing.
///
/// The signed message is the snapshot's canonical signing bytes (number,
/// UTxO hash, confirmed transaction ids), so a signature over snapshot `n`
/// can never stand in for snapshot `m`.
pub const SNAPSHOT_SIGNING_DOMAIN: &str = "headrace_snapshot_v1";

/// Prepended to UTxO set encodings before hashing.
pub const UTXO_HASH_DOMAIN: &str = "headrace_utxo_v1";

/// Prepended to the seed input when deriving a head identifier.
pub const HEAD_ID_DOMAIN: &str = "headrace_head_id_v1";
