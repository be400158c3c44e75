// Copyright (c) 2026 The Headrace Project

//! Head network messages and the outbound-delivery seam.
//!
//! The wire transport itself lives outside this crate; it is assumed to
//! provide ordered, authenticated point-to-point delivery between every
//! pair of parties. What lives here is the message algebra the parties
//! exchange and the canonical encoding those messages travel in.

mod messages;

pub use messages::Message;

use thiserror::Error;

/// Errors crossing the network seam.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// A message failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The transport refused delivery.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors from the canonical message codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The message could not be serialised.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The bytes were not a canonical encoding of any known message.
    /// Unknown variants and trailing bytes are hard errors: the encoding
    /// doubles as a signature domain, so nothing may pass silently.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Encode a message in canonical form.
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    use bincode::Options;
    bincode::DefaultOptions::new()
        .serialize(message)
        .map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a message from its canonical form, rejecting trailing bytes and
/// unknown variants.
pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    use bincode::Options;
    bincode::DefaultOptions::new()
        .deserialize(bytes)
        .map_err(|e| CodecError::Decode(e.to_string()))
}

/// Outbound side of the transport, as seen by the node.
///
/// `broadcast` must deliver to every party in the head, including the
/// sender itself: the protocol relies on a node processing its own
/// requests and acknowledgements through the same path as everyone
/// else's.
pub trait PeerSender: Send {
    /// Deliver `message` to all parties (self included), best effort.
    fn broadcast(&self, message: &Message) -> Result<(), NetworkError>;
}
