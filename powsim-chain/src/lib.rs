//! Core data structures for the proof-of-work network simulator: blocks,
//! transactions, and the text checkpoint serialization they share.
//!
//! Cryptography is modeled abstractly. Hashes are plain integers assigned at
//! block creation, public keys are derived from node indices, and a
//! "signature" is just `public_key + 1`. This keeps simulated chains cheap to
//! build and compare while preserving the protocol-level invariants
//! (parent linking, coinbase shape, output ownership).

pub mod block;
pub mod serialization;
pub mod transaction;

pub use serialization::{SerializationError, TextDeserialize, TextSerialize, Tokens};
