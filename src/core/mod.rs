//! Core deterministic primitives.
//!
//! All types in this module are designed for perfect cross-peer determinism.
//! They are the only sources of randomness and digests in a match.

pub mod rng;
pub mod hash;

// Re-export core types
pub use rng::{DeterministicRng, derive_match_seed};
pub use hash::{StateHash, StateHasher, compute_state_hash};
