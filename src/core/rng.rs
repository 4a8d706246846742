//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ algorithm for fast, high-quality, deterministic randomness.
//! Given the same seed, produces identical sequence on all platforms.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Determinism Guarantee
///
/// Given the same seed, this RNG will produce the exact same sequence
/// of random numbers on any platform (x86, ARM, WASM).
///
/// Every random decision in a match (the opening coin flip, forced card
/// picks on countdown expiry) draws from one of these, so a match can be
/// reproduced from its seed alone.
///
/// # Example
///
/// ```
/// use triad_duel::core::rng::DeterministicRng;
///
/// let mut rng = DeterministicRng::new(12345);
/// let value = rng.next_u64();
/// assert_eq!(value, 6233086606872742541); // Always the same!
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create the RNG for one seat of a match.
    ///
    /// Each seat draws from its own lane so peers never consume from each
    /// other's sequence; lanes are decorrelated by the SplitMix64 seeding.
    pub fn for_lane(match_seed: u64, lane: u64) -> Self {
        Self::new(match_seed.wrapping_add(lane.wrapping_mul(0x9E3779B97F4A7C15)))
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Simple modulo - slight bias for very large max, but acceptable
        (self.next_u64() % max as u64) as u32
    }

    /// Generate a fair random boolean (the coin flip).
    #[inline]
    pub fn next_bool(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }

    /// Select a random element from a slice.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let idx = self.next_int(slice.len() as u32) as usize;
            Some(&slice[idx])
        }
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a match seed from room parameters.
///
/// This function produces a deterministic seed that:
/// 1. Is unique per room pairing
/// 2. Cannot be steered by either peer alone
/// 3. Is verifiable after the match
///
/// # Parameters
///
/// - `room_id`: Unique room identifier assigned by the relay
/// - `peer_ids`: Both peer IDs (MUST be sorted for determinism)
/// - `nonce`: Relay-chosen entropy (e.g. pairing timestamp nanos)
pub fn derive_match_seed(
    room_id: &[u8; 16],
    peer_ids: &[[u8; 16]],
    nonce: u64,
) -> u64 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"TRIAD_DUEL_SEED_V1");

    // Room ID (unique per pairing)
    hasher.update(room_id);

    // Peer IDs (sorted for determinism)
    // IMPORTANT: Caller must ensure peer_ids is sorted!
    for pid in peer_ids {
        hasher.update(pid);
    }

    // Relay entropy
    hasher.update(nonce.to_le_bytes());

    let hash = hasher.finalize();

    // Take first 8 bytes as seed
    u64::from_le_bytes(hash[0..8].try_into().unwrap())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_determinism() {
        // Same seed must produce same sequence
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_different_seeds() {
        // Different seeds produce different sequences
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(54321);

        // Very unlikely to match
        assert_ne!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_rng_known_values() {
        // Verify specific output for regression testing
        let mut rng = DeterministicRng::new(42);
        let val1 = rng.next_u64();
        let val2 = rng.next_u64();
        let val3 = rng.next_u64();

        // These values must never change!
        // If they do, recorded match seeds will replay differently.
        assert_eq!(val1, 16629283624882167704);
        assert_eq!(val2, 1420492921613871959);
        assert_eq!(val3, 9768315062676884790);
    }

    #[test]
    fn test_lanes_are_decorrelated() {
        let mut a = DeterministicRng::for_lane(777, 0);
        let mut b = DeterministicRng::for_lane(777, 1);

        assert_ne!(a.next_u64(), b.next_u64());

        // Same lane reproduces
        let mut a2 = DeterministicRng::for_lane(777, 0);
        a2.next_u64();
        assert_eq!(a.next_u64(), a2.next_u64());
    }

    #[test]
    fn test_next_int() {
        let mut rng = DeterministicRng::new(1234);

        // Test range
        for _ in 0..1000 {
            let val = rng.next_int(100);
            assert!(val < 100);
        }

        // Edge case: max = 0
        assert_eq!(rng.next_int(0), 0);

        // Edge case: max = 1
        assert_eq!(rng.next_int(1), 0);
    }

    #[test]
    fn test_coin_flip_is_fair_enough() {
        let mut rng = DeterministicRng::new(5678);

        let heads = (0..10_000).filter(|_| rng.next_bool()).count();
        assert!(heads > 4_500 && heads < 5_500, "suspicious flip count: {heads}");
    }

    #[test]
    fn test_choose_covers_all_elements() {
        let mut rng = DeterministicRng::new(2222);
        let cards = ["a", "b", "c"];

        let mut seen = [false; 3];
        for _ in 0..200 {
            let picked = rng.choose(&cards).unwrap();
            let idx = cards.iter().position(|c| c == picked).unwrap();
            seen[idx] = true;
        }

        assert_eq!(seen, [true, true, true]);
        assert!(rng.choose::<u8>(&[]).is_none());
    }

    #[test]
    fn test_derive_match_seed() {
        let room_id = [1u8; 16];
        let peer_ids = [[2u8; 16], [3u8; 16]];

        let seed1 = derive_match_seed(&room_id, &peer_ids, 9);
        let seed2 = derive_match_seed(&room_id, &peer_ids, 9);

        // Same inputs = same seed
        assert_eq!(seed1, seed2);

        // Different input = different seed
        let different_room = [99u8; 16];
        let seed3 = derive_match_seed(&different_room, &peer_ids, 9);
        assert_ne!(seed1, seed3);

        let seed4 = derive_match_seed(&room_id, &peer_ids, 10);
        assert_ne!(seed1, seed4);
    }
}
