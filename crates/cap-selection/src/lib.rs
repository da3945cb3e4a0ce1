//! Beacon-seeded deterministic provider selection, grounded on
//! `bpi-vrf`'s domain-hash-chaining idiom (deriving successive digests by
//! folding a fixed domain tag, a structural label, and caller-supplied
//! bytes) but driven by an external beacon instead of a local VRF key.

use cap_enc::{domains, sha3_256, u64be, Hash32};
use cap_errors::CapError;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Anything that can be ordered by beacon-seeded selection needs a stable
/// byte identity. Most candidates are provider ids or public keys.
pub trait SelectionCandidate {
    fn key_bytes(&self) -> &[u8];
}

impl SelectionCandidate for String {
    fn key_bytes(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl SelectionCandidate for Vec<u8> {
    fn key_bytes(&self) -> &[u8] {
        self.as_slice()
    }
}

fn compute_epoch_seed(beacon_seed: &[u8], epoch: u64) -> Hash32 {
    let mut buf = Vec::with_capacity(domains::ASSIGN.len() + 7 + 8 + beacon_seed.len());
    buf.extend_from_slice(domains::ASSIGN);
    buf.extend_from_slice(b":epoch:");
    buf.extend_from_slice(&u64be(epoch));
    buf.extend_from_slice(beacon_seed);
    sha3_256(&buf)
}

fn compute_score(epoch_seed: &Hash32, salt: &[u8], key: &[u8]) -> Hash32 {
    let mut buf = Vec::with_capacity(domains::ASSIGN.len() + 7 + 32 + salt.len() + key.len());
    buf.extend_from_slice(domains::ASSIGN);
    buf.extend_from_slice(b":score:");
    buf.extend_from_slice(epoch_seed);
    buf.extend_from_slice(salt);
    buf.extend_from_slice(key);
    sha3_256(&buf)
}

/// Caches `epoch_seed` by `(beacon_seed, epoch)` so repeated selections
/// within the same epoch don't re-hash the beacon seed every call.
#[derive(Default)]
pub struct EpochSeedCache {
    entries: Mutex<HashMap<(Vec<u8>, u64), Hash32>>,
}

impl EpochSeedCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn epoch_seed(&self, beacon_seed: &[u8], epoch: u64) -> Hash32 {
        let cache_key = (beacon_seed.to_vec(), epoch);
        if let Some(seed) = self.entries.lock().get(&cache_key) {
            return *seed;
        }
        let seed = compute_epoch_seed(beacon_seed, epoch);
        self.entries.lock().insert(cache_key, seed);
        seed
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Computes `epoch = height / epoch_blocks`, then sorts `candidates`
/// ascending by `(score, key_bytes)`. Candidates are stably de-duplicated
/// by key bytes first (first occurrence wins) before scoring.
pub fn select<T>(
    candidates: &[T],
    height: i64,
    epoch_blocks: i64,
    beacon_seed: &[u8],
    salt: &[u8],
    seed_cache: &EpochSeedCache,
) -> Result<Vec<T>, CapError>
where
    T: SelectionCandidate + Clone,
{
    if epoch_blocks <= 0 {
        return Err(CapError::invalid_input("epoch_blocks must be positive")
            .with_detail("epoch_blocks", epoch_blocks.to_string()));
    }
    if height < 0 {
        return Err(
            CapError::invalid_input("height must be non-negative").with_detail("height", height.to_string())
        );
    }

    let epoch = (height as u64) / (epoch_blocks as u64);
    let epoch_seed = seed_cache.epoch_seed(beacon_seed, epoch);

    let mut seen = HashSet::new();
    let mut deduped = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if seen.insert(candidate.key_bytes().to_vec()) {
            deduped.push(candidate.clone());
        }
    }

    let mut scored: Vec<(Hash32, Vec<u8>, T)> = deduped
        .into_iter()
        .map(|candidate| {
            let key = candidate.key_bytes().to_vec();
            let score = compute_score(&epoch_seed, salt, &key);
            (score, key, candidate)
        })
        .collect();

    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    Ok(scored.into_iter().map(|(_, _, candidate)| candidate).collect())
}

/// Returns the first `k` entries of a permutation, or all of them if
/// `k >= perm.len()`.
pub fn sample_topk<T: Clone>(perm: &[T], k: usize) -> Vec<T> {
    perm.iter().take(k).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<String> {
        vec!["A", "B", "C", "D"].into_iter().map(String::from).collect()
    }

    #[test]
    fn same_inputs_produce_identical_permutation() {
        let cache = EpochSeedCache::new();
        let beacon = [0u8; 32];
        let a = select(&candidates(), 128, 64, &beacon, b"AI", &cache).unwrap();
        let b = select(&candidates(), 128, 64, &beacon, b"AI", &cache).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_salt_changes_order_with_overwhelming_probability() {
        let cache = EpochSeedCache::new();
        let beacon = [0u8; 32];
        let ai = select(&candidates(), 128, 64, &beacon, b"AI", &cache).unwrap();
        let qpu = select(&candidates(), 128, 64, &beacon, b"QPU", &cache).unwrap();
        assert_ne!(ai, qpu);
    }

    #[test]
    fn different_epoch_changes_order() {
        let cache = EpochSeedCache::new();
        let beacon = [0u8; 32];
        let epoch0 = select(&candidates(), 10, 64, &beacon, b"AI", &cache).unwrap();
        let epoch1 = select(&candidates(), 128, 64, &beacon, b"AI", &cache).unwrap();
        assert_ne!(epoch0, epoch1);
    }

    #[test]
    fn duplicates_are_stably_deduplicated_first_occurrence_wins() {
        let cache = EpochSeedCache::new();
        let beacon = [1u8; 32];
        let with_dup = vec!["A".to_string(), "B".to_string(), "A".to_string()];
        let result = select(&with_dup, 0, 10, &beacon, b"x", &cache).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn non_positive_epoch_blocks_is_rejected() {
        let cache = EpochSeedCache::new();
        let err = select(&candidates(), 10, 0, &[0u8; 32], b"AI", &cache).unwrap_err();
        assert_eq!(err.kind.code(), "INVALID_INPUT");
    }

    #[test]
    fn negative_height_is_rejected() {
        let cache = EpochSeedCache::new();
        let err = select(&candidates(), -1, 10, &[0u8; 32], b"AI", &cache).unwrap_err();
        assert_eq!(err.kind.code(), "INVALID_INPUT");
    }

    #[test]
    fn sample_topk_takes_prefix_and_saturates_at_len() {
        let perm = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        assert_eq!(sample_topk(&perm, 2), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(sample_topk(&perm, 10), perm);
    }

    #[test]
    fn epoch_seed_cache_is_consistent_with_direct_computation() {
        let cache = EpochSeedCache::new();
        let beacon = [7u8; 32];
        let cached = cache.epoch_seed(&beacon, 3);
        let direct = compute_epoch_seed(&beacon, 3);
        assert_eq!(cached, direct);
    }
}
