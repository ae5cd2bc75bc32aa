/// Seed used for the first CRC32C pass, matching the original design's
/// `HASHTABLE_MPMC_HASH_SEED`.
const HASH_SEED: u32 = 42;

/// Builds the 64-bit hash used to place and identify a key.
///
/// Two CRC32 passes over the key: the first (seeded with [`HASH_SEED`])
/// becomes the low 32 bits directly; the second (seeded with the first
/// pass's output) becomes the high 32 bits. This double-hash construction —
/// rather than a single wider hash — is kept from the original design so
/// that the bit-splitting in [`half_hash`] and [`bucket_index`] stays
/// meaningful; the CRC variant itself is this workspace's own
/// hardware-accelerated `crc32fast` (Castagnoli-vs-IEEE polynomial choice
/// doesn't matter for hash distribution, only for interoperability with an
/// external CRC — this index has none).
pub fn hash64(key: &[u8]) -> u64 {
    let first = crc32(key, HASH_SEED);
    let second = crc32(key, first);
    (u64::from(second) << 32) | u64::from(first)
}

fn crc32(key: &[u8], seed: u32) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(seed);
    hasher.update(key);
    hasher.finalize()
}

/// The half of the hash stored in each bucket for cheap pre-filtering before
/// touching the (possibly remote) key-value node.
#[inline]
pub fn half_hash(hash: u64) -> u32 {
    (hash & u64::from(u32::MAX)) as u32
}

/// The bucket a hash probes from, given the table's power-of-two bucket
/// count (expressed as `mask = buckets_count - 1`).
#[inline]
pub fn bucket_index(hash: u64, mask: usize) -> usize {
    ((hash >> 32) as usize) & mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_hashes_identically() {
        assert_eq!(hash64(b"hello"), hash64(b"hello"));
    }

    #[test]
    fn different_keys_usually_hash_differently() {
        assert_ne!(hash64(b"hello"), hash64(b"world"));
    }

    #[test]
    fn bucket_index_respects_mask() {
        let hash = hash64(b"some-key");
        let mask = 0xFF;
        assert_eq!(bucket_index(hash, mask), bucket_index(hash, mask) & mask);
    }
}
