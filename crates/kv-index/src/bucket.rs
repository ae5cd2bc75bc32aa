use portable_atomic::AtomicU128;
use std::sync::atomic::Ordering;

/// A bucket is temporarily reserved for an in-progress insert: readers must
/// skip it (the key isn't committed yet) but it still occupies a probe slot.
pub const TEMPORARY: u8 = 0x01;
/// A bucket held a value that has since been deleted. Readers skip it but
/// probing must continue past it (unlike an `EMPTY` bucket, which ends a
/// probe sequence).
pub const TOMBSTONE: u8 = 0x02;
/// A bucket whose contents are being copied into the upsized table. Readers
/// and writers must consult `UpsizeInfo::from` instead of trusting it.
pub const MIGRATING: u8 = 0x04;

/// Unpacked view of a bucket's 128-bit word.
///
/// Splitting the tag into its own byte (rather than punning it into the low
/// bits of `node_ptr`, as the original C does) avoids needing pointer
/// alignment assumptions to recover it, at the cost of a wider CAS target —
/// acceptable here since the whole point of this bucket is that it already
/// needs a double-word atomic to update hash/tag/pointer together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketView {
    pub node_ptr: u64,
    pub tag: u8,
    pub hash_half: u32,
}

impl BucketView {
    pub const EMPTY: Self = Self {
        node_ptr: 0,
        tag: 0,
        hash_half: 0,
    };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.node_ptr == 0 && self.tag == 0
    }

    #[inline]
    pub fn has_tag(&self, tag: u8) -> bool {
        self.tag & tag != 0
    }

    #[inline]
    pub fn occupied(hash_half: u32, node_ptr: u64) -> Self {
        Self {
            node_ptr,
            tag: 0,
            hash_half,
        }
    }

    #[inline]
    pub fn with_tag(mut self, tag: u8) -> Self {
        self.tag |= tag;
        self
    }

    #[inline]
    pub fn without_tag(mut self, tag: u8) -> Self {
        self.tag &= !tag;
        self
    }

    fn pack(self) -> u128 {
        u128::from(self.node_ptr)
            | (u128::from(self.tag) << 64)
            | (u128::from(self.hash_half) << 72)
    }

    fn unpack(word: u128) -> Self {
        Self {
            node_ptr: (word & u128::from(u64::MAX)) as u64,
            tag: ((word >> 64) & 0xFF) as u8,
            hash_half: ((word >> 72) & u128::from(u32::MAX)) as u32,
        }
    }
}

/// A single slot in a hash table's bucket array. Updated with a 128-bit
/// compare-and-swap so that `hash_half`, `tag`, and `node_ptr` always change
/// together and a reader never observes a half-updated combination (e.g. a
/// new pointer paired with the previous hash, or a tag flip with a stale
/// pointer).
pub struct Bucket(AtomicU128);

impl Bucket {
    pub fn empty() -> Self {
        Self(AtomicU128::new(BucketView::EMPTY.pack()))
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> BucketView {
        BucketView::unpack(self.0.load(order))
    }

    #[inline]
    pub fn compare_exchange(
        &self,
        current: BucketView,
        new: BucketView,
        success: Ordering,
        failure: Ordering,
    ) -> Result<BucketView, BucketView> {
        self.0
            .compare_exchange(current.pack(), new.pack(), success, failure)
            .map(BucketView::unpack)
            .map_err(BucketView::unpack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        let view = BucketView::occupied(0xDEAD_BEEF, 0x1234_5678_9ABC_DEF0).with_tag(MIGRATING);
        assert_eq!(BucketView::unpack(view.pack()), view);
    }

    #[test]
    fn cas_fails_on_mismatch() {
        let bucket = Bucket::empty();
        let wrong = BucketView::occupied(1, 2);
        let new = BucketView::occupied(3, 4);
        assert_eq!(
            bucket.compare_exchange(wrong, new, Ordering::AcqRel, Ordering::Acquire),
            Err(BucketView::EMPTY)
        );
    }

    #[test]
    fn cas_succeeds_on_match() {
        let bucket = Bucket::empty();
        let new = BucketView::occupied(3, 4);
        assert_eq!(
            bucket.compare_exchange(BucketView::EMPTY, new, Ordering::AcqRel, Ordering::Acquire),
            Ok(BucketView::EMPTY)
        );
        assert_eq!(bucket.load(Ordering::Acquire), new);
    }

    #[test]
    fn tag_manipulation() {
        let view = BucketView::occupied(1, 2).with_tag(TOMBSTONE);
        assert!(view.has_tag(TOMBSTONE));
        assert!(!view.has_tag(MIGRATING));
        let cleared = view.without_tag(TOMBSTONE);
        assert!(!cleared.has_tag(TOMBSTONE));
    }
}
