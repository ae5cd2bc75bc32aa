use crate::bucket::Bucket;

/// Width of the linear probe window: the maximum number of consecutive
/// buckets a lookup or insert will scan past the ideal index before giving
/// up and forcing an upsize. Matches the original design's
/// `HASHTABLE_MPMC_LINEAR_SEARCH_RANGE`.
pub const LINEAR_SEARCH_RANGE: usize = 256;

/// One generation of the bucket array. A table is always a power-of-two
/// number of logical buckets, padded with `LINEAR_SEARCH_RANGE` extra
/// buckets so that a probe starting near the end of the array never needs
/// to wrap — readers and writers scan `[index, index + LINEAR_SEARCH_RANGE)`
/// unconditionally.
pub struct Data {
    pub buckets_count: usize,
    pub buckets_count_mask: usize,
    pub buckets_count_real: usize,
    pub buckets: Box<[Bucket]>,
}

impl Data {
    pub fn new(buckets_count: usize) -> Box<Self> {
        debug_assert!(
            buckets_count.is_power_of_two(),
            "buckets_count must be a power of two, got {buckets_count}"
        );
        let buckets_count_real = buckets_count + LINEAR_SEARCH_RANGE;
        let mut buckets = Vec::with_capacity(buckets_count_real);
        buckets.resize_with(buckets_count_real, Bucket::empty);
        Box::new(Self {
            buckets_count,
            buckets_count_mask: buckets_count - 1,
            buckets_count_real,
            buckets: buckets.into_boxed_slice(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_by_linear_search_range() {
        let data = Data::new(64);
        assert_eq!(data.buckets_count, 64);
        assert_eq!(data.buckets.len(), 64 + LINEAR_SEARCH_RANGE);
        assert_eq!(data.buckets_count_mask, 63);
    }
}
