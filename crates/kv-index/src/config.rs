/// Configuration for a [`crate::Hashtable`].
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Initial bucket count (rounded up to a power of two).
    pub buckets_initial: usize,
    /// Upper bound the table will never upsize past.
    pub buckets_count_max: usize,
    /// Preferred number of buckets migrated per upsize block. Smaller
    /// blocks let more threads cooperate on a migration at once; larger
    /// blocks amortize the per-block bookkeeping.
    pub upsize_preferred_block_size: usize,
}

impl Config {
    pub const fn new(
        buckets_initial: usize,
        buckets_count_max: usize,
        upsize_preferred_block_size: usize,
    ) -> Self {
        assert!(buckets_initial > 0, "buckets_initial must be non-zero");
        assert!(
            buckets_count_max >= buckets_initial,
            "buckets_count_max must be at least buckets_initial"
        );
        assert!(
            upsize_preferred_block_size > 0,
            "upsize_preferred_block_size must be non-zero"
        );
        Self {
            buckets_initial,
            buckets_count_max,
            upsize_preferred_block_size,
        }
    }

    pub const fn buckets_initial_rounded(&self) -> usize {
        self.buckets_initial.next_power_of_two()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(1024, 1 << 24, 1024 * 16)
    }
}

/// Small table, fine-grained migration: good for many short-lived tables.
pub const SMALL_CONFIG: Config = Config::new(64, 1 << 16, 256);

/// Large table, coarse-grained migration: good for one long-lived table
/// under heavy concurrent load.
pub const LARGE_CONFIG: Config = Config::new(1 << 16, 1 << 28, 1 << 20);
