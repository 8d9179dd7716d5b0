//! When to resize, and to what.

use crate::kernel::Counters;

/// Running totals since the last resize.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub inserted: u64,
    pub deleted: u64,
    /// Slots consumed in the current generation, tombstones included.
    pub claimed: u64,
}

impl Totals {
    /// The number of live keys.
    pub fn net(&self) -> u64 {
        self.inserted.saturating_sub(self.deleted)
    }

    pub fn record(&mut self, counters: &Counters) {
        self.inserted += counters.inserted;
        self.deleted += counters.deleted;
        self.claimed += counters.claimed;
    }

    /// Every live key has been migrated into a fresh slot and every tombstone
    /// was left behind.
    pub fn reset_after_resize(&mut self) {
        let net = self.net();
        *self = Self {
            inserted: net,
            deleted: 0,
            claimed: net,
        };
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResizePolicy {
    threshold: f64,
    growth_factor: f64,
    min_capacity: u64,
}

impl ResizePolicy {
    /// A resized table is never smaller than `min_capacity`, so that one batch
    /// of inserts always fits.
    pub fn new(threshold: f64, growth_factor: f64, min_capacity: u64) -> Self {
        Self {
            threshold,
            growth_factor,
            min_capacity,
        }
    }

    /// Returns `true` if the live keys, or the slots consumed by live keys and
    /// tombstones, have reached the threshold.
    pub fn should_resize(&self, totals: &Totals, capacity: usize) -> bool {
        let limit = self.threshold * capacity as f64;
        totals.net() as f64 >= limit || totals.claimed as f64 >= limit
    }

    pub fn new_capacity(&self, totals: &Totals) -> u64 {
        let grown = (totals.net() as f64 * self.growth_factor).ceil() as u64;
        grown.max(self.min_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::{ResizePolicy, Totals};
    use crate::kernel::Counters;

    fn batch(inserted: u64, deleted: u64, claimed: u64) -> Counters {
        Counters {
            inserted,
            deleted,
            claimed,
            ..Counters::default()
        }
    }

    #[test]
    fn resize_triggers_once_the_live_count_crosses_the_threshold() {
        // Capacity 1,000, threshold 0.7, 256 fresh keys per batch.
        let policy = ResizePolicy::new(0.7, 2.0, 256);
        let mut totals = Totals::default();

        for _ in 0..2 {
            totals.record(&batch(256, 0, 256));
            assert!(!policy.should_resize(&totals, 1_000));
        }
        totals.record(&batch(256, 0, 256));
        assert_eq!(totals.net(), 768);
        assert!(policy.should_resize(&totals, 1_000));
        assert_eq!(policy.new_capacity(&totals), 1_536);

        totals.reset_after_resize();
        assert_eq!(
            totals,
            Totals {
                inserted: 768,
                deleted: 0,
                claimed: 768
            }
        );
        assert!(!policy.should_resize(&totals, 1_536));
    }

    #[test]
    fn new_capacity_is_clamped_to_one_batch() {
        let policy = ResizePolicy::new(0.5, 1.5, 4_096);
        let mut totals = Totals::default();
        totals.record(&batch(100, 90, 100));
        assert_eq!(policy.new_capacity(&totals), 4_096);

        let policy = ResizePolicy::new(0.5, 1.5, 1);
        assert_eq!(policy.new_capacity(&totals), 15);
    }

    #[test]
    fn tombstones_count_toward_the_threshold() {
        let policy = ResizePolicy::new(0.5, 2.0, 1);
        let mut totals = Totals::default();
        totals.record(&batch(60, 50, 60));

        assert_eq!(totals.net(), 10);
        assert!(policy.should_resize(&totals, 100));
        assert_eq!(policy.new_capacity(&totals), 20);
    }
}
