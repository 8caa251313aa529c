//! Weighted schedule generation
//!
//! Raw weights become replication counts
//! `max(1, ceil(max_schedule_size * weight / total_weight))`, and every query
//! index is repeated that many times. Workers each get their own shuffled copy
//! of the same multiset so they don't hit the server in lockstep.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};
use crate::query::QueryDef;

/// Largest accepted `max_schedule_size`
///
/// Every worker holds its schedule in memory, so the bound keeps a mistyped
/// flag from turning into an enormous allocation.
pub const MAX_SCHEDULE_SIZE: usize = 1_000_000;

/// Replication count for every weight, in input order
///
/// # Errors
///
/// Returns a configuration error when the weights sum to zero (this includes
/// an empty slice), or `max_schedule_size` is zero or above
/// [`MAX_SCHEDULE_SIZE`].
pub fn replication_counts(weights: &[u32], max_schedule_size: usize) -> BenchResult<Vec<usize>> {
    if max_schedule_size == 0 {
        return Err(BenchError::config("max schedule size must be at least 1"));
    }
    if max_schedule_size > MAX_SCHEDULE_SIZE {
        return Err(BenchError::config(format!(
            "max schedule size {max_schedule_size} exceeds the limit of {MAX_SCHEDULE_SIZE}"
        )));
    }

    let total: u128 = weights.iter().map(|&w| u128::from(w)).sum();
    if total == 0 {
        return Err(BenchError::config("total query weight is zero"));
    }

    // Each count is at most max_schedule_size, so narrowing back is lossless
    let max = max_schedule_size as u128;
    Ok(weights
        .iter()
        .map(|&weight| {
            let count = (max * u128::from(weight)).div_ceil(total);
            count.max(1) as usize
        })
        .collect())
}

/// Ordered sequence of query indices assigned to one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule {
    entries: Vec<usize>,
}

impl Schedule {
    /// Build the unshuffled schedule for a query list
    pub fn normalize(queries: &[QueryDef], max_schedule_size: usize) -> BenchResult<Self> {
        let weights: Vec<u32> = queries.iter().map(|q| q.weight).collect();
        let counts = replication_counts(&weights, max_schedule_size)?;

        let mut entries = Vec::with_capacity(counts.iter().sum());
        for (index, count) in counts.into_iter().enumerate() {
            entries.extend(std::iter::repeat(index).take(count));
        }

        tracing::debug!(
            queries = queries.len(),
            length = entries.len(),
            max_schedule_size,
            "Normalized query schedule"
        );
        Ok(Self { entries })
    }

    /// Wrap raw indices
    pub fn from_entries(entries: Vec<usize>) -> Self {
        Self { entries }
    }

    /// An independently permuted copy of this schedule
    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let mut entries = self.entries.clone();
        entries.shuffle(rng);
        Self { entries }
    }

    /// Query indices in execution order
    pub fn entries(&self) -> &[usize] {
        &self.entries
    }

    /// Number of executions per pass
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the schedule is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many times `index` occurs per pass
    pub fn count_of(&self, index: usize) -> usize {
        self.entries.iter().filter(|&&i| i == index).count()
    }

    /// Check that every entry refers to one of `query_count` queries
    pub fn validate_against(&self, query_count: usize) -> BenchResult<()> {
        if self.entries.is_empty() {
            return Err(BenchError::config("schedule is empty"));
        }
        match self.entries.iter().find(|&&i| i >= query_count) {
            Some(bad) => Err(BenchError::config(format!(
                "schedule refers to query #{bad} but only {query_count} are defined"
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_weighted_counts() {
        // ceil(10 * 1 / 4) = 3, ceil(10 * 3 / 4) = 8
        let counts = replication_counts(&[1, 3], 10).unwrap();
        assert_eq!(counts, vec![3, 8]);
    }

    #[test]
    fn test_normalize_schedule_length() {
        let queries = vec![
            QueryDef::new("Q1", "SELECT 1").with_weight(1),
            QueryDef::new("Q2", "SELECT 2").with_weight(3),
        ];
        let schedule = Schedule::normalize(&queries, 10).unwrap();

        assert_eq!(schedule.len(), 11);
        assert_eq!(schedule.count_of(0), 3);
        assert_eq!(schedule.count_of(1), 8);
        assert_eq!(&schedule.entries()[..3], &[0, 0, 0]);
    }

    #[test]
    fn test_zero_total_weight() {
        assert!(matches!(
            replication_counts(&[0, 0], 10),
            Err(BenchError::Config(_))
        ));
        assert!(replication_counts(&[], 10).is_err());
    }

    #[test]
    fn test_zero_max_size() {
        assert!(replication_counts(&[1], 0).is_err());
    }

    #[test]
    fn test_oversized_max_size_is_config_error() {
        assert!(matches!(
            replication_counts(&[1, 3], usize::MAX / 2),
            Err(BenchError::Config(_))
        ));
        assert!(replication_counts(&[1], MAX_SCHEDULE_SIZE + 1).is_err());
    }

    #[test]
    fn test_largest_weights_at_size_limit() {
        let counts = replication_counts(&[u32::MAX, u32::MAX, 1], MAX_SCHEDULE_SIZE).unwrap();
        assert_eq!(counts[0], counts[1]);
        assert!(counts[0] <= MAX_SCHEDULE_SIZE);
        assert_eq!(counts[2], 1);
    }

    #[test]
    fn test_tiny_weight_still_scheduled() {
        let counts = replication_counts(&[1, 1_000_000], 10).unwrap();
        assert_eq!(counts, vec![1, 10]);
    }

    #[test]
    fn test_zero_weight_entry_appears_once() {
        let counts = replication_counts(&[0, 5], 4).unwrap();
        assert_eq!(counts, vec![1, 4]);
    }

    #[test]
    fn test_shuffle_preserves_multiset() {
        let schedule = Schedule::from_entries(vec![0, 0, 0, 1, 1, 2]);
        let mut rng = StdRng::seed_from_u64(7);
        let shuffled = schedule.shuffled(&mut rng);

        let mut a = schedule.entries().to_vec();
        let mut b = shuffled.entries().to_vec();
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
    }

    #[test]
    fn test_validate_against() {
        let schedule = Schedule::from_entries(vec![0, 1, 2]);
        assert!(schedule.validate_against(3).is_ok());
        assert!(schedule.validate_against(2).is_err());
        assert!(Schedule::from_entries(vec![]).validate_against(1).is_err());
    }

    #[test]
    fn test_schedule_serializes_as_list() {
        let schedule = Schedule::from_entries(vec![1, 0, 1]);
        assert_eq!(serde_json::to_string(&schedule).unwrap(), "[1,0,1]");
    }

    proptest! {
        #[test]
        fn prop_every_query_scheduled(
            weights in prop::collection::vec(0u32..1_000, 1..20),
            max in 1usize..5_000,
        ) {
            prop_assume!(weights.iter().any(|&w| w > 0));
            let counts = replication_counts(&weights, max).unwrap();
            prop_assert_eq!(counts.len(), weights.len());
            prop_assert!(counts.iter().all(|&c| c >= 1));
        }

        #[test]
        fn prop_counts_monotonic_in_weight(
            weights in prop::collection::vec(1u32..1_000, 2..20),
            max in 1usize..5_000,
        ) {
            let counts = replication_counts(&weights, max).unwrap();
            for i in 0..weights.len() {
                for j in 0..weights.len() {
                    if weights[i] > weights[j] {
                        prop_assert!(counts[i] >= counts[j]);
                    }
                }
            }
        }
    }
}
