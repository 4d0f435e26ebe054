//! Grouped accumulator and finalized results

use crate::aggregate::function::{Contribution, GroupKey, ReduceFn};
use crate::store::PartialAggregate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Finalized statistics of one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    pub total: u64,
    pub late: u64,
    /// Late share in whole percent, rounded half up
    pub percent: u8,
}

impl GroupStats {
    pub fn from_contribution(c: Contribution) -> Self {
        Self {
            total: c.total,
            late: c.late,
            percent: late_percent(c.late, c.total),
        }
    }
}

/// `round_half_up(100 * late / total)`, 0 when `total` is 0
pub fn late_percent(late: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let late = u128::from(late.min(total));
    let total = u128::from(total);
    ((late * 100 + total / 2) / total) as u8
}

/// Result of one aggregation run, ordered by group key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AggregateResult {
    groups: BTreeMap<GroupKey, GroupStats>,
}

impl AggregateResult {
    pub fn get(&self, key: &str) -> Option<&GroupStats> {
        self.groups.get(key)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &GroupStats)> {
        self.groups.iter()
    }
}

impl FromIterator<(GroupKey, GroupStats)> for AggregateResult {
    fn from_iter<I: IntoIterator<Item = (GroupKey, GroupStats)>>(iter: I) -> Self {
        Self {
            groups: iter.into_iter().collect(),
        }
    }
}

/// Mutable per-run group state
#[derive(Debug)]
pub struct GroupAccumulator {
    groups: HashMap<GroupKey, Contribution>,
    reduce: ReduceFn,
}

impl GroupAccumulator {
    pub fn new(reduce: ReduceFn) -> Self {
        Self {
            groups: HashMap::new(),
            reduce,
        }
    }

    /// Fold one contribution into its group
    pub fn add(&mut self, key: GroupKey, contribution: Contribution) {
        let reduce = self.reduce;
        self.groups
            .entry(key)
            .and_modify(|acc| *acc = reduce(*acc, contribution))
            .or_insert(contribution);
    }

    /// Fold every group of a partition result
    pub fn merge_partial(&mut self, partial: PartialAggregate) {
        for (key, contribution) in partial.groups {
            self.add(key, contribution);
        }
    }

    /// Fold another accumulator into this one
    pub fn merge(&mut self, other: GroupAccumulator) {
        for (key, contribution) in other.groups {
            self.add(key, contribution);
        }
    }

    pub fn finalize(self) -> AggregateResult {
        self.groups
            .into_iter()
            .map(|(key, c)| (key, GroupStats::from_contribution(c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contributions() -> Vec<(GroupKey, Contribution)> {
        let carriers = ["AA", "DL", "UA", "WN"];
        (0..40u64)
            .map(|i| {
                let key = carriers[(i % 4) as usize].to_string();
                (key, Contribution::single(i % 3 == 0))
            })
            .collect()
    }

    fn fold(items: &[(GroupKey, Contribution)]) -> GroupAccumulator {
        let mut acc = GroupAccumulator::new(Contribution::merge);
        for (key, c) in items {
            acc.add(key.clone(), *c);
        }
        acc
    }

    #[test]
    fn test_late_percent() {
        assert_eq!(late_percent(1, 2), 50);
        assert_eq!(late_percent(1, 3), 33);
        assert_eq!(late_percent(2, 3), 67);
        assert_eq!(late_percent(1, 200), 1); // 0.5 rounds up
        assert_eq!(late_percent(0, 7), 0);
        assert_eq!(late_percent(7, 7), 100);
        assert_eq!(late_percent(0, 0), 0);
        assert_eq!(late_percent(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn test_finalize() {
        let mut acc = GroupAccumulator::new(Contribution::merge);
        acc.add("AA".to_string(), Contribution::single(false));
        acc.add("AA".to_string(), Contribution::single(true));
        acc.add("UA".to_string(), Contribution::single(true));

        let result = acc.finalize();
        assert_eq!(
            result.get("AA"),
            Some(&GroupStats {
                total: 2,
                late: 1,
                percent: 50
            })
        );
        assert_eq!(result.get("UA").unwrap().percent, 100);
        let keys: Vec<_> = result.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["AA", "UA"]);
    }

    #[test]
    fn test_empty_accumulator_finalizes_to_empty_result() {
        let acc = GroupAccumulator::new(Contribution::merge);
        assert!(acc.finalize().is_empty());
    }

    #[test]
    fn test_partition_split_does_not_change_result() {
        let items = contributions();
        let expected = fold(&items).finalize();

        for parts in [1usize, 2, 3, 7, 40] {
            let chunk = items.len().div_ceil(parts);
            let mut partials: Vec<GroupAccumulator> = items.chunks(chunk).map(fold).collect();

            // merge in forward order
            let mut forward = GroupAccumulator::new(Contribution::merge);
            for p in partials.drain(..) {
                forward.merge(p);
            }
            assert_eq!(forward.finalize(), expected, "parts={}", parts);

            // merge in reverse, pairwise
            let mut partials: Vec<GroupAccumulator> = items.chunks(chunk).map(fold).collect();
            partials.reverse();
            while partials.len() > 1 {
                let b = partials.pop().unwrap();
                let mut a = partials.pop().unwrap();
                a.merge(b);
                partials.insert(0, a);
            }
            assert_eq!(partials.pop().unwrap().finalize(), expected, "parts={}", parts);
        }
    }

    #[test]
    fn test_interleaved_order_does_not_change_result() {
        let items = contributions();
        let expected = fold(&items).finalize();

        let mut reversed = items.clone();
        reversed.reverse();
        assert_eq!(fold(&reversed).finalize(), expected);

        let mut strided: Vec<_> = items.iter().step_by(2).cloned().collect();
        strided.extend(items.iter().skip(1).step_by(2).cloned());
        assert_eq!(fold(&strided).finalize(), expected);
    }

    #[test]
    fn test_merge_partial() {
        let mut partial = PartialAggregate::new(3);
        partial
            .groups
            .insert("AA".to_string(), Contribution { total: 4, late: 1 });

        let mut acc = GroupAccumulator::new(Contribution::merge);
        acc.add("AA".to_string(), Contribution { total: 2, late: 2 });
        acc.merge_partial(partial);

        let result = acc.finalize();
        let stats = result.get("AA").unwrap();
        assert_eq!((stats.total, stats.late, stats.percent), (6, 3, 50));
    }

    #[test]
    fn test_invariants_hold_for_every_group() {
        let result = fold(&contributions()).finalize();
        for (_, stats) in result.iter() {
            assert!(stats.late <= stats.total);
            assert!(stats.percent <= 100);
        }
    }
}
