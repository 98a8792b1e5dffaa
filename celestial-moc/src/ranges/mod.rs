//! Canonical sorted interval store over a flat `u64` index domain.
//!
//! A [`RangeSet`] holds half-open [`Interval`]s that are sorted, disjoint and
//! non-adjacent: `[0,4) [4,8)` is always stored as `[0,8)`. Every mutating
//! method restores that form before returning, and bulk loads go through a
//! [`Batch`] guard that defers the sort-and-merge to a single pass.
//!
//! Binary set operations are linear merge-sweeps over the interval
//! boundaries of both operands; see [`RangeSet::union`] and friends.

mod batch;

pub use batch::Batch;

use std::fmt;

/// Half-open interval `[start, end)` over the flat index domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    pub start: u64,
    pub end: u64,
}

impl Interval {
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub const fn contains(&self, value: u64) -> bool {
        self.start <= value && value < self.end
    }

    pub const fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Policy deciding whether a partially covered coarse cell is kept when a
/// map loses resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Logic {
    /// Keep only coarse cells that were fully covered.
    Min,
    /// Keep every coarse cell touched by the coverage.
    #[default]
    Max,
}

/// Sorted, disjoint, maximally merged list of intervals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RangeSet {
    ranges: Vec<Interval>,
}

impl RangeSet {
    pub const fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Set holding the whole domain `[0, domain_end)`.
    pub fn full(domain_end: u64) -> Self {
        Self::from_canonical(vec![Interval::new(0, domain_end)])
    }

    /// Build from intervals in any order; overlaps and adjacency are merged.
    pub fn from_intervals(intervals: impl IntoIterator<Item = Interval>) -> Self {
        let mut ranges: Vec<Interval> = intervals.into_iter().collect();
        normalize(&mut ranges);
        Self { ranges }
    }

    /// Wrap intervals already in canonical form.
    pub(crate) fn from_canonical(ranges: Vec<Interval>) -> Self {
        debug_assert!(is_canonical(&ranges));
        Self { ranges }
    }

    pub fn as_slice(&self) -> &[Interval] {
        &self.ranges
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.ranges.iter()
    }

    /// Number of intervals.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Sum of interval lengths.
    pub fn total_len(&self) -> u64 {
        self.ranges.iter().map(Interval::len).sum()
    }

    /// Covered fraction of `[0, domain_end)`. Exactly `0.0` when empty and
    /// exactly `1.0` when the whole domain is covered.
    pub fn coverage(&self, domain_end: u64) -> f64 {
        let covered = self.total_len();
        if covered == 0 {
            0.0
        } else if covered >= domain_end {
            1.0
        } else {
            covered as f64 / domain_end as f64
        }
    }

    /// Insert one interval, merging with any neighbour it touches.
    ///
    /// Binary searches the first interval ending at or after `iv.start` and
    /// the last one starting at or before `iv.end`; everything in between
    /// collapses into a single interval.
    pub fn insert(&mut self, iv: Interval) {
        if iv.is_empty() {
            return;
        }
        let lo = self.ranges.partition_point(|r| r.end < iv.start);
        let hi = self.ranges.partition_point(|r| r.start <= iv.end);
        if lo == hi {
            self.ranges.insert(lo, iv);
            return;
        }
        let merged = Interval::new(
            iv.start.min(self.ranges[lo].start),
            iv.end.max(self.ranges[hi - 1].end),
        );
        self.ranges.splice(lo..hi, std::iter::once(merged));
    }

    /// Open a buffered insertion scope. See [`Batch`].
    pub fn batch(&mut self) -> Batch<'_> {
        Batch::new(self)
    }

    pub fn contains(&self, value: u64) -> bool {
        let i = self.ranges.partition_point(|r| r.end <= value);
        self.ranges.get(i).is_some_and(|r| r.start <= value)
    }

    /// `true` if `iv` lies entirely inside one stored interval.
    pub fn contains_interval(&self, iv: Interval) -> bool {
        if iv.is_empty() {
            return true;
        }
        let i = self.ranges.partition_point(|r| r.end <= iv.start);
        self.ranges
            .get(i)
            .is_some_and(|r| r.start <= iv.start && iv.end <= r.end)
    }

    pub fn intersects_interval(&self, iv: Interval) -> bool {
        let i = self.ranges.partition_point(|r| r.end <= iv.start);
        self.ranges.get(i).is_some_and(|r| r.overlaps(&iv))
    }

    /// `true` if every index of `other` is covered by `self`.
    pub fn includes(&self, other: &RangeSet) -> bool {
        let mut i = 0;
        for iv in &other.ranges {
            while i < self.ranges.len() && self.ranges[i].end <= iv.start {
                i += 1;
            }
            match self.ranges.get(i) {
                Some(r) if r.start <= iv.start && iv.end <= r.end => {}
                _ => return false,
            }
        }
        true
    }

    /// `true` if the two sets share at least one index.
    pub fn intersects(&self, other: &RangeSet) -> bool {
        let (a, b) = (&self.ranges, &other.ranges);
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            if a[i].overlaps(&b[j]) {
                return true;
            }
            if a[i].end <= b[j].end {
                i += 1;
            } else {
                j += 1;
            }
        }
        false
    }

    pub fn union(&self, other: &RangeSet) -> RangeSet {
        sweep(&self.ranges, &other.ranges, |a, b| a || b)
    }

    pub fn intersection(&self, other: &RangeSet) -> RangeSet {
        sweep(&self.ranges, &other.ranges, |a, b| a && b)
    }

    /// `self` minus `other`.
    pub fn subtraction(&self, other: &RangeSet) -> RangeSet {
        sweep(&self.ranges, &other.ranges, |a, b| a && !b)
    }

    /// Symmetric difference.
    pub fn difference(&self, other: &RangeSet) -> RangeSet {
        sweep(&self.ranges, &other.ranges, |a, b| a != b)
    }

    pub fn complement(&self, domain_end: u64) -> RangeSet {
        RangeSet::full(domain_end).subtraction(self)
    }

    /// Align every interval to a multiple of `2^shift`.
    ///
    /// [`Logic::Max`] rounds outward and keeps every block touched;
    /// [`Logic::Min`] rounds inward and drops blocks not fully covered.
    pub fn degrade(&self, shift: u32, logic: Logic) -> RangeSet {
        if shift == 0 {
            return self.clone();
        }
        let mask = (1u64 << shift) - 1;
        let mut out: Vec<Interval> = Vec::with_capacity(self.ranges.len());
        for r in &self.ranges {
            let iv = match logic {
                Logic::Max => Interval::new(r.start & !mask, (r.end + mask) & !mask),
                Logic::Min => Interval::new((r.start + mask) & !mask, r.end & !mask),
            };
            if iv.is_empty() {
                continue;
            }
            match out.last_mut() {
                Some(last) if last.end >= iv.start => last.end = last.end.max(iv.end),
                _ => out.push(iv),
            }
        }
        RangeSet::from_canonical(out)
    }

    /// `true` if every boundary is a multiple of `2^shift`.
    pub fn is_aligned(&self, shift: u32) -> bool {
        let mask = (1u64 << shift) - 1;
        self.ranges
            .iter()
            .all(|r| r.start & mask == 0 && r.end & mask == 0)
    }

    /// Merge already-sorted-and-merged intervals into the store in one pass.
    pub(crate) fn merge_canonical(&mut self, batch: &[Interval]) {
        if batch.is_empty() {
            return;
        }
        if self.ranges.is_empty() {
            self.ranges.extend_from_slice(batch);
            return;
        }
        self.ranges = sweep(&self.ranges, batch, |a, b| a || b).ranges;
    }
}

impl<'a> IntoIterator for &'a RangeSet {
    type Item = &'a Interval;
    type IntoIter = std::slice::Iter<'a, Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

impl FromIterator<Interval> for RangeSet {
    fn from_iter<I: IntoIterator<Item = Interval>>(iter: I) -> Self {
        Self::from_intervals(iter)
    }
}

/// Sort and merge in place.
pub(crate) fn normalize(ranges: &mut Vec<Interval>) {
    ranges.retain(|r| !r.is_empty());
    ranges.sort_unstable();
    let mut w = 0;
    for i in 0..ranges.len() {
        if w > 0 && ranges[w - 1].end >= ranges[i].start {
            ranges[w - 1].end = ranges[w - 1].end.max(ranges[i].end);
        } else {
            ranges[w] = ranges[i];
            w += 1;
        }
    }
    ranges.truncate(w);
}

fn is_canonical(ranges: &[Interval]) -> bool {
    ranges.iter().all(|r| !r.is_empty()) && ranges.windows(2).all(|w| w[0].end < w[1].start)
}

/// Boundary `k` of a canonical list: even `k` is a start, odd `k` an end.
fn boundary(ranges: &[Interval], k: usize) -> u64 {
    let r = &ranges[k / 2];
    if k % 2 == 0 {
        r.start
    } else {
        r.end
    }
}

/// Linear merge-sweep over the boundaries of two canonical lists.
///
/// After consuming every boundary equal to the current position, a cursor
/// that sits on an odd boundary is inside its operand. `keep` maps the pair
/// of memberships to output membership, and an interval is emitted at every
/// toggle. `keep(false, false)` must be `false`.
fn sweep(a: &[Interval], b: &[Interval], keep: impl Fn(bool, bool) -> bool) -> RangeSet {
    debug_assert!(!keep(false, false));
    let (na, nb) = (a.len() * 2, b.len() * 2);
    let (mut i, mut j) = (0usize, 0usize);
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut open: Option<u64> = None;

    while i < na || j < nb {
        let x = match (i < na, j < nb) {
            (true, true) => boundary(a, i).min(boundary(b, j)),
            (true, false) => boundary(a, i),
            _ => boundary(b, j),
        };
        while i < na && boundary(a, i) == x {
            i += 1;
        }
        while j < nb && boundary(b, j) == x {
            j += 1;
        }
        let inside = keep(i % 2 == 1, j % 2 == 1);
        match (open, inside) {
            (None, true) => open = Some(x),
            (Some(start), false) => {
                out.push(Interval::new(start, x));
                open = None;
            }
            _ => {}
        }
    }
    RangeSet::from_canonical(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(u64, u64)]) -> RangeSet {
        RangeSet::from_intervals(pairs.iter().map(|&(s, e)| Interval::new(s, e)))
    }

    fn pairs(s: &RangeSet) -> Vec<(u64, u64)> {
        s.iter().map(|r| (r.start, r.end)).collect()
    }

    #[test]
    fn from_intervals_sorts_and_merges() {
        let s = set(&[(10, 12), (0, 4), (4, 6), (11, 15), (20, 20)]);
        assert_eq!(pairs(&s), vec![(0, 6), (10, 15)]);
    }

    #[test]
    fn insert_disjoint_keeps_order() {
        let mut s = set(&[(0, 2), (10, 12)]);
        s.insert(Interval::new(5, 6));
        assert_eq!(pairs(&s), vec![(0, 2), (5, 6), (10, 12)]);
    }

    #[test]
    fn insert_merges_three_way() {
        let mut s = set(&[(0, 2), (4, 6), (10, 12)]);
        s.insert(Interval::new(2, 4));
        assert_eq!(pairs(&s), vec![(0, 6), (10, 12)]);
        s.insert(Interval::new(5, 11));
        assert_eq!(pairs(&s), vec![(0, 12)]);
    }

    #[test]
    fn insert_adjacent_merges() {
        let mut s = set(&[(4, 6)]);
        s.insert(Interval::new(6, 8));
        s.insert(Interval::new(2, 4));
        assert_eq!(pairs(&s), vec![(2, 8)]);
    }

    #[test]
    fn insert_empty_is_noop() {
        let mut s = set(&[(4, 6)]);
        s.insert(Interval::new(9, 9));
        assert_eq!(pairs(&s), vec![(4, 6)]);
    }

    #[test]
    fn contains_uses_half_open_bounds() {
        let s = set(&[(4, 6), (10, 12)]);
        assert!(!s.contains(3));
        assert!(s.contains(4));
        assert!(s.contains(5));
        assert!(!s.contains(6));
        assert!(s.contains(11));
        assert!(!s.contains(12));
    }

    #[test]
    fn includes_and_intersects() {
        let big = set(&[(0, 10), (20, 30)]);
        let small = set(&[(2, 4), (25, 30)]);
        let straddle = set(&[(8, 22)]);
        assert!(big.includes(&small));
        assert!(!small.includes(&big));
        assert!(!big.includes(&straddle));
        assert!(big.intersects(&straddle));
        assert!(!small.intersects(&set(&[(4, 25)])));
        assert!(big.includes(&RangeSet::new()));
        assert!(!RangeSet::new().intersects(&big));
    }

    #[test]
    fn union_intersection_subtraction_difference() {
        let a = set(&[(0, 10), (20, 30)]);
        let b = set(&[(5, 25), (30, 35)]);
        assert_eq!(pairs(&a.union(&b)), vec![(0, 35)]);
        assert_eq!(pairs(&a.intersection(&b)), vec![(5, 10), (20, 25)]);
        assert_eq!(pairs(&a.subtraction(&b)), vec![(0, 5), (25, 30)]);
        assert_eq!(
            pairs(&a.difference(&b)),
            vec![(0, 5), (10, 20), (25, 35)]
        );
    }

    #[test]
    fn operations_are_commutative_where_expected() {
        let a = set(&[(0, 3), (7, 9), (15, 40)]);
        let b = set(&[(2, 8), (9, 15), (39, 41)]);
        assert_eq!(a.union(&b), b.union(&a));
        assert_eq!(a.intersection(&b), b.intersection(&a));
        assert_eq!(a.difference(&b), b.difference(&a));
    }

    #[test]
    fn union_of_touching_sets_is_merged() {
        let a = set(&[(0, 5)]);
        let b = set(&[(5, 9)]);
        assert_eq!(pairs(&a.union(&b)), vec![(0, 9)]);
        assert!(a.intersection(&b).is_empty());
    }

    #[test]
    fn complement_round_trip() {
        let a = set(&[(0, 3), (7, 9)]);
        let c = a.complement(12);
        assert_eq!(pairs(&c), vec![(3, 7), (9, 12)]);
        assert_eq!(c.complement(12), a);
    }

    #[test]
    fn coverage_is_exact_at_the_boundaries() {
        assert_eq!(RangeSet::new().coverage(12), 0.0);
        assert_eq!(RangeSet::full(12).coverage(12), 1.0);
        assert_eq!(set(&[(0, 4)]).coverage(12), 1.0 / 3.0);
    }

    #[test]
    fn degrade_max_rounds_outward() {
        let s = set(&[(5, 9), (17, 18)]);
        assert_eq!(pairs(&s.degrade(2, Logic::Max)), vec![(4, 12), (16, 20)]);
        assert_eq!(pairs(&s.degrade(3, Logic::Max)), vec![(0, 24)]);
    }

    #[test]
    fn degrade_min_rounds_inward() {
        let s = set(&[(3, 13), (17, 18)]);
        assert_eq!(pairs(&s.degrade(2, Logic::Min)), vec![(4, 12)]);
        assert!(s.degrade(4, Logic::Min).is_empty());
    }

    #[test]
    fn degrade_is_idempotent() {
        let s = set(&[(3, 13), (17, 40)]);
        for logic in [Logic::Min, Logic::Max] {
            let once = s.degrade(3, logic);
            assert_eq!(once.degrade(3, logic), once);
            assert!(once.is_aligned(3));
        }
    }
}
