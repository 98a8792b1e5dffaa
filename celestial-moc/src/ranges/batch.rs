use super::{normalize, Interval, RangeSet};

/// Buffered insertion scope over a [`RangeSet`].
///
/// Intervals pushed into a batch are appended to an unsorted side list. When
/// the batch is dropped (or [`finish`](Batch::finish)ed) the list is sorted
/// and merged once, then folded into the store in a single linear pass. For
/// large loads this replaces one `O(n)` splice per insertion with one
/// `O(k log k + n)` flush.
///
/// The batch holds the store's only mutable borrow, so the store cannot be
/// read while insertions are pending.
///
/// ```
/// use celestial_moc::ranges::{Interval, RangeSet};
///
/// let mut set = RangeSet::new();
/// {
///     let mut batch = set.batch();
///     batch.push(Interval::new(10, 20));
///     batch.push(Interval::new(0, 10));
/// }
/// assert_eq!(set.as_slice(), &[Interval::new(0, 20)]);
/// ```
pub struct Batch<'a> {
    target: &'a mut RangeSet,
    pending: Vec<Interval>,
}

impl<'a> Batch<'a> {
    pub(super) fn new(target: &'a mut RangeSet) -> Self {
        Self {
            target,
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, iv: Interval) {
        if !iv.is_empty() {
            self.pending.push(iv);
        }
    }

    /// Number of intervals waiting for the flush.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Flush now. Equivalent to dropping the batch.
    pub fn finish(self) {}

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut pending = std::mem::take(&mut self.pending);
        let received = pending.len();
        normalize(&mut pending);
        tracing::trace!(
            received,
            merged = pending.len(),
            existing = self.target.len(),
            "flushing range batch"
        );
        self.target.merge_canonical(&pending);
    }
}

impl Extend<Interval> for Batch<'_> {
    fn extend<I: IntoIterator<Item = Interval>>(&mut self, iter: I) {
        for iv in iter {
            self.push(iv);
        }
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_flushes_on_drop() {
        let mut set = RangeSet::new();
        {
            let mut batch = set.batch();
            batch.push(Interval::new(8, 9));
            batch.push(Interval::new(0, 2));
            batch.push(Interval::new(1, 4));
            assert_eq!(batch.pending(), 3);
        }
        assert_eq!(
            set.as_slice(),
            &[Interval::new(0, 4), Interval::new(8, 9)]
        );
    }

    #[test]
    fn batch_merges_with_existing_content() {
        let mut set = RangeSet::from_intervals([Interval::new(4, 6), Interval::new(20, 30)]);
        let mut batch = set.batch();
        batch.extend([Interval::new(6, 8), Interval::new(2, 4), Interval::new(30, 31)]);
        batch.finish();
        assert_eq!(
            set.as_slice(),
            &[Interval::new(2, 8), Interval::new(20, 31)]
        );
    }

    #[test]
    fn batch_matches_direct_insertion() {
        let intervals: Vec<Interval> = (0..2000u64)
            .map(|i| {
                let start = (i * 7919) % 10_000;
                Interval::new(start, start + 1 + i % 5)
            })
            .collect();

        let mut direct = RangeSet::new();
        for iv in &intervals {
            direct.insert(*iv);
        }

        let mut buffered = RangeSet::new();
        buffered.batch().extend(intervals.iter().copied());

        assert_eq!(direct, buffered);
    }

    #[test]
    fn empty_batch_leaves_store_untouched() {
        let mut set = RangeSet::from_intervals([Interval::new(1, 2)]);
        set.batch().push(Interval::new(5, 5));
        assert_eq!(set.as_slice(), &[Interval::new(1, 2)]);
    }
}
