//! Per-dimension bookkeeping shared by the `NUNIQ`, ASCII and JSON checks.

use super::{Collector, Flow, TooManyErrors};
use crate::dim::{Cell, Dimension};
use crate::ranges::{Interval, RangeSet};
use std::fmt;

/// Ordering and overlaps are tracked over every cell seen. Canonical form is
/// checked per group: each [`finish`](CellTracker::finish) closes a group.
pub(crate) struct CellTracker {
    dim: Dimension,
    covered: RangeSet,
    last: Option<Cell>,
    group: RangeSet,
    group_cells: u64,
    overlaps: bool,
}

impl CellTracker {
    pub fn new(dim: Dimension) -> Self {
        Self {
            dim,
            covered: RangeSet::new(),
            last: None,
            group: RangeSet::new(),
            group_cells: 0,
            overlaps: false,
        }
    }

    /// Report an order above the dimension's maximum. Returns whether the
    /// order is usable.
    pub fn order(
        &self,
        out: &mut Collector,
        at: impl fmt::Display,
        order: u64,
    ) -> Result<bool, TooManyErrors> {
        if order > u64::from(self.dim.max_order()) {
            out.error(
                at,
                format!(
                    "{} order {order} exceeds the maximum {}",
                    self.dim.name().to_lowercase(),
                    self.dim.max_order()
                ),
            )?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Check cells `first..=last` at `order`. Orders above the maximum must be
    /// filtered through [`order`](Self::order) first.
    pub fn cells(
        &mut self,
        out: &mut Collector,
        at: impl fmt::Display,
        order: u8,
        first: u64,
        last: u64,
    ) -> Flow {
        let limit = self.dim.cells_at_order(order);
        if first > last {
            return out.error(at, format!("range {first}-{last} is reversed"));
        }
        if last >= limit {
            return out.error(
                at,
                format!("cell {last} is outside order {order}, which has {limit} cells"),
            );
        }
        let start = Cell::new(order, first);
        if self.last.is_some_and(|prev| start <= prev) {
            out.warn(&at, format!("cell {order}/{first} is not in ascending order"));
        }
        let shift = self.dim.shift(order);
        let flat = Interval::new(first << shift, (last + 1) << shift);
        if !self.overlaps && self.covered.intersects_interval(flat) {
            self.overlaps = true;
            out.warn(&at, format!("cell {order}/{first} overlaps a cell listed earlier"));
        }
        self.covered.insert(flat);
        self.group.insert(flat);
        self.group_cells += last - first + 1;
        self.last = Some(Cell::new(order, last));
        Ok(())
    }

    /// Report cells of the current group that a canonical writer would have
    /// merged into parents, then start a new group.
    pub fn finish(&mut self, out: &mut Collector, at: impl fmt::Display) {
        let group = std::mem::take(&mut self.group);
        let cells = std::mem::take(&mut self.group_cells);
        if self.overlaps {
            return;
        }
        let canonical = self.dim.cells(&group, 0).len() as u64;
        if canonical < cells {
            out.warn(
                at,
                format!("{cells} cells are not in canonical form; {canonical} cells cover the same area"),
            );
        }
    }
}
