//! Hierarchical index mapping for the two MOC dimensions.
//!
//! Both dimensions linearize a tree of cells into a flat `u64` index domain
//! at the dimension's maximum order:
//!
//! | Dimension | Radix | Base cells | Max order | Domain size |
//! |-----------|-------|------------|-----------|-------------|
//! | Space | 4 (quad-tree) | 12 | 29 | `12 × 4^29 = 3 × 2^60` |
//! | Time | 2 (binary tree) | 1 | 61 | `2^61` µs |
//!
//! A cell `c` at order `o` covers the flat interval
//! `[c × r^(M-o), (c+1) × r^(M-o))`. All powers are shifts; no floating
//! point is involved anywhere in the mapping.

use crate::error::{MocError, Result};
use crate::ranges::{Interval, RangeSet};
use std::fmt;

/// Axis a coverage map is defined on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Dimension {
    /// Sky coverage, HEALPix nested scheme.
    Space,
    /// Time coverage, one microsecond per cell at order 61.
    Time,
}

/// A single cell of the hierarchy. Orders sort before indices, which is the
/// grouping used by every serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub order: u8,
    pub index: u64,
}

impl Cell {
    pub const fn new(order: u8, index: u64) -> Self {
        Self { order, index }
    }
}

impl Dimension {
    /// log2 of the radix: 2 for the space quad-tree, 1 for the time tree.
    pub const fn radix_bits(self) -> u32 {
        match self {
            Self::Space => 2,
            Self::Time => 1,
        }
    }

    pub const fn radix(self) -> u64 {
        1 << self.radix_bits()
    }

    pub const fn base_cells(self) -> u64 {
        match self {
            Self::Space => 12,
            Self::Time => 1,
        }
    }

    pub const fn max_order(self) -> u8 {
        match self {
            Self::Space => 29,
            Self::Time => 61,
        }
    }

    /// Prefix letter used by the ASCII serialization.
    pub const fn prefix(self) -> char {
        match self {
            Self::Space => 's',
            Self::Time => 't',
        }
    }

    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            's' | 'S' => Some(Self::Space),
            't' | 'T' => Some(Self::Time),
            _ => None,
        }
    }

    /// `MOCDIM` keyword value.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Space => "SPACE",
            Self::Time => "TIME",
        }
    }

    /// Reference system assumed when none is given.
    pub const fn default_system(self) -> &'static str {
        match self {
            Self::Space => "C",
            Self::Time => "TCB",
        }
    }

    /// FITS keyword carrying the reference system.
    pub const fn system_keyword(self) -> &'static str {
        match self {
            Self::Space => "COORDSYS",
            Self::Time => "TIMESYS",
        }
    }

    /// FITS keyword carrying the per-axis MOC order.
    pub const fn order_keyword(self) -> &'static str {
        match self {
            Self::Space => "MOCORD_S",
            Self::Time => "MOCORD_T",
        }
    }

    /// Number of flat-index bits below one cell of `order`.
    pub const fn shift(self, order: u8) -> u32 {
        self.radix_bits() * (self.max_order() - order) as u32
    }

    /// Number of flat indices covered by one cell of `order`.
    pub const fn cell_size(self, order: u8) -> u64 {
        1 << self.shift(order)
    }

    pub const fn cells_at_order(self, order: u8) -> u64 {
        self.base_cells() << (self.radix_bits() * order as u32)
    }

    /// Exclusive upper bound of the flat index domain.
    pub const fn domain_end(self) -> u64 {
        self.cells_at_order(self.max_order())
    }

    pub fn check_order(self, order: u8) -> Result<()> {
        if order > self.max_order() {
            return Err(MocError::InvalidOrder {
                order,
                max: self.max_order(),
            });
        }
        Ok(())
    }

    pub fn check_cell(self, order: u8, cell: u64) -> Result<()> {
        self.check_order(order)?;
        let ncells = self.cells_at_order(order);
        if cell >= ncells {
            return Err(MocError::OutOfRange {
                order,
                value: cell,
                max: ncells - 1,
            });
        }
        Ok(())
    }

    /// Flat interval covered by `cell` at `order`.
    pub fn to_flat(self, order: u8, cell: u64) -> Result<Interval> {
        self.check_cell(order, cell)?;
        let shift = self.shift(order);
        Ok(Interval::new(cell << shift, (cell + 1) << shift))
    }

    /// Flat interval covered by the inclusive cell run `first..=last`.
    pub fn to_flat_range(self, order: u8, first: u64, last: u64) -> Result<Interval> {
        let start = self.to_flat(order, first)?;
        let end = self.to_flat(order, last)?;
        if end.end <= start.start {
            return Err(MocError::OutOfRange {
                order,
                value: last,
                max: first,
            });
        }
        Ok(Interval::new(start.start, end.end))
    }

    /// Cell of `order` containing the flat index `flat`.
    pub const fn cell_of(self, order: u8, flat: u64) -> u64 {
        flat >> self.shift(order)
    }

    /// Single-integer cell id: `r^(order+1) + cell`.
    ///
    /// For space this is the IVOA NUNIQ value `4 × 4^order + ipix`.
    pub const fn uniq_encode(self, order: u8, cell: u64) -> u64 {
        (1u64 << (self.radix_bits() * (order as u32 + 1))) + cell
    }

    /// Inverse of [`uniq_encode`](Self::uniq_encode). The order is read from
    /// the position of the highest set bit.
    pub fn uniq_decode(self, uniq: u64) -> Result<Cell> {
        if uniq == 0 {
            return Err(MocError::format("UNIQ value 0 does not encode a cell"));
        }
        let msb = 63 - uniq.leading_zeros();
        let level = msb / self.radix_bits();
        if level == 0 || level - 1 > self.max_order() as u32 {
            return Err(MocError::format(format!(
                "UNIQ value {} does not encode a {} cell",
                uniq,
                self.name()
            )));
        }
        let order = (level - 1) as u8;
        let index = uniq - (1u64 << (self.radix_bits() * level));
        if index >= self.cells_at_order(order) {
            return Err(MocError::format(format!(
                "UNIQ value {} decodes to cell {} beyond order {}",
                uniq, index, order
            )));
        }
        Ok(Cell { order, index })
    }

    /// Split canonical ranges into maximal aligned cells no coarser than
    /// `min_order`, sorted by order then index.
    pub fn cells(self, ranges: &RangeSet, min_order: u8) -> Vec<Cell> {
        let min_order = min_order.min(self.max_order());
        let mut out = Vec::new();
        for iv in ranges {
            let mut pos = iv.start;
            while pos < iv.end {
                let mut order = min_order;
                while order < self.max_order() {
                    let size = self.cell_size(order);
                    if pos % size == 0 && pos + size <= iv.end {
                        break;
                    }
                    order += 1;
                }
                out.push(Cell::new(order, pos >> self.shift(order)));
                pos += self.cell_size(order);
            }
        }
        out.sort_unstable();
        out
    }

    /// Coarsest order whose cell boundaries match every boundary of `ranges`.
    pub fn finest_order(self, ranges: &RangeSet) -> u8 {
        self.finest_order_of_bits(ranges.iter().fold(0, |acc, iv| acc | iv.start | iv.end))
    }

    /// Coarsest order whose cell size divides every value OR-ed into `bits`.
    pub fn finest_order_of_bits(self, bits: u64) -> u8 {
        (0..=self.max_order())
            .find(|&order| bits & (self.cell_size(order) - 1) == 0)
            .unwrap_or(self.max_order())
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_sizes() {
        assert_eq!(Dimension::Space.domain_end(), 12 * (1u64 << 58));
        assert_eq!(Dimension::Space.domain_end(), 3 << 60);
        assert_eq!(Dimension::Time.domain_end(), 1 << 61);
    }

    #[test]
    fn cells_per_order() {
        assert_eq!(Dimension::Space.cells_at_order(0), 12);
        assert_eq!(Dimension::Space.cells_at_order(3), 768);
        assert_eq!(Dimension::Time.cells_at_order(0), 1);
        assert_eq!(Dimension::Time.cells_at_order(2), 4);
    }

    #[test]
    fn to_flat_space() {
        let iv = Dimension::Space.to_flat(3, 10).unwrap();
        let size = 1u64 << 52;
        assert_eq!(iv, Interval::new(10 * size, 11 * size));
    }

    #[test]
    fn to_flat_time_max_order_is_identity() {
        let iv = Dimension::Time.to_flat(61, 12345).unwrap();
        assert_eq!(iv, Interval::new(12345, 12346));
    }

    #[test]
    fn to_flat_rejects_out_of_range() {
        assert!(matches!(
            Dimension::Space.to_flat(0, 12),
            Err(MocError::OutOfRange { order: 0, .. })
        ));
        assert!(matches!(
            Dimension::Time.to_flat(2, 4),
            Err(MocError::OutOfRange { .. })
        ));
        assert!(matches!(
            Dimension::Space.to_flat(30, 0),
            Err(MocError::InvalidOrder { order: 30, max: 29 })
        ));
    }

    #[test]
    fn to_flat_range_inclusive() {
        let iv = Dimension::Space.to_flat_range(4, 12, 15).unwrap();
        assert_eq!(iv, Dimension::Space.to_flat(3, 3).unwrap());
    }

    #[test]
    fn nuniq_matches_ivoa_definition() {
        assert_eq!(Dimension::Space.uniq_encode(0, 0), 4);
        assert_eq!(Dimension::Space.uniq_encode(0, 11), 15);
        assert_eq!(Dimension::Space.uniq_encode(1, 0), 16);
        assert_eq!(Dimension::Space.uniq_encode(3, 10), 4 * 64 + 10);
    }

    #[test]
    fn uniq_decode_inverts_encode() {
        for dim in [Dimension::Space, Dimension::Time] {
            for order in [0u8, 1, 7, 13, dim.max_order()] {
                let last = dim.cells_at_order(order) - 1;
                for index in [0, last / 2, last] {
                    let uniq = dim.uniq_encode(order, index);
                    assert_eq!(dim.uniq_decode(uniq).unwrap(), Cell::new(order, index));
                }
            }
        }
    }

    #[test]
    fn uniq_decode_rejects_gaps() {
        assert!(Dimension::Space.uniq_decode(0).is_err());
        assert!(Dimension::Space.uniq_decode(3).is_err());
        // Time order 0 holds a single cell: uniq 2 is valid, 3 is not.
        assert!(Dimension::Time.uniq_decode(2).is_ok());
        assert!(Dimension::Time.uniq_decode(3).is_err());
        assert!(Dimension::Time.uniq_decode(1).is_err());
    }

    #[test]
    fn max_order_uniq_fits_in_i64() {
        let space = Dimension::Space.uniq_encode(29, Dimension::Space.cells_at_order(29) - 1);
        let time = Dimension::Time.uniq_encode(61, Dimension::Time.cells_at_order(61) - 1);
        assert!(space <= i64::MAX as u64);
        assert!(time <= i64::MAX as u64);
    }

    #[test]
    fn cells_are_maximal_and_sorted() {
        let dim = Dimension::Space;
        let mut set = RangeSet::new();
        set.insert(dim.to_flat_range(4, 12, 18).unwrap());
        set.insert(dim.to_flat(3, 10).unwrap());
        let cells = dim.cells(&set, 0);
        assert_eq!(
            cells,
            vec![
                Cell::new(3, 3),
                Cell::new(3, 10),
                Cell::new(4, 16),
                Cell::new(4, 17),
                Cell::new(4, 18)
            ]
        );
    }

    #[test]
    fn cells_respect_min_order() {
        let dim = Dimension::Space;
        let set = RangeSet::from_intervals([dim.to_flat(0, 1).unwrap()]);
        assert_eq!(dim.cells(&set, 0), vec![Cell::new(0, 1)]);
        let split = dim.cells(&set, 1);
        assert_eq!(split.len(), 4);
        assert_eq!(split[0], Cell::new(1, 4));
        assert_eq!(split[3], Cell::new(1, 7));
    }

    #[test]
    fn finest_order_of_ranges() {
        let dim = Dimension::Time;
        assert_eq!(dim.finest_order(&RangeSet::new()), 0);
        let set = RangeSet::from_intervals([dim.to_flat(5, 3).unwrap()]);
        assert_eq!(dim.finest_order(&set), 5);
        assert_eq!(dim.finest_order(&RangeSet::full(dim.domain_end())), 0);
    }

    #[test]
    fn prefixes_round_trip() {
        for dim in [Dimension::Space, Dimension::Time] {
            assert_eq!(Dimension::from_prefix(dim.prefix()), Some(dim));
        }
        assert_eq!(Dimension::from_prefix('x'), None);
    }
}
