//! Single-dimension coverage maps.
//!
//! A [`Moc`] is a [`RangeSet`] over one [`Dimension`] plus the metadata that
//! travels with it through the codecs: the resolution (`moc_order`), the
//! enumeration floor (`min_order`), the reference system and free-form
//! string properties.
//!
//! ```
//! use celestial_moc::Moc;
//!
//! let mut moc = Moc::space();
//! moc.add("3/10 4/12-15 18 22").unwrap();
//! assert!(moc.contains_cell(3, 3).unwrap());
//! assert_eq!(moc.moc_order(), 4);
//! assert_eq!(moc.to_ascii(), "3/3 10 4/18 22");
//! ```

use crate::config::WriteOptions;
use crate::dim::{Cell, Dimension};
use crate::error::{MocError, Result};
use crate::io::{self, ascii, fits, json, Format, ParsedCells};
use crate::ranges::{Batch, Interval, Logic, RangeSet};
use crate::{hpx, time};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

/// Bytes one stored interval costs; drives [`Moc::reduction`].
pub const BYTES_PER_RANGE: usize = 16;

#[derive(Debug, Clone)]
pub struct Moc {
    dim: Dimension,
    ranges: RangeSet,
    moc_order: u8,
    min_order: u8,
    system: String,
    properties: BTreeMap<String, String>,
}

impl Moc {
    /// Empty map at order 0 in the dimension's default reference system.
    pub fn new(dim: Dimension) -> Self {
        Self {
            dim,
            ranges: RangeSet::new(),
            moc_order: 0,
            min_order: 0,
            system: dim.default_system().to_string(),
            properties: BTreeMap::new(),
        }
    }

    pub fn space() -> Self {
        Self::new(Dimension::Space)
    }

    pub fn time() -> Self {
        Self::new(Dimension::Time)
    }

    /// Parse an ASCII or JSON map of the given dimension.
    pub fn parse(dim: Dimension, text: &str) -> Result<Self> {
        let mut moc = Self::new(dim);
        let parsed = match Format::detect(text.as_bytes()) {
            Format::Json => json::parse_cells(dim, text)?,
            _ => ascii::parse_cells(dim, text)?,
        };
        moc.apply(parsed);
        Ok(moc)
    }

    pub(crate) fn from_parts(
        dim: Dimension,
        ranges: RangeSet,
        moc_order: u8,
        system: String,
        properties: BTreeMap<String, String>,
    ) -> Self {
        Self {
            dim,
            ranges,
            moc_order,
            min_order: 0,
            system,
            properties,
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dim
    }

    pub fn ranges(&self) -> &RangeSet {
        &self.ranges
    }

    pub fn moc_order(&self) -> u8 {
        self.moc_order
    }

    pub fn min_order(&self) -> u8 {
        self.min_order
    }

    /// Reference system: `COORDSYS` for space, `TIMESYS` for time.
    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn set_system(&mut self, system: &str) -> Result<()> {
        fits::check_value(self.dim.system_keyword(), system)?;
        self.system = system.to_string();
        Ok(())
    }

    pub fn with_system(mut self, system: &str) -> Result<Self> {
        self.set_system(system)?;
        Ok(self)
    }

    // --- insertion -------------------------------------------------------

    /// Add every cell of an ASCII or JSON string. Nothing is added unless the
    /// whole string parses.
    pub fn add(&mut self, text: &str) -> Result<()> {
        let parsed = match Format::detect(text.as_bytes()) {
            Format::Json => json::parse_cells(self.dim, text)?,
            _ => ascii::parse_cells(self.dim, text)?,
        };
        self.apply(parsed);
        Ok(())
    }

    fn apply(&mut self, parsed: ParsedCells) {
        if let Some(order) = parsed.deepest {
            self.moc_order = self.moc_order.max(order);
        }
        self.ranges.batch().extend(parsed.ranges);
    }

    pub fn add_cell(&mut self, order: u8, cell: u64) -> Result<()> {
        let iv = self.dim.to_flat(order, cell)?;
        self.moc_order = self.moc_order.max(order);
        self.ranges.insert(iv);
        Ok(())
    }

    /// Add the inclusive cell run `first..=last` at `order`.
    pub fn add_cells(&mut self, order: u8, first: u64, last: u64) -> Result<()> {
        let iv = self.dim.to_flat_range(order, first, last)?;
        self.moc_order = self.moc_order.max(order);
        self.ranges.insert(iv);
        Ok(())
    }

    pub fn add_uniq(&mut self, uniq: u64) -> Result<()> {
        let cell = self.dim.uniq_decode(uniq)?;
        self.add_cell(cell.order, cell.index)
    }

    /// Add the HEALPix cell containing a sky position, in degrees.
    pub fn add_position(&mut self, order: u8, lon_deg: f64, lat_deg: f64) -> Result<()> {
        self.expect_dimension(Dimension::Space)?;
        let cell = hpx::lonlat_to_cell(order, lon_deg, lat_deg)?;
        self.add_cell(order, cell)
    }

    /// Add the time cell containing a Julian date.
    pub fn add_time(&mut self, order: u8, jd: f64) -> Result<()> {
        self.expect_dimension(Dimension::Time)?;
        let cell = time::jd_to_cell(order, jd)?;
        self.add_cell(order, cell)
    }

    /// Add every time cell between two Julian dates, both ends included.
    pub fn add_time_range(&mut self, order: u8, jd_start: f64, jd_end: f64) -> Result<()> {
        self.expect_dimension(Dimension::Time)?;
        let first = time::jd_to_cell(order, jd_start)?;
        let last = time::jd_to_cell(order, jd_end)?;
        if last < first {
            return Err(MocError::InvalidCoordinate(format!(
                "time range ends ({jd_end}) before it starts ({jd_start})"
            )));
        }
        self.add_cells(order, first, last)
    }

    /// Open a buffered insertion scope. Cells pushed through the returned
    /// guard are merged into the map when it is dropped.
    pub fn batch(&mut self) -> MocBatch<'_> {
        MocBatch {
            dim: self.dim,
            moc_order: &mut self.moc_order,
            batch: self.ranges.batch(),
        }
    }

    fn expect_dimension(&self, expected: Dimension) -> Result<()> {
        if self.dim != expected {
            return Err(MocError::DimensionMismatch {
                expected,
                actual: self.dim,
            });
        }
        Ok(())
    }

    // --- queries ---------------------------------------------------------

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ranges.as_slice() == [Interval::new(0, self.dim.domain_end())]
    }

    /// Number of stored intervals.
    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    /// Covered fraction of the whole domain.
    pub fn coverage(&self) -> f64 {
        self.ranges.coverage(self.dim.domain_end())
    }

    /// Every cell of the map, split no coarser than `min_order`, sorted by
    /// order then index.
    pub fn cells(&self) -> Vec<Cell> {
        self.dim
            .cells(&self.ranges, self.min_order.min(self.moc_order))
    }

    pub fn cell_count(&self) -> usize {
        self.cells().len()
    }

    /// Deepest order among the stored cells, `None` when empty.
    pub fn deepest_cell_order(&self) -> Option<u8> {
        if self.ranges.is_empty() {
            None
        } else {
            Some(self.dim.finest_order(&self.ranges))
        }
    }

    /// `true` if the whole cell is covered.
    pub fn contains_cell(&self, order: u8, cell: u64) -> Result<bool> {
        Ok(self.ranges.contains_interval(self.dim.to_flat(order, cell)?))
    }

    /// `true` if any part of the cell is covered.
    pub fn intersects_cell(&self, order: u8, cell: u64) -> Result<bool> {
        Ok(self
            .ranges
            .intersects_interval(self.dim.to_flat(order, cell)?))
    }

    /// Membership of one flat index at the finest order.
    pub fn contains_value(&self, flat: u64) -> bool {
        self.ranges.contains(flat)
    }

    pub fn contains_position(&self, lon_deg: f64, lat_deg: f64) -> Result<bool> {
        self.expect_dimension(Dimension::Space)?;
        let max = Dimension::Space.max_order();
        Ok(self.contains_value(hpx::lonlat_to_cell(max, lon_deg, lat_deg)?))
    }

    pub fn contains_time(&self, jd: f64) -> Result<bool> {
        self.expect_dimension(Dimension::Time)?;
        Ok(self.contains_value(time::jd_to_micros(jd)?))
    }

    /// `true` if every part of `other` is covered by `self`.
    pub fn includes(&self, other: &Moc) -> Result<bool> {
        self.check_compatible(other)?;
        Ok(self.ranges.includes(&other.ranges))
    }

    pub fn intersects(&self, other: &Moc) -> Result<bool> {
        self.check_compatible(other)?;
        Ok(self.ranges.intersects(&other.ranges))
    }

    // --- algebra ---------------------------------------------------------

    fn check_compatible(&self, other: &Moc) -> Result<()> {
        if self.dim != other.dim {
            return Err(MocError::DimensionMismatch {
                expected: self.dim,
                actual: other.dim,
            });
        }
        if self.system != other.system {
            return Err(MocError::IncompatibleSystem {
                left: self.system.clone(),
                right: other.system.clone(),
            });
        }
        Ok(())
    }

    fn ranges_at(&self, order: u8, logic: Logic) -> Cow<'_, RangeSet> {
        if order < self.moc_order {
            Cow::Owned(self.ranges.degrade(self.dim.shift(order), logic))
        } else {
            Cow::Borrowed(&self.ranges)
        }
    }

    /// Apply `op` to both operands at the order `logic` selects. The result
    /// carries the left operand's system and properties.
    fn combine(
        &self,
        other: &Moc,
        logic: Logic,
        op: fn(&RangeSet, &RangeSet) -> RangeSet,
    ) -> Result<Moc> {
        self.check_compatible(other)?;
        let order = match logic {
            Logic::Max => self.moc_order.max(other.moc_order),
            Logic::Min => self.moc_order.min(other.moc_order),
        };
        let left = self.ranges_at(order, logic);
        let right = other.ranges_at(order, logic);
        let ranges = op(&left, &right);
        Ok(Moc {
            dim: self.dim,
            ranges,
            moc_order: order,
            min_order: self.min_order.min(order),
            system: self.system.clone(),
            properties: self.properties.clone(),
        })
    }

    pub fn union(&self, other: &Moc) -> Result<Moc> {
        self.union_with(other, Logic::default())
    }

    pub fn union_with(&self, other: &Moc, logic: Logic) -> Result<Moc> {
        self.combine(other, logic, RangeSet::union)
    }

    pub fn intersection(&self, other: &Moc) -> Result<Moc> {
        self.intersection_with(other, Logic::default())
    }

    pub fn intersection_with(&self, other: &Moc, logic: Logic) -> Result<Moc> {
        self.combine(other, logic, RangeSet::intersection)
    }

    /// `self` minus `other`.
    pub fn subtraction(&self, other: &Moc) -> Result<Moc> {
        self.subtraction_with(other, Logic::default())
    }

    pub fn subtraction_with(&self, other: &Moc, logic: Logic) -> Result<Moc> {
        self.combine(other, logic, RangeSet::subtraction)
    }

    /// Symmetric difference.
    pub fn difference(&self, other: &Moc) -> Result<Moc> {
        self.difference_with(other, Logic::default())
    }

    pub fn difference_with(&self, other: &Moc, logic: Logic) -> Result<Moc> {
        self.combine(other, logic, RangeSet::difference)
    }

    pub fn complement(&self) -> Moc {
        Moc {
            ranges: self.ranges.complement(self.dim.domain_end()),
            ..self.clone()
        }
    }

    // --- resolution ------------------------------------------------------

    /// Change the resolution, degrading with [`Logic::Max`].
    pub fn set_moc_order(&mut self, order: u8) -> Result<()> {
        self.set_moc_order_with(order, Logic::default())
    }

    pub fn set_moc_order_with(&mut self, order: u8, logic: Logic) -> Result<()> {
        self.dim.check_order(order)?;
        if order < self.moc_order {
            self.ranges = self.ranges.degrade(self.dim.shift(order), logic);
            tracing::debug!(
                from = self.moc_order,
                to = order,
                ?logic,
                ranges = self.ranges.len(),
                "degraded coverage map"
            );
        }
        self.moc_order = order;
        self.min_order = self.min_order.min(order);
        Ok(())
    }

    /// Degraded copy at `order`.
    pub fn degraded(&self, order: u8, logic: Logic) -> Result<Moc> {
        let mut out = self.clone();
        out.set_moc_order_with(order, logic)?;
        Ok(out)
    }

    /// Floor for cell enumeration: cells coarser than `order` are split when
    /// the map is listed or serialized. Storage is unaffected.
    pub fn set_min_order(&mut self, order: u8) -> Result<()> {
        self.dim.check_order(order)?;
        self.min_order = order;
        Ok(())
    }

    /// Lower the order until the ranges fit in `budget_bytes`, with
    /// [`Logic::Max`]. Returns the resulting order.
    pub fn reduction(&mut self, budget_bytes: usize) -> u8 {
        self.reduction_with(budget_bytes, Logic::default())
    }

    /// Lower the order one step at a time until `range_count × 16` fits in
    /// `budget_bytes` or the order reaches `min_order`.
    pub fn reduction_with(&mut self, budget_bytes: usize, logic: Logic) -> u8 {
        let start = self.moc_order;
        let mut order = self.moc_order;
        while order > self.min_order && self.ranges.len() * BYTES_PER_RANGE > budget_bytes {
            order -= 1;
            self.ranges = self.ranges.degrade(self.dim.shift(order), logic);
        }
        self.moc_order = order;
        if order != start {
            tracing::debug!(
                from = start,
                to = order,
                budget_bytes,
                ranges = self.ranges.len(),
                "reduced coverage map"
            );
        }
        order
    }

    // --- properties ------------------------------------------------------

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Set a free-form property. Keys the codec derives from the map itself
    /// (`MOCDIM`, `ORDERING`, ...) are refused.
    pub fn set_property(&mut self, key: &str, value: &str) -> Result<()> {
        fits::check_property(key, value)?;
        self.properties.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        self.properties.remove(key)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn property_map(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    // --- serialization ---------------------------------------------------

    pub fn to_ascii(&self) -> String {
        ascii::write_moc(self)
    }

    pub fn to_json(&self) -> Result<String> {
        json::write_moc(self)
    }

    pub fn to_fits(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        fits::encode_moc(self, options)
    }

    pub fn to_bytes(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        match options.format {
            Format::Fits => self.to_fits(options),
            Format::Ascii => Ok(self.to_ascii().into_bytes()),
            Format::Json => Ok(self.to_json()?.into_bytes()),
        }
    }

    /// Decode any supported format. Text without a dimension prefix is read
    /// as a space map.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match Format::detect(bytes) {
            Format::Fits => fits::decode(bytes)?.into_moc(),
            _ => io::as_text(bytes)?.parse(),
        }
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Serialize into a private buffer, then write it out in one call.
    pub fn write_to<W: Write>(&self, mut writer: W, options: &WriteOptions) -> Result<()> {
        let bytes = self.to_bytes(options)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    pub fn read_path(path: impl AsRef<Path>) -> Result<Self> {
        io::with_file_bytes(path, Self::from_bytes)
    }

    pub fn write_path(&self, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes(options)?;
        File::create(path)?.write_all(&bytes)?;
        tracing::debug!(
            path = %path.display(),
            format = %options.format,
            bytes = bytes.len(),
            "wrote coverage map"
        );
        Ok(())
    }
}

/// Maps compare by dimension, reference system and coverage. The resolution
/// and the properties are attributes of the serialization, not of the set.
impl PartialEq for Moc {
    fn eq(&self, other: &Self) -> bool {
        self.dim == other.dim && self.system == other.system && self.ranges == other.ranges
    }
}

impl Eq for Moc {}

impl fmt::Display for Moc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ascii())
    }
}

/// Parses ASCII or JSON. A leading `t` prefix selects a time map; anything
/// else is a space map.
impl FromStr for Moc {
    type Err = MocError;

    fn from_str(s: &str) -> Result<Self> {
        let first = s
            .trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .chars()
            .next();
        let dim = match first.and_then(Dimension::from_prefix) {
            Some(Dimension::Time) => Dimension::Time,
            _ => Dimension::Space,
        };
        Moc::parse(dim, s)
    }
}

/// Buffered insertion guard returned by [`Moc::batch`].
pub struct MocBatch<'a> {
    dim: Dimension,
    moc_order: &'a mut u8,
    batch: Batch<'a>,
}

impl MocBatch<'_> {
    pub fn add_cell(&mut self, order: u8, cell: u64) -> Result<()> {
        let iv = self.dim.to_flat(order, cell)?;
        *self.moc_order = (*self.moc_order).max(order);
        self.batch.push(iv);
        Ok(())
    }

    pub fn add_cells(&mut self, order: u8, first: u64, last: u64) -> Result<()> {
        let iv = self.dim.to_flat_range(order, first, last)?;
        *self.moc_order = (*self.moc_order).max(order);
        self.batch.push(iv);
        Ok(())
    }

    pub fn add_uniq(&mut self, uniq: u64) -> Result<()> {
        let cell = self.dim.uniq_decode(uniq)?;
        self.add_cell(cell.order, cell.index)
    }

    pub fn add_position(&mut self, order: u8, lon_deg: f64, lat_deg: f64) -> Result<()> {
        if self.dim != Dimension::Space {
            return Err(MocError::DimensionMismatch {
                expected: Dimension::Space,
                actual: self.dim,
            });
        }
        let cell = hpx::lonlat_to_cell(order, lon_deg, lat_deg)?;
        self.add_cell(order, cell)
    }

    /// Merge the pending cells now.
    pub fn finish(self) {}
}
