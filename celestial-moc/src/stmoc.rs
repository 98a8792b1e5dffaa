//! Space-time coverage maps.
//!
//! An [`StMoc`] is a list of [`StSegment`]s: a time interval paired with
//! the sky coverage valid during that interval. Segments are kept sorted
//! and disjoint in time, never carry an empty sky, and two segments that
//! touch in time never carry the same sky (they are merged).
//!
//! Binary operations cut both time axes at the union of their boundaries
//! and combine the paired sky coverages slice by slice.

use crate::config::WriteOptions;
use crate::dim::Dimension;
use crate::error::{MocError, Result};
use crate::io::{self, ascii, fits, json, Format, ParsedBlocks};
use crate::moc::Moc;
use crate::ranges::{Interval, Logic, RangeSet};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

/// A time interval and the sky covered during it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StSegment {
    pub time: Interval,
    pub space: RangeSet,
}

#[derive(Debug, Clone)]
pub struct StMoc {
    segments: Vec<StSegment>,
    time_order: u8,
    space_order: u8,
    time_system: String,
    space_system: String,
    properties: BTreeMap<String, String>,
}

impl Default for StMoc {
    fn default() -> Self {
        Self::new()
    }
}

impl StMoc {
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
            time_order: 0,
            space_order: 0,
            time_system: Dimension::Time.default_system().to_string(),
            space_system: Dimension::Space.default_system().to_string(),
            properties: BTreeMap::new(),
        }
    }

    /// Parse an ASCII (`t1/0 s3/1-4`) or JSON space-time map.
    pub fn parse(text: &str) -> Result<Self> {
        let mut st = Self::new();
        st.add(text)?;
        Ok(st)
    }

    pub(crate) fn from_parts(
        segments: Vec<StSegment>,
        time_order: u8,
        space_order: u8,
        time_system: String,
        space_system: String,
        properties: BTreeMap<String, String>,
    ) -> Self {
        Self {
            segments,
            time_order,
            space_order,
            time_system,
            space_system,
            properties,
        }
    }

    pub fn segments(&self) -> &[StSegment] {
        &self.segments
    }

    pub(crate) fn into_segments(self) -> Vec<StSegment> {
        self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn time_order(&self) -> u8 {
        self.time_order
    }

    pub fn space_order(&self) -> u8 {
        self.space_order
    }

    pub fn time_system(&self) -> &str {
        &self.time_system
    }

    pub fn space_system(&self) -> &str {
        &self.space_system
    }

    pub fn set_time_system(&mut self, system: &str) -> Result<()> {
        fits::check_value(Dimension::Time.system_keyword(), system)?;
        self.time_system = system.to_string();
        Ok(())
    }

    pub fn set_space_system(&mut self, system: &str) -> Result<()> {
        fits::check_value(Dimension::Space.system_keyword(), system)?;
        self.space_system = system.to_string();
        Ok(())
    }

    // --- insertion -------------------------------------------------------

    /// Add every block of an ASCII or JSON string. Nothing is added unless
    /// the whole string parses.
    pub fn add(&mut self, text: &str) -> Result<()> {
        let parsed = match Format::detect(text.as_bytes()) {
            Format::Json => json::parse_blocks(text)?,
            _ => ascii::parse_blocks(text)?,
        };
        self.apply(parsed);
        Ok(())
    }

    fn apply(&mut self, parsed: ParsedBlocks) {
        if let Some(order) = parsed.time_deepest {
            self.time_order = self.time_order.max(order);
        }
        if let Some(order) = parsed.space_deepest {
            self.space_order = self.space_order.max(order);
        }
        self.union_blocks(parsed.blocks.iter().map(|(time, space)| (time, space)));
    }

    /// Union any number of (time × space) blocks into the map in one sweep.
    pub(crate) fn union_blocks<'a>(
        &mut self,
        blocks: impl IntoIterator<Item = (&'a RangeSet, &'a RangeSet)>,
    ) {
        let mut pieces = std::mem::take(&mut self.segments);
        for (time, space) in blocks {
            if space.is_empty() {
                continue;
            }
            pieces.extend(time.iter().map(|&t| StSegment {
                time: t,
                space: space.clone(),
            }));
        }
        self.segments = union_pieces(pieces);
    }

    fn union_block(&mut self, time: &RangeSet, space: &RangeSet) {
        self.union_blocks([(time, space)]);
    }

    /// Add one (time cell × space cell) block.
    pub fn add_cell(&mut self, t_order: u8, t_cell: u64, s_order: u8, s_cell: u64) -> Result<()> {
        let time = Dimension::Time.to_flat(t_order, t_cell)?;
        let space = Dimension::Space.to_flat(s_order, s_cell)?;
        self.time_order = self.time_order.max(t_order);
        self.space_order = self.space_order.max(s_order);
        self.union_block(
            &RangeSet::from_intervals([time]),
            &RangeSet::from_intervals([space]),
        );
        Ok(())
    }

    /// Add the product of a time map and a space map.
    pub fn add_block(&mut self, time: &Moc, space: &Moc) -> Result<()> {
        expect(time, Dimension::Time)?;
        expect(space, Dimension::Space)?;
        self.time_order = self.time_order.max(time.moc_order());
        self.space_order = self.space_order.max(space.moc_order());
        self.union_block(time.ranges(), space.ranges());
        Ok(())
    }

    // --- queries ---------------------------------------------------------

    /// Segment covering the flat time index `t`.
    fn segment_at(&self, t: u64) -> Option<&StSegment> {
        let i = self.segments.partition_point(|s| s.time.end <= t);
        self.segments.get(i).filter(|s| s.time.start <= t)
    }

    /// Membership of one (time, space) point at the finest orders.
    pub fn contains(&self, time_value: u64, space_value: u64) -> bool {
        self.segment_at(time_value)
            .is_some_and(|s| s.space.contains(space_value))
    }

    /// `true` if the whole (time cell × space cell) block is covered.
    pub fn contains_cell(&self, t_order: u8, t_cell: u64, s_order: u8, s_cell: u64) -> Result<bool> {
        let time = Dimension::Time.to_flat(t_order, t_cell)?;
        let space = Dimension::Space.to_flat(s_order, s_cell)?;
        let mut cursor = time.start;
        let first = self.segments.partition_point(|s| s.time.end <= time.start);
        for segment in &self.segments[first..] {
            if cursor >= time.end {
                break;
            }
            if segment.time.start > cursor || !segment.space.contains_interval(space) {
                return Ok(false);
            }
            cursor = segment.time.end;
        }
        Ok(cursor >= time.end)
    }

    /// Time coverage, whatever the sky.
    pub fn time_moc(&self) -> Moc {
        let ranges = RangeSet::from_intervals(self.segments.iter().map(|s| s.time));
        Moc::from_parts(
            Dimension::Time,
            ranges,
            self.time_order,
            self.time_system.clone(),
            BTreeMap::new(),
        )
    }

    /// Sky coverage, whatever the time.
    pub fn space_moc(&self) -> Moc {
        let mut ranges = RangeSet::new();
        for segment in &self.segments {
            ranges = ranges.union(&segment.space);
        }
        Moc::from_parts(
            Dimension::Space,
            ranges,
            self.space_order,
            self.space_system.clone(),
            BTreeMap::new(),
        )
    }

    /// Times at which some part of `space` is covered.
    pub fn time_moc_for(&self, space: &Moc) -> Result<Moc> {
        expect(space, Dimension::Space)?;
        self.check_system(space.system(), &self.space_system)?;
        let ranges = RangeSet::from_intervals(
            self.segments
                .iter()
                .filter(|s| s.space.intersects(space.ranges()))
                .map(|s| s.time),
        );
        Ok(Moc::from_parts(
            Dimension::Time,
            ranges,
            self.time_order,
            self.time_system.clone(),
            BTreeMap::new(),
        ))
    }

    /// Sky covered at some point of `time`.
    pub fn space_moc_for(&self, time: &Moc) -> Result<Moc> {
        expect(time, Dimension::Time)?;
        self.check_system(time.system(), &self.time_system)?;
        let mut ranges = RangeSet::new();
        for segment in &self.segments {
            if time.ranges().intersects_interval(segment.time) {
                ranges = ranges.union(&segment.space);
            }
        }
        Ok(Moc::from_parts(
            Dimension::Space,
            ranges,
            self.space_order,
            self.space_system.clone(),
            BTreeMap::new(),
        ))
    }

    // --- algebra ---------------------------------------------------------

    fn check_system(&self, theirs: &str, ours: &str) -> Result<()> {
        if theirs != ours {
            return Err(MocError::IncompatibleSystem {
                left: ours.to_string(),
                right: theirs.to_string(),
            });
        }
        Ok(())
    }

    fn combine_with(
        &self,
        other: &StMoc,
        logic: Logic,
        f: fn(Option<&RangeSet>, Option<&RangeSet>) -> Option<RangeSet>,
    ) -> Result<StMoc> {
        self.check_system(&other.time_system, &self.time_system)?;
        self.check_system(&other.space_system, &self.space_system)?;
        let pick = |a: u8, b: u8| match logic {
            Logic::Max => a.max(b),
            Logic::Min => a.min(b),
        };
        let t_order = pick(self.time_order, other.time_order);
        let s_order = pick(self.space_order, other.space_order);
        let left = self.degraded(t_order, s_order, logic);
        let right = other.degraded(t_order, s_order, logic);
        Ok(StMoc {
            segments: combine(&left.segments, &right.segments, f),
            time_order: t_order,
            space_order: s_order,
            time_system: self.time_system.clone(),
            space_system: self.space_system.clone(),
            properties: self.properties.clone(),
        })
    }

    pub fn union(&self, other: &StMoc) -> Result<StMoc> {
        self.union_with(other, Logic::default())
    }

    pub fn union_with(&self, other: &StMoc, logic: Logic) -> Result<StMoc> {
        self.combine_with(other, logic, union_slice)
    }

    pub fn intersection(&self, other: &StMoc) -> Result<StMoc> {
        self.intersection_with(other, Logic::default())
    }

    pub fn intersection_with(&self, other: &StMoc, logic: Logic) -> Result<StMoc> {
        self.combine_with(other, logic, |a, b| Some(a?.intersection(b?)))
    }

    /// `self` minus `other`.
    pub fn subtraction(&self, other: &StMoc) -> Result<StMoc> {
        self.subtraction_with(other, Logic::default())
    }

    pub fn subtraction_with(&self, other: &StMoc, logic: Logic) -> Result<StMoc> {
        self.combine_with(other, logic, |a, b| match (a, b) {
            (Some(a), Some(b)) => Some(a.subtraction(b)),
            (Some(a), None) => Some(a.clone()),
            _ => None,
        })
    }

    /// Symmetric difference.
    pub fn difference(&self, other: &StMoc) -> Result<StMoc> {
        self.difference_with(other, Logic::default())
    }

    pub fn difference_with(&self, other: &StMoc, logic: Logic) -> Result<StMoc> {
        self.combine_with(other, logic, |a, b| match (a, b) {
            (Some(a), Some(b)) => Some(a.difference(b)),
            (Some(x), None) | (None, Some(x)) => Some(x.clone()),
            (None, None) => None,
        })
    }

    /// Uncovered time gets the whole sky; covered time gets the complement
    /// of its sky.
    pub fn complement(&self) -> StMoc {
        let full = [StSegment {
            time: Interval::new(0, Dimension::Time.domain_end()),
            space: RangeSet::full(Dimension::Space.domain_end()),
        }];
        StMoc {
            segments: combine(&full, &self.segments, |a, b| match (a, b) {
                (Some(a), Some(b)) => Some(a.subtraction(b)),
                (Some(a), None) => Some(a.clone()),
                _ => None,
            }),
            ..self.clone()
        }
    }

    // --- resolution ------------------------------------------------------

    fn degraded(&self, t_order: u8, s_order: u8, logic: Logic) -> StMoc {
        let mut out = self.clone();
        if s_order < out.space_order {
            out.degrade_space(s_order, logic);
        }
        if t_order < out.time_order {
            out.degrade_time(t_order, logic);
        }
        out
    }

    fn degrade_space(&mut self, order: u8, logic: Logic) {
        let shift = Dimension::Space.shift(order);
        let mut out: Vec<StSegment> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            let space = segment.space.degrade(shift, logic);
            if !space.is_empty() {
                push_segment(&mut out, segment.time, space);
            }
        }
        self.segments = out;
        self.space_order = order;
    }

    fn degrade_time(&mut self, order: u8, logic: Logic) {
        let shift = Dimension::Time.shift(order);
        self.segments = match logic {
            Logic::Max => {
                let mask = (1u64 << shift) - 1;
                let pieces = self
                    .segments
                    .drain(..)
                    .map(|s| StSegment {
                        time: Interval::new(s.time.start & !mask, (s.time.end + mask) & !mask),
                        space: s.space,
                    })
                    .collect();
                union_pieces(pieces)
            }
            Logic::Min => shrink_time(&self.segments, shift),
        };
        self.time_order = order;
    }

    /// Change the time resolution, degrading with [`Logic::Max`].
    pub fn set_time_order(&mut self, order: u8) -> Result<()> {
        self.set_time_order_with(order, Logic::default())
    }

    pub fn set_time_order_with(&mut self, order: u8, logic: Logic) -> Result<()> {
        Dimension::Time.check_order(order)?;
        if order < self.time_order {
            self.degrade_time(order, logic);
            tracing::debug!(order, ?logic, segments = self.segments.len(), "degraded time axis");
        }
        self.time_order = order;
        Ok(())
    }

    /// Change the sky resolution, degrading with [`Logic::Max`].
    pub fn set_space_order(&mut self, order: u8) -> Result<()> {
        self.set_space_order_with(order, Logic::default())
    }

    pub fn set_space_order_with(&mut self, order: u8, logic: Logic) -> Result<()> {
        Dimension::Space.check_order(order)?;
        if order < self.space_order {
            self.degrade_space(order, logic);
            tracing::debug!(order, ?logic, segments = self.segments.len(), "degraded space axis");
        }
        self.space_order = order;
        Ok(())
    }

    // --- properties ------------------------------------------------------

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

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
        ascii::write_stmoc(self)
    }

    pub fn to_json(&self) -> Result<String> {
        json::write_stmoc(self)
    }

    /// FITS image. Space-time tables are always 64-bit `RANGE` columns, so
    /// only `options.format` matters here.
    pub fn to_bytes(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        match options.format {
            Format::Fits => fits::encode_stmoc(self),
            Format::Ascii => Ok(self.to_ascii().into_bytes()),
            Format::Json => Ok(self.to_json()?.into_bytes()),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match Format::detect(bytes) {
            Format::Fits => fits::decode(bytes)?.into_stmoc(),
            _ => Self::parse(io::as_text(bytes)?),
        }
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    pub fn write_to<W: Write>(&self, mut writer: W, options: &WriteOptions) -> Result<()> {
        let bytes = self.to_bytes(options)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    pub fn read_path(path: impl AsRef<Path>) -> Result<Self> {
        io::with_file_bytes(path, Self::from_bytes)
    }

    pub fn write_path(&self, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
        let bytes = self.to_bytes(options)?;
        File::create(path.as_ref())?.write_all(&bytes)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            format = %options.format,
            bytes = bytes.len(),
            "wrote space-time map"
        );
        Ok(())
    }
}

impl PartialEq for StMoc {
    fn eq(&self, other: &Self) -> bool {
        self.time_system == other.time_system
            && self.space_system == other.space_system
            && self.segments == other.segments
    }
}

impl Eq for StMoc {}

impl fmt::Display for StMoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ascii())
    }
}

impl FromStr for StMoc {
    type Err = MocError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn expect(moc: &Moc, dim: Dimension) -> Result<()> {
    if moc.dimension() != dim {
        return Err(MocError::DimensionMismatch {
            expected: dim,
            actual: moc.dimension(),
        });
    }
    Ok(())
}

fn union_slice(a: Option<&RangeSet>, b: Option<&RangeSet>) -> Option<RangeSet> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.union(b)),
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (None, None) => None,
    }
}

/// Append a segment, extending the last one when it touches in time and
/// carries the same sky.
pub(crate) fn push_segment(out: &mut Vec<StSegment>, time: Interval, space: RangeSet) {
    if let Some(last) = out.last_mut() {
        if last.time.end == time.start && last.space == space {
            last.time.end = time.end;
            return;
        }
    }
    out.push(StSegment { time, space });
}

/// Union of possibly overlapping segments: cut the time axis at every
/// boundary and union the skies of the pieces alive in each slice.
fn union_pieces(mut pieces: Vec<StSegment>) -> Vec<StSegment> {
    pieces.sort_unstable_by_key(|p| p.time.start);
    let mut cuts: Vec<u64> = pieces
        .iter()
        .flat_map(|p| [p.time.start, p.time.end])
        .collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut next = 0;
    let mut alive: Vec<usize> = Vec::new();
    let mut out = Vec::new();
    for w in cuts.windows(2) {
        let slice = Interval::new(w[0], w[1]);
        alive.retain(|&i| pieces[i].time.end > slice.start);
        while next < pieces.len() && pieces[next].time.start <= slice.start {
            if pieces[next].time.end > slice.start {
                alive.push(next);
            }
            next += 1;
        }
        let Some((&first, rest)) = alive.split_first() else {
            continue;
        };
        let space = rest
            .iter()
            .fold(pieces[first].space.clone(), |acc, &i| acc.union(&pieces[i].space));
        if !space.is_empty() {
            push_segment(&mut out, slice, space);
        }
    }
    out
}

/// Coarse time cells of `2^shift` flat units. A cell is kept only when the
/// segments tile it without gaps, and then carries the sky common to all of
/// them.
fn shrink_time(segments: &[StSegment], shift: u32) -> Vec<StSegment> {
    struct Partial {
        cell: u64,
        until: u64,
        space: RangeSet,
    }

    let size = 1u64 << shift;
    let mut partial: Option<Partial> = None;
    let mut out = Vec::new();
    for segment in segments {
        let mut t = segment.time.start;
        while t < segment.time.end {
            let cell = t >> shift;
            let cell_start = cell << shift;
            let cell_end = cell_start + size;
            if t == cell_start && segment.time.end >= cell_end {
                let whole_end = segment.time.end >> shift << shift;
                push_segment(&mut out, Interval::new(cell_start, whole_end), segment.space.clone());
                partial = None;
                t = whole_end;
                continue;
            }

            let upto = segment.time.end.min(cell_end);
            partial = match partial.take() {
                Some(p) if p.cell == cell && p.until == t => Some(Partial {
                    cell,
                    until: upto,
                    space: p.space.intersection(&segment.space),
                }),
                _ if t == cell_start => Some(Partial {
                    cell,
                    until: upto,
                    space: segment.space.clone(),
                }),
                _ => None,
            };
            if let Some(p) = partial.take_if(|p| p.until == cell_end) {
                if !p.space.is_empty() {
                    push_segment(&mut out, Interval::new(cell_start, cell_end), p.space);
                }
            }
            t = upto;
        }
    }
    out
}

/// Slice both time axes at every boundary and combine the skies of each
/// slice with `f`. Slices whose result is `None` or empty are dropped.
fn combine(
    a: &[StSegment],
    b: &[StSegment],
    f: impl Fn(Option<&RangeSet>, Option<&RangeSet>) -> Option<RangeSet>,
) -> Vec<StSegment> {
    let mut cuts: Vec<u64> = a
        .iter()
        .chain(b)
        .flat_map(|s| [s.time.start, s.time.end])
        .collect();
    cuts.sort_unstable();
    cuts.dedup();

    let (mut i, mut j) = (0, 0);
    let mut out = Vec::new();
    for w in cuts.windows(2) {
        let slice = Interval::new(w[0], w[1]);
        while i < a.len() && a[i].time.end <= slice.start {
            i += 1;
        }
        while j < b.len() && b[j].time.end <= slice.start {
            j += 1;
        }
        let sa = a
            .get(i)
            .filter(|s| s.time.start <= slice.start)
            .map(|s| &s.space);
        let sb = b
            .get(j)
            .filter(|s| s.time.start <= slice.start)
            .map(|s| &s.space);
        if let Some(space) = f(sa, sb) {
            if !space.is_empty() {
                push_segment(&mut out, slice, space);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn st(text: &str) -> StMoc {
        StMoc::parse(text).unwrap()
    }

    #[test]
    fn parse_builds_segments() {
        let m = st("t2/0 s1/3 t2/1 s1/3");
        assert_eq!(m.segment_count(), 1);
        assert_eq!(m.segments()[0].time, Dimension::Time.to_flat(1, 0).unwrap());
        assert_eq!(m.time_order(), 2);
        assert_eq!(m.space_order(), 1);
    }

    #[test]
    fn overlapping_blocks_are_split() {
        let m = st("t1/0 s0/0 t2/1 s0/1");
        assert_eq!(m.segment_count(), 2);
        assert_eq!(
            m.segments()[1].space,
            RangeSet::from_intervals([Dimension::Space.to_flat_range(0, 0, 1).unwrap()])
        );
    }

    #[test]
    fn trailing_time_is_rejected() {
        let mut m = st("t1/0 s0/0");
        assert!(m.add("t1/1 s0/1 t2/3").is_err());
        assert_eq!(m, st("t1/0 s0/0"));
    }

    #[test]
    fn union_is_commutative() {
        let a = st("t1/0 s0/0-3 t3/6 s1/40");
        let b = st("t2/1 s0/2-5 t2/3 s0/11");
        assert_eq!(a.union(&b).unwrap(), b.union(&a).unwrap());
        assert_eq!(a.intersection(&b).unwrap(), b.intersection(&a).unwrap());
    }

    #[test]
    fn intersection_and_subtraction() {
        let a = st("t1/0 s0/0-3");
        let b = st("t2/1 s0/2-5");
        assert_eq!(a.intersection(&b).unwrap(), st("t2/1 s0/2-3"));
        assert_eq!(a.subtraction(&b).unwrap(), st("t2/0 s0/0-3 t2/1 s0/0-1"));
        assert_eq!(
            a.difference(&b).unwrap(),
            st("t2/0 s0/0-3 t2/1 s0/0-1 4-5")
        );
    }

    #[test]
    fn complement_twice_is_identity() {
        let a = st("t1/0 2/3 s0/2-11 1/1-3");
        assert_eq!(a.complement().complement(), a);
        assert!(StMoc::new().complement().complement().is_empty());
    }

    #[test]
    fn projections() {
        let m = st("t2/0 s0/1 t2/2 s0/5");
        assert_eq!(m.time_moc(), Moc::parse(Dimension::Time, "2/0 2").unwrap());
        assert_eq!(m.space_moc(), Moc::parse(Dimension::Space, "0/1 5").unwrap());

        let region = Moc::parse(Dimension::Space, "1/20").unwrap();
        assert_eq!(
            m.time_moc_for(&region).unwrap(),
            Moc::parse(Dimension::Time, "2/2").unwrap()
        );
        let when = Moc::parse(Dimension::Time, "3/0").unwrap();
        assert_eq!(
            m.space_moc_for(&when).unwrap(),
            Moc::parse(Dimension::Space, "0/1").unwrap()
        );
        assert!(m.time_moc_for(&when).is_err());
    }

    #[test]
    fn contains_points_and_cells() {
        let m = st("t1/0 s0/3");
        let s = Dimension::Space.to_flat(0, 3).unwrap();
        assert!(m.contains(0, s.start));
        assert!(!m.contains(0, s.end));
        assert!(!m.contains(1 << 60, s.start));
        assert!(m.contains_cell(2, 1, 1, 13).unwrap());
        assert!(!m.contains_cell(0, 0, 1, 13).unwrap());
    }

    #[test]
    fn degrade_space_merges_segments() {
        let mut m = st("t2/0 s1/0 t2/1 s1/1");
        assert_eq!(m.segment_count(), 2);
        m.set_space_order(0).unwrap();
        assert_eq!(m, st("t1/0 s0/0"));
        assert_eq!(m.space_order(), 0);
    }

    #[test]
    fn degrade_time_folds_overlaps() {
        let mut m = st("t2/0 s0/0 t2/1 s0/1");
        m.set_time_order(1).unwrap();
        assert_eq!(m, st("t1/0 s0/0-1"));
        let mut strict = st("t2/0 s0/0 t2/1 s0/1");
        strict.set_time_order_with(0, Logic::Min).unwrap();
        assert!(strict.is_empty());
    }

    #[test]
    fn strict_time_degradation_keeps_common_sky() {
        let mut m = st("t2/0 s0/0 t2/1 s0/0-1");
        m.set_time_order_with(1, Logic::Min).unwrap();
        assert_eq!(m, st("t1/0 s0/0"));
        assert_eq!(m.time_order(), 1);

        let mut gap = st("t3/0 s0/0 t3/1 s0/0-1 t3/3 s0/0");
        gap.set_time_order_with(1, Logic::Min).unwrap();
        assert!(gap.is_empty());

        let mut wide = st("t1/0 s0/4 t3/4 s0/4-5 t3/5 s0/4 t3/6-7 s0/4 s0/6");
        wide.set_time_order_with(1, Logic::Min).unwrap();
        assert_eq!(wide, st("t0/0 s0/4"));
    }

    #[test]
    fn many_blocks_are_unioned_in_one_pass() {
        let text: String = (0..64).map(|i| format!("t6/{i} s0/{} ", i % 3)).collect();
        let m = st(&text);
        assert_eq!(m.segment_count(), 64);
        assert_eq!(m.space_moc(), Moc::parse(Dimension::Space, "0/0-2").unwrap());

        let mut blocks = StMoc::new();
        blocks.add("t1/0 s0/1 t2/1 s0/2 t2/0-1 s0/3").unwrap();
        assert_eq!(blocks, st("t2/0 s0/1 3 t2/1 s0/1-3"));
    }

    #[test]
    fn mismatched_systems_are_rejected() {
        let a = st("t1/0 s0/0");
        let mut b = st("t1/0 s0/0");
        b.set_time_system("TT").unwrap();
        assert!(matches!(
            a.union(&b),
            Err(MocError::IncompatibleSystem { .. })
        ));
    }
}
