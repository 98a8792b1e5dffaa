use super::card::{read_header, Card, CardValue, BLOCK_SIZE};
use super::{check_property, is_reserved};
use crate::config::WriteOptions;
use crate::dim::Dimension;
use crate::error::{MocError, Result};
use crate::moc::Moc;
use crate::ranges::{Interval, RangeSet};
use crate::stmoc::{StMoc, StSegment};
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::BTreeMap;
use std::path::Path;

/// A decoded FITS MOC: the file says which kind it holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Moc(Moc),
    StMoc(StMoc),
}

impl Decoded {
    pub fn into_moc(self) -> Result<Moc> {
        match self {
            Decoded::Moc(moc) => Ok(moc),
            Decoded::StMoc(_) => Err(MocError::format(
                "file holds a space-time map, not a single-dimension map",
            )),
        }
    }

    pub fn to_bytes(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        match self {
            Decoded::Moc(moc) => moc.to_bytes(options),
            Decoded::StMoc(st) => st.to_bytes(options),
        }
    }

    pub fn write_path(&self, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
        match self {
            Decoded::Moc(moc) => moc.write_path(path, options),
            Decoded::StMoc(st) => st.write_path(path, options),
        }
    }

    pub fn into_stmoc(self) -> Result<StMoc> {
        match self {
            Decoded::StMoc(st) => Ok(st),
            Decoded::Moc(moc) => Err(MocError::format(format!(
                "file holds a {} map, not a space-time map",
                moc.dimension()
            ))),
        }
    }
}

struct Header {
    cards: Vec<Card>,
}

impl Header {
    fn get(&self, key: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.keyword == key)
    }

    fn int(&self, key: &str) -> Result<i64> {
        self.get(key)
            .and_then(Card::as_int)
            .ok_or_else(|| MocError::format(format!("missing or non-integer {key}")))
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Card::as_str).map(str::trim)
    }

    fn order(&self, key: &str, dim: Dimension) -> Result<Option<u8>> {
        let Some(card) = self.get(key) else {
            return Ok(None);
        };
        let value = card
            .as_int()
            .ok_or_else(|| MocError::format(format!("{key} is not an integer")))?;
        let order = u8::try_from(value)
            .map_err(|_| MocError::format(format!("{key} = {value} is not an order")))?;
        dim.check_order(order)?;
        Ok(Some(order))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Space,
    Time,
    SpaceTime,
}

/// Decode a complete FITS image.
pub fn decode(bytes: &[u8]) -> Result<Decoded> {
    if bytes.len() % BLOCK_SIZE != 0 {
        return Err(MocError::format(format!(
            "file size {} is not a multiple of {BLOCK_SIZE}",
            bytes.len()
        )));
    }

    let (primary, ext_start) = read_header(bytes, 0)?;
    let primary = Header { cards: primary };
    if primary.cards.first().map(|c| c.keyword.as_str()) != Some("SIMPLE")
        || primary.get("SIMPLE").and_then(Card::as_bool) != Some(true)
    {
        return Err(MocError::format("first card is not SIMPLE = T"));
    }
    if primary.int("NAXIS")? != 0 {
        return Err(MocError::format("primary HDU carries data"));
    }

    let (cards, data_start) = read_header(bytes, ext_start)?;
    let ext = Header { cards };
    if ext.text("XTENSION") != Some("BINTABLE") {
        return Err(MocError::format("extension is not a BINTABLE"));
    }
    if ext.int("NAXIS")? != 2 {
        return Err(MocError::format("BINTABLE must have NAXIS = 2"));
    }
    if ext.int("TFIELDS")? != 1 {
        return Err(MocError::format("MOC tables have exactly one column"));
    }
    let width = match ext.text("TFORM1") {
        Some("1J") | Some("J") => 4,
        Some("1K") | Some("K") => 8,
        other => {
            return Err(MocError::format(format!(
                "unsupported TFORM1 {:?}",
                other.unwrap_or("<missing>")
            )))
        }
    };
    if ext.int("NAXIS1")? != width as i64 {
        return Err(MocError::format(format!(
            "NAXIS1 does not match a {width}-byte column"
        )));
    }
    let rows = usize::try_from(ext.int("NAXIS2")?)
        .map_err(|_| MocError::format("negative NAXIS2"))?;

    let data_len = rows
        .checked_mul(width)
        .ok_or_else(|| MocError::format("NAXIS2 is too large"))?;
    let data_end = data_start
        .checked_add(data_len)
        .ok_or_else(|| MocError::format("NAXIS2 is too large"))?;
    let data = bytes
        .get(data_start..data_end)
        .ok_or_else(|| MocError::format(format!("table truncated: {rows} rows announced")))?;
    let values = read_column(data, width)?;

    let layout = match ext.text("MOCDIM") {
        None | Some("SPACE") => Layout::Space,
        Some("TIME") => Layout::Time,
        Some("TIME.SPACE") => Layout::SpaceTime,
        Some(other) => return Err(MocError::format(format!("unknown MOCDIM '{other}'"))),
    };
    let range = match ext.text("ORDERING") {
        None | Some("NUNIQ") => false,
        Some("RANGE") => true,
        Some(other) => return Err(MocError::format(format!("unknown ORDERING '{other}'"))),
    };

    let coordsys = ext
        .text("COORDSYS")
        .unwrap_or(Dimension::Space.default_system())
        .to_string();
    let timesys = ext
        .text("TIMESYS")
        .unwrap_or(Dimension::Time.default_system())
        .to_string();
    let properties = properties(&ext);

    tracing::debug!(?layout, range, rows, width, "decoding FITS MOC");

    match layout {
        Layout::Space | Layout::Time => {
            let dim = if layout == Layout::Space {
                Dimension::Space
            } else {
                Dimension::Time
            };
            let declared = match ext.order(dim.order_keyword(), dim)? {
                Some(order) => Some(order),
                None => ext.order("MOCORDER", dim)?,
            };
            let (ranges, deepest) = if range {
                let ranges = decode_ranges(dim, &values)?;
                let deepest = dim.finest_order(&ranges);
                (ranges, deepest)
            } else {
                decode_nuniq(dim, &values)?
            };
            let moc_order = declared.map_or(deepest, |d| d.max(deepest));
            let system = if dim == Dimension::Space { coordsys } else { timesys };
            Ok(Decoded::Moc(Moc::from_parts(
                dim, ranges, moc_order, system, properties,
            )))
        }
        Layout::SpaceTime => {
            if !range {
                return Err(MocError::format("space-time maps require ORDERING = 'RANGE'"));
            }
            let (segments, t_deepest, s_deepest) = decode_space_time(&values)?;
            let t_declared = ext.order("MOCORD_T", Dimension::Time)?;
            let s_declared = ext.order("MOCORD_S", Dimension::Space)?;
            Ok(Decoded::StMoc(StMoc::from_parts(
                segments,
                t_declared.map_or(t_deepest, |d| d.max(t_deepest)),
                s_declared.map_or(s_deepest, |d| d.max(s_deepest)),
                timesys,
                coordsys,
                properties,
            )))
        }
    }
}

fn read_column(mut data: &[u8], width: usize) -> Result<Vec<i64>> {
    let mut values = Vec::with_capacity(data.len() / width);
    while !data.is_empty() {
        let v = if width == 4 {
            i64::from(data.read_i32::<BigEndian>()?)
        } else {
            data.read_i64::<BigEndian>()?
        };
        values.push(v);
    }
    Ok(values)
}

/// Free-form keywords of the extension header, as strings.
fn properties(ext: &Header) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for card in &ext.cards {
        let Some(value) = &card.value else { continue };
        if card.keyword.is_empty() || is_reserved(&card.keyword) {
            continue;
        }
        let text = match value {
            CardValue::Str(s) => s.clone(),
            other => other.to_text(),
        };
        if check_property(&card.keyword, &text).is_ok() {
            out.insert(card.keyword.clone(), text);
        } else {
            tracing::debug!(keyword = %card.keyword, "skipping header card that is not a valid property");
        }
    }
    out
}

fn decode_nuniq(dim: Dimension, values: &[i64]) -> Result<(RangeSet, u8)> {
    let mut ranges = RangeSet::new();
    let mut deepest = 0u8;
    {
        let mut batch = ranges.batch();
        for &v in values {
            let uniq = u64::try_from(v)
                .map_err(|_| MocError::format(format!("negative UNIQ value {v}")))?;
            let cell = dim.uniq_decode(uniq)?;
            deepest = deepest.max(cell.order);
            batch.push(dim.to_flat(cell.order, cell.index)?);
        }
    }
    Ok((ranges, deepest))
}

fn flat_pair(domain_end: u64, start: i64, end: i64) -> Result<Interval> {
    match (u64::try_from(start), u64::try_from(end)) {
        (Ok(s), Ok(e)) if s < e && e <= domain_end => Ok(Interval::new(s, e)),
        _ => Err(MocError::format(format!(
            "range [{start}, {end}) is empty or outside [0, {domain_end})"
        ))),
    }
}

fn decode_ranges(dim: Dimension, values: &[i64]) -> Result<RangeSet> {
    if values.len() % 2 != 0 {
        return Err(MocError::format("RANGE column has an odd number of values"));
    }
    let mut ranges = RangeSet::new();
    {
        let mut batch = ranges.batch();
        for pair in values.chunks_exact(2) {
            batch.push(flat_pair(dim.domain_end(), pair[0], pair[1])?);
        }
    }
    Ok(ranges)
}

type SpaceTimeParts = (Vec<StSegment>, u8, u8);

/// Blocks of negative time pairs followed by non-negative space pairs.
fn decode_space_time(values: &[i64]) -> Result<SpaceTimeParts> {
    let time_end = Dimension::Time.domain_end();
    let space_end = Dimension::Space.domain_end();
    let mut blocks: Vec<(RangeSet, RangeSet)> = Vec::new();
    let mut time_bits = 0u64;
    let mut space_bits = 0u64;

    let mut i = 0;
    while i < values.len() {
        let mut time = Vec::new();
        while i < values.len() && values[i] < 0 {
            let end = values
                .get(i + 1)
                .filter(|v| **v < 0)
                .ok_or_else(|| MocError::format("time range is missing its end"))?;
            time.push(flat_pair(time_end, -1 - values[i], -1 - end)?);
            i += 2;
        }
        if time.is_empty() {
            return Err(MocError::format("space range without a time range"));
        }
        let mut space = Vec::new();
        while i < values.len() && values[i] >= 0 {
            let end = values
                .get(i + 1)
                .filter(|v| **v >= 0)
                .ok_or_else(|| MocError::format("space range is missing its end"))?;
            space.push(flat_pair(space_end, values[i], *end)?);
            i += 2;
        }
        if space.is_empty() {
            return Err(MocError::format("time range without a space range"));
        }
        time_bits |= time.iter().fold(0, |acc, iv| acc | iv.start | iv.end);
        space_bits |= space.iter().fold(0, |acc, iv| acc | iv.start | iv.end);
        blocks.push((RangeSet::from_intervals(time), RangeSet::from_intervals(space)));
    }
    let mut st = StMoc::new();
    st.union_blocks(blocks.iter().map(|(time, space)| (time, space)));

    Ok((
        st.into_segments(),
        Dimension::Time.finest_order_of_bits(time_bits),
        Dimension::Space.finest_order_of_bits(space_bits),
    ))
}
