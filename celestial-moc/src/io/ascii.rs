//! ASCII serialization: `3/1 3 10 4/16-18 22`.
//!
//! A token is `[s|t]<order>/`, `<value>` or `<value>-<value>`, and tokens are
//! separated by whitespace, `,` or `;`. The order stays in force until the
//! next `<order>/`, the dimension prefix until the next prefix. A bare
//! `<order>/` with no values after it declares the map's resolution.

use super::{raise, ParsedBlocks, ParsedCells};
use crate::dim::{Cell, Dimension};
use crate::error::{MocError, Result};
use crate::moc::Moc;
use crate::ranges::{Interval, RangeSet};
use crate::stmoc::StMoc;
use std::fmt::Write;

pub(crate) fn is_separator(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b',' || b == b';'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Item {
    Dim(Dimension),
    Order(u8),
    /// Inclusive cell run.
    Cells(u64, u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token {
    /// Byte offset of the token in the input.
    pub pos: usize,
    pub item: Item,
}

/// Split `text` into tokens. Fails on the first malformed token.
pub(crate) fn tokenize(text: &str) -> Result<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if is_separator(b) {
            i += 1;
            continue;
        }
        if let Some(dim) = Dimension::from_prefix(b as char) {
            tokens.push(Token {
                pos: i,
                item: Item::Dim(dim),
            });
            i += 1;
            continue;
        }
        if !b.is_ascii_digit() {
            let c = text[i..].chars().next().unwrap_or('?');
            return Err(MocError::parse(i, format!("unexpected character '{c}'")));
        }

        let pos = i;
        let (first, next) = number(bytes, i)?;
        i = next;
        let item = match bytes.get(i) {
            Some(b'/') => {
                if pos > 0 && bytes[pos - 1] == b'/' {
                    return Err(MocError::parse(pos, "expected a value after the order"));
                }
                i += 1;
                let order = u8::try_from(first)
                    .map_err(|_| MocError::parse(pos, format!("order {first} is too large")))?;
                Item::Order(order)
            }
            Some(b'-') => {
                if !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                    return Err(MocError::parse(i, "expected a value after '-'"));
                }
                let (last, next) = number(bytes, i + 1)?;
                i = next;
                if last < first {
                    return Err(MocError::parse(
                        pos,
                        format!("range {first}-{last} is reversed"),
                    ));
                }
                Item::Cells(first, last)
            }
            _ => Item::Cells(first, first),
        };
        if let Item::Cells(..) = item {
            if let Some(&b) = bytes.get(i) {
                if !is_separator(b) && Dimension::from_prefix(b as char).is_none() {
                    return Err(MocError::parse(i, "expected a separator after a value"));
                }
            }
        }
        tokens.push(Token { pos, item });
    }
    Ok(tokens)
}

fn number(bytes: &[u8], start: usize) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    let mut i = start;
    while let Some(&b) = bytes.get(i) {
        if !b.is_ascii_digit() {
            break;
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or_else(|| MocError::parse(start, "value does not fit in 64 bits"))?;
        i += 1;
    }
    Ok((value, i))
}

/// Flat interval of the inclusive run `first..=last` at `order`. A run that
/// starts inside the domain but ends past it is clipped with a warning.
pub(crate) fn resolve_cells(
    dim: Dimension,
    order: u8,
    first: u64,
    last: u64,
) -> Result<Interval> {
    dim.check_order(order)?;
    let ncells = dim.cells_at_order(order);
    if first >= ncells {
        return Err(MocError::OutOfRange {
            order,
            value: first,
            max: ncells - 1,
        });
    }
    let last = if last >= ncells {
        tracing::warn!(
            dimension = %dim,
            order,
            first,
            last,
            "cell range runs past the domain; clipped to {}",
            ncells - 1
        );
        ncells - 1
    } else {
        last
    };
    dim.to_flat_range(order, first, last)
}

/// Parse a single-dimension map. A dimension prefix other than `dim` is a
/// [`MocError::DimensionMismatch`].
pub(crate) fn parse_cells(dim: Dimension, text: &str) -> Result<ParsedCells> {
    let mut parsed = ParsedCells::default();
    let mut order: Option<u8> = None;
    for token in tokenize(text)? {
        match token.item {
            Item::Dim(d) if d != dim => {
                return Err(MocError::DimensionMismatch {
                    expected: dim,
                    actual: d,
                })
            }
            Item::Dim(_) => {}
            Item::Order(o) => {
                dim.check_order(o)?;
                order = Some(o);
                raise(&mut parsed.deepest, o);
            }
            Item::Cells(first, last) => {
                let o = order
                    .ok_or_else(|| MocError::parse(token.pos, "cell value before any order"))?;
                parsed.ranges.push(resolve_cells(dim, o, first, last)?);
            }
        }
    }
    Ok(parsed)
}

/// Parse a space-time map: each run of time tokens followed by space tokens
/// is one (time × space) block.
pub(crate) fn parse_blocks(text: &str) -> Result<ParsedBlocks> {
    let mut parsed = ParsedBlocks::default();
    let mut dim = Dimension::Time;
    let mut t_order: Option<u8> = None;
    let mut s_order: Option<u8> = None;
    let mut time: Vec<Interval> = Vec::new();
    let mut space: Vec<Interval> = Vec::new();

    for token in tokenize(text)? {
        match token.item {
            Item::Dim(d) => {
                if d == Dimension::Time && !space.is_empty() {
                    commit(&mut parsed, &mut time, &mut space);
                }
                dim = d;
            }
            Item::Order(o) => {
                dim.check_order(o)?;
                match dim {
                    Dimension::Time => {
                        t_order = Some(o);
                        raise(&mut parsed.time_deepest, o);
                    }
                    Dimension::Space => {
                        s_order = Some(o);
                        raise(&mut parsed.space_deepest, o);
                    }
                }
            }
            Item::Cells(first, last) => {
                let slot = match dim {
                    Dimension::Time => t_order,
                    Dimension::Space => s_order,
                };
                let o = slot
                    .ok_or_else(|| MocError::parse(token.pos, "cell value before any order"))?;
                let iv = resolve_cells(dim, o, first, last)?;
                match dim {
                    Dimension::Time => time.push(iv),
                    Dimension::Space if time.is_empty() => {
                        return Err(MocError::parse(
                            token.pos,
                            "space cells must follow the time cells they belong to",
                        ))
                    }
                    Dimension::Space => space.push(iv),
                }
            }
        }
    }

    match (time.is_empty(), space.is_empty()) {
        (true, _) => {}
        (false, true) => {
            return Err(MocError::parse(
                text.len(),
                "time cells at the end have no space cells",
            ))
        }
        (false, false) => commit(&mut parsed, &mut time, &mut space),
    }
    Ok(parsed)
}

fn commit(parsed: &mut ParsedBlocks, time: &mut Vec<Interval>, space: &mut Vec<Interval>) {
    parsed.blocks.push((
        RangeSet::from_intervals(time.drain(..)),
        RangeSet::from_intervals(space.drain(..)),
    ));
}

/// Append cells grouped by order with `a-b` runs: `3/1 3 10 4/16-18 22`.
pub(crate) fn write_cells(out: &mut String, cells: &[Cell]) {
    let mut i = 0;
    while i < cells.len() {
        let order = cells[i].order;
        separate(out);
        let _ = write!(out, "{order}/");
        let mut first_run = true;
        while i < cells.len() && cells[i].order == order {
            let start = cells[i].index;
            let mut end = start;
            while i + 1 < cells.len() && cells[i + 1].order == order && cells[i + 1].index == end + 1 {
                i += 1;
                end += 1;
            }
            if !first_run {
                out.push(' ');
            }
            first_run = false;
            if start == end {
                let _ = write!(out, "{start}");
            } else {
                let _ = write!(out, "{start}-{end}");
            }
            i += 1;
        }
    }
}

fn write_trailing_order(out: &mut String, cells: &[Cell], moc_order: u8) {
    let deepest = cells.iter().map(|c| c.order).max();
    if deepest.is_none_or(|d| moc_order > d) {
        separate(out);
        let _ = write!(out, "{moc_order}/");
    }
}

/// Space before the next order, unless `out` ends with a dimension prefix.
fn separate(out: &mut String) {
    if out.ends_with(|c: char| c.is_ascii_digit() || c == '/') {
        out.push(' ');
    }
}

/// Time maps carry a leading `t` so the dimension survives the round trip.
pub(crate) fn write_moc(moc: &Moc) -> String {
    let cells = moc.cells();
    let mut out = String::new();
    if moc.dimension() == Dimension::Time {
        out.push('t');
    }
    write_cells(&mut out, &cells);
    write_trailing_order(&mut out, &cells, moc.moc_order());
    out
}

pub(crate) fn write_stmoc(st: &StMoc) -> String {
    let mut out = String::new();
    let mut t_deepest: Option<u8> = None;
    let mut s_deepest: Option<u8> = None;
    for segment in st.segments() {
        let time_cells = Dimension::Time.cells(&RangeSet::from_intervals([segment.time]), 0);
        let space_cells = Dimension::Space.cells(&segment.space, 0);
        t_deepest = t_deepest.max(time_cells.iter().map(|c| c.order).max());
        s_deepest = s_deepest.max(space_cells.iter().map(|c| c.order).max());

        if !out.is_empty() {
            out.push(' ');
        }
        out.push('t');
        write_cells(&mut out, &time_cells);
        out.push_str(" s");
        write_cells(&mut out, &space_cells);
    }

    let time_extra = t_deepest.is_none_or(|d| st.time_order() > d);
    let space_extra = s_deepest.is_none_or(|d| st.space_order() > d);
    if time_extra || space_extra {
        if !out.is_empty() {
            out.push(' ');
        }
        let _ = write!(out, "t{}/ s{}/", st.time_order(), st.space_order());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(text: &str) -> Vec<Item> {
        tokenize(text).unwrap().into_iter().map(|t| t.item).collect()
    }

    #[test]
    fn tokenizes_orders_values_and_runs() {
        assert_eq!(
            items("3/1,3-4;9\n4/"),
            vec![
                Item::Order(3),
                Item::Cells(1, 1),
                Item::Cells(3, 4),
                Item::Cells(9, 9),
                Item::Order(4)
            ]
        );
    }

    #[test]
    fn tokenizes_prefixes() {
        assert_eq!(
            items("t1/0 s0/2-11"),
            vec![
                Item::Dim(Dimension::Time),
                Item::Order(1),
                Item::Cells(0, 0),
                Item::Dim(Dimension::Space),
                Item::Order(0),
                Item::Cells(2, 11)
            ]
        );
    }

    #[test]
    fn rejects_malformed_tokens() {
        for bad in ["3/1 x", "3/5-2", "3/1-", "3/1/", "3/12a", "300/1", "3/99999999999999999999"] {
            assert!(
                matches!(tokenize(bad), Err(MocError::Parse { .. })),
                "{bad} should not tokenize"
            );
        }
    }

    #[test]
    fn error_positions_point_at_the_token() {
        match tokenize("3/1 2 x") {
            Err(MocError::Parse { position, .. }) => assert_eq!(position, 6),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn value_without_order_fails() {
        assert!(matches!(
            parse_cells(Dimension::Space, "12 3/1"),
            Err(MocError::Parse { position: 0, .. })
        ));
    }

    #[test]
    fn wrong_prefix_fails() {
        assert!(matches!(
            parse_cells(Dimension::Space, "t3/1"),
            Err(MocError::DimensionMismatch { .. })
        ));
        assert!(parse_cells(Dimension::Space, "s3/1").is_ok());
    }

    #[test]
    fn range_end_past_domain_is_clipped() {
        let parsed = parse_cells(Dimension::Space, "0/10-15").unwrap();
        let expected = Dimension::Space.to_flat_range(0, 10, 11).unwrap();
        assert_eq!(parsed.ranges, vec![expected]);
    }

    #[test]
    fn range_start_past_domain_fails() {
        assert!(matches!(
            parse_cells(Dimension::Space, "0/12-15"),
            Err(MocError::OutOfRange { order: 0, value: 12, .. })
        ));
        assert!(matches!(
            parse_cells(Dimension::Space, "30/1"),
            Err(MocError::InvalidOrder { .. })
        ));
    }

    #[test]
    fn write_groups_runs() {
        let cells = [
            Cell::new(3, 1),
            Cell::new(3, 3),
            Cell::new(3, 10),
            Cell::new(4, 16),
            Cell::new(4, 17),
            Cell::new(4, 18),
            Cell::new(4, 22),
        ];
        let mut out = String::new();
        write_cells(&mut out, &cells);
        assert_eq!(out, "3/1 3 10 4/16-18 22");
    }

    #[test]
    fn blocks_split_on_time_prefix() {
        let parsed = parse_blocks("t1/0 2/3 s0/2-11 1/1-3 t3/7 s2/0").unwrap();
        assert_eq!(parsed.blocks.len(), 2);
        assert_eq!(parsed.time_deepest, Some(3));
        assert_eq!(parsed.space_deepest, Some(2));
    }

    #[test]
    fn blocks_need_space_after_time() {
        assert!(parse_blocks("t1/0 s0/1 t1/1").is_err());
        assert!(parse_blocks("s0/1 t1/1").is_err());
        assert!(parse_blocks("t1/0 s0/1 t2/ s5/").is_ok());
        assert!(parse_blocks("").unwrap().blocks.is_empty());
    }
}
