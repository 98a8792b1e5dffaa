//! Rules for the ASCII and JSON serializations.

use super::cells::CellTracker;
use super::{Collector, Findings, Flow, MapKind, TooManyErrors};
use crate::config::MocVersion;
use crate::dim::Dimension;
use crate::ranges::{Interval, RangeSet};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Lexeme {
    Dim(Dimension),
    Order(u64),
    Cells(u64, u64),
}

struct Lexed {
    pos: usize,
    lexeme: Lexeme,
}

fn is_separator(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b',' || b == b';'
}

/// Split ASCII text into lexemes, reporting and skipping anything unreadable.
fn lex(text: &str, out: &mut Collector) -> Result<Vec<Lexed>, TooManyErrors> {
    let bytes = text.as_bytes();
    let mut lexed = Vec::new();
    let mut i = 0;

    let number = |i: &mut usize| -> Option<u64> {
        let start = *i;
        while *i < bytes.len() && bytes[*i].is_ascii_digit() {
            *i += 1;
        }
        text[start..*i].parse().ok()
    };

    while i < bytes.len() {
        let b = bytes[i];
        let pos = i;
        if is_separator(b) {
            i += 1;
            continue;
        }
        if let Some(dim) = Dimension::from_prefix(char::from(b)) {
            lexed.push(Lexed { pos, lexeme: Lexeme::Dim(dim) });
            i += 1;
            continue;
        }
        if !b.is_ascii_digit() {
            out.error(
                format_args!("byte {pos}"),
                format!("unexpected character {:?}", char::from(b)),
            )?;
            while i < bytes.len() && !is_separator(bytes[i]) {
                i += 1;
            }
            continue;
        }

        let Some(first) = number(&mut i) else {
            out.error(format_args!("byte {pos}"), "number does not fit 64 bits")?;
            continue;
        };
        let lexeme = match bytes.get(i) {
            Some(b'/') => {
                i += 1;
                Lexeme::Order(first)
            }
            Some(b'-') => {
                i += 1;
                if !bytes.get(i).is_some_and(u8::is_ascii_digit) {
                    out.error(format_args!("byte {pos}"), "range has no upper bound")?;
                    continue;
                }
                match number(&mut i) {
                    Some(last) => Lexeme::Cells(first, last),
                    None => {
                        out.error(format_args!("byte {pos}"), "number does not fit 64 bits")?;
                        continue;
                    }
                }
            }
            _ => Lexeme::Cells(first, first),
        };
        let boundary = bytes
            .get(i)
            .is_none_or(|&b| is_separator(b) || Dimension::from_prefix(char::from(b)).is_some());
        if !boundary && !matches!(lexeme, Lexeme::Order(_)) {
            out.error(
                format_args!("byte {i}"),
                format!("unexpected character {:?} after a value", char::from(bytes[i])),
            )?;
            while i < bytes.len() && !is_separator(bytes[i]) {
                i += 1;
            }
            continue;
        }
        lexed.push(Lexed { pos, lexeme });
    }
    Ok(lexed)
}

/// One time/space block of a space-time stream.
struct Block {
    time: RangeSet,
    space: RangeSet,
    tracker: CellTracker,
}

impl Block {
    fn new() -> Self {
        Self {
            time: RangeSet::new(),
            space: RangeSet::new(),
            tracker: CellTracker::new(Dimension::Space),
        }
    }
}

fn flat(dim: Dimension, order: u8, first: u64, last: u64) -> Interval {
    let shift = dim.shift(order);
    Interval::new(first << shift, (last + 1) << shift)
}

fn check_version(kind: MapKind, findings: &mut Findings, out: &mut Collector) -> Flow {
    match findings.version {
        Some(v) if v.is_legacy() && kind != MapKind::Space => {
            out.error("text", format!("{kind} maps are not defined by MOC {v}"))
        }
        Some(_) => Ok(()),
        None => {
            if kind != MapKind::Space {
                findings.version = Some(MocVersion::V2_0);
            }
            Ok(())
        }
    }
}

pub(crate) fn check_ascii(text: &str, out: &mut Collector, findings: &mut Findings) -> Flow {
    let lexed = lex(text, out)?;
    let has = |dim| lexed.iter().any(|l| l.lexeme == Lexeme::Dim(dim));
    let kind = match (has(Dimension::Time), has(Dimension::Space)) {
        (true, true) => MapKind::SpaceTime,
        (true, false) => MapKind::Time,
        _ => MapKind::Space,
    };
    findings.kind = Some(kind);
    check_version(kind, findings, out)?;
    if lexed.is_empty() {
        out.warn("text", "empty MOC; an empty map is written as a bare order such as '0/'");
        return Ok(());
    }
    match kind {
        MapKind::Space => single_dimension(&lexed, Dimension::Space, out),
        MapKind::Time => single_dimension(&lexed, Dimension::Time, out),
        MapKind::SpaceTime => space_time(&lexed, out),
    }
}

fn single_dimension(lexed: &[Lexed], dim: Dimension, out: &mut Collector) -> Flow {
    let mut tracker = CellTracker::new(dim);
    let mut order: Option<Option<u8>> = None;
    for l in lexed {
        let at = format!("byte {}", l.pos);
        match l.lexeme {
            Lexeme::Dim(d) if d != dim => {
                let name = dim.name().to_lowercase();
                out.error(at, format!("{} prefix in a {name} map", d.prefix()))?;
            }
            Lexeme::Dim(_) => {}
            Lexeme::Order(o) => {
                let valid = tracker.order(out, at, o)?;
                order = Some(valid.then_some(o as u8));
            }
            Lexeme::Cells(first, last) => match order {
                None => out.error(at, "value before any order")?,
                Some(None) => {}
                Some(Some(o)) => tracker.cells(out, at, o, first, last)?,
            },
        }
    }
    tracker.finish(out, "text");
    Ok(())
}

fn space_time(lexed: &[Lexed], out: &mut Collector) -> Flow {
    let mut time_tracker = CellTracker::new(Dimension::Time);
    let mut side: Option<Dimension> = None;
    let mut t_order: Option<Option<u8>> = None;
    let mut s_order: Option<Option<u8>> = None;
    let mut block = Block::new();
    let mut previous: Option<Block> = None;
    let mut block_pos = 0;

    for l in lexed {
        let at = format!("byte {}", l.pos);
        match l.lexeme {
            Lexeme::Dim(Dimension::Time) => {
                if !block.space.is_empty() {
                    close_block(&mut block, &mut previous, &mut time_tracker, block_pos, out);
                }
                if block.time.is_empty() {
                    block_pos = l.pos;
                }
                side = Some(Dimension::Time);
            }
            Lexeme::Dim(Dimension::Space) => side = Some(Dimension::Space),
            Lexeme::Order(o) => {
                let Some(dim) = side else {
                    out.error(at, "order before any t or s prefix")?;
                    continue;
                };
                let valid = if dim == Dimension::Time {
                    time_tracker.order(out, at, o)?
                } else {
                    block.tracker.order(out, at, o)?
                };
                let order = Some(valid.then_some(o as u8));
                if dim == Dimension::Time {
                    t_order = order;
                } else {
                    s_order = order;
                }
            }
            Lexeme::Cells(first, last) => match side {
                None => out.error(at, "value before any t or s prefix")?,
                Some(Dimension::Time) => match t_order {
                    None => out.error(at, "time value before any order")?,
                    Some(None) => {}
                    Some(Some(o)) => {
                        time_tracker.cells(out, &at, o, first, last)?;
                        if first <= last && last < Dimension::Time.cells_at_order(o) {
                            block.time.insert(flat(Dimension::Time, o, first, last));
                        }
                    }
                },
                Some(Dimension::Space) => {
                    if block.time.is_empty() {
                        out.error(at, "space range before any time range")?;
                        continue;
                    }
                    match s_order {
                        None => out.error(at, "space value before any order")?,
                        Some(None) => {}
                        Some(Some(o)) => {
                            block.tracker.cells(out, &at, o, first, last)?;
                            if first <= last && last < Dimension::Space.cells_at_order(o) {
                                block.space.insert(flat(Dimension::Space, o, first, last));
                            }
                        }
                    }
                }
            },
        }
    }

    if !block.time.is_empty() && block.space.is_empty() {
        out.error(
            format_args!("byte {block_pos}"),
            "time range without a following space range",
        )?;
    } else if !block.space.is_empty() {
        close_block(&mut block, &mut previous, &mut time_tracker, block_pos, out);
    }
    Ok(())
}

/// Time cells are checked for canonical form within their own block.
fn close_block(
    block: &mut Block,
    previous: &mut Option<Block>,
    time_tracker: &mut CellTracker,
    pos: usize,
    out: &mut Collector,
) {
    time_tracker.finish(out, format_args!("byte {pos}"));
    block.tracker.finish(out, format_args!("byte {pos}"));
    let done = std::mem::replace(block, Block::new());
    if let Some(prev) = previous.as_ref() {
        let touching = match (prev.time.as_slice().last(), done.time.as_slice().first()) {
            (Some(a), Some(b)) => a.end == b.start,
            _ => false,
        };
        if touching && prev.space == done.space {
            out.warn(
                format_args!("byte {pos}"),
                "consecutive segments with identical space coverage are not merged",
            );
        }
    }
    *previous = Some(done);
}

pub(crate) fn check_json(text: &str, out: &mut Collector, findings: &mut Findings) -> Flow {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            return out.error(
                format_args!("line {} column {}", e.line(), e.column()),
                format!("invalid JSON: {e}"),
            )
        }
    };
    match &value {
        Value::Object(_) => {
            findings.kind = Some(MapKind::Space);
            check_version(MapKind::Space, findings, out)?;
            let mut tracker = CellTracker::new(Dimension::Space);
            json_cells(&value, &mut tracker, "", out)?;
            tracker.finish(out, "json");
            Ok(())
        }
        Value::Array(blocks) => {
            findings.kind = Some(MapKind::SpaceTime);
            check_version(MapKind::SpaceTime, findings, out)?;
            json_blocks(blocks, out)
        }
        _ => out.error("json", "expected an object of orders or an array of blocks"),
    }
}

/// Check one `{"order": [cells]}` object. Returns the number of cells seen.
fn json_cells(
    value: &Value,
    tracker: &mut CellTracker,
    prefix: &str,
    out: &mut Collector,
) -> Result<usize, TooManyErrors> {
    let Some(object) = value.as_object() else {
        out.error(format_args!("{prefix}json"), "expected an object of order keys")?;
        return Ok(0);
    };
    let mut count = 0;
    for (key, cells) in object {
        let at = format!("{prefix}order \"{key}\"");
        let Ok(order) = key.trim().parse::<u64>() else {
            out.error(&at, format!("key \"{key}\" is not an order"))?;
            continue;
        };
        if !tracker.order(out, &at, order)? {
            continue;
        }
        let Some(cells) = cells.as_array() else {
            out.error(&at, "value is not an array of cells")?;
            continue;
        };
        for cell in cells {
            match cell.as_u64() {
                Some(c) => {
                    tracker.cells(out, &at, order as u8, c, c)?;
                    count += 1;
                }
                None => out.error(&at, format!("{cell} is not a cell number"))?,
            }
        }
    }
    Ok(count)
}

fn json_blocks(blocks: &[Value], out: &mut Collector) -> Flow {
    let mut time_tracker = CellTracker::new(Dimension::Time);
    for (i, block) in blocks.iter().enumerate() {
        let at = format!("block {}", i + 1);
        let Some(object) = block.as_object() else {
            out.error(&at, "block is not an object")?;
            continue;
        };
        for key in object.keys().filter(|k| *k != "t" && *k != "s") {
            out.warn(&at, format!("unknown member \"{key}\""));
        }
        let (Some(t), Some(s)) = (object.get("t"), object.get("s")) else {
            out.error(&at, "block needs both a \"t\" and an \"s\" member")?;
            continue;
        };
        let times = json_cells(t, &mut time_tracker, &format!("{at} t "), out)?;
        time_tracker.finish(out, &at);
        let mut space_tracker = CellTracker::new(Dimension::Space);
        let spaces = json_cells(s, &mut space_tracker, &format!("{at} s "), out)?;
        space_tracker.finish(out, &at);
        match (times, spaces) {
            (0, 0) | (1.., 1..) => {}
            (_, 0) => out.error(&at, "time range without a space range")?,
            (0, _) => out.error(&at, "space range without a time range")?,
        }
    }
    Ok(())
}
