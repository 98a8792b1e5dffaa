//! JSON serialization: `{"3":[1,3,10],"4":[16,17,18,22]}`.
//!
//! One key per order, each holding the cell numbers at that order. An empty
//! array declares the order without cells. Space-time maps are an array of
//! blocks, `[{"t":{"1":[0]},"s":{"0":[2,3]}}]`.

use super::{raise, ParsedBlocks, ParsedCells};
use crate::dim::{Cell, Dimension};
use crate::error::{MocError, Result};
use crate::moc::Moc;
use crate::ranges::{Interval, RangeSet};
use crate::stmoc::StMoc;
use serde_json::{Map, Value};

pub(crate) fn parse_cells(dim: Dimension, text: &str) -> Result<ParsedCells> {
    let value: Value = serde_json::from_str(text)?;
    let mut cursor = Cursor::new(text);
    let mut parsed = ParsedCells::default();
    cells_from_object(dim, &value, &mut cursor, &mut parsed.ranges, &mut parsed.deepest)?;
    Ok(parsed)
}

/// Byte offsets of the members of an already parsed document. Members are
/// visited in document order (`preserve_order`), so each one is found by
/// scanning forward from the previous.
struct Cursor<'a> {
    text: &'a str,
    at: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            at: text.len() - text.trim_start().len(),
        }
    }

    /// Move to the next occurrence of `needle`, or stay put if there is none.
    fn seek(&mut self, needle: &str) -> usize {
        if let Some(i) = self.text.get(self.at..).and_then(|rest| rest.find(needle)) {
            self.at += i;
        }
        self.at
    }
}

fn cells_from_object(
    dim: Dimension,
    value: &Value,
    cursor: &mut Cursor<'_>,
    ranges: &mut Vec<Interval>,
    deepest: &mut Option<u8>,
) -> Result<()> {
    let object = value
        .as_object()
        .ok_or_else(|| MocError::parse(cursor.at, "expected a JSON object of order keys"))?;
    for (key, cells) in object {
        let at = cursor.seek(&format!("\"{key}\""));
        let order: u8 = key
            .trim()
            .parse()
            .map_err(|_| MocError::parse(at, format!("key '{key}' is not an order")))?;
        dim.check_order(order)?;
        raise(deepest, order);
        let cells = cells
            .as_array()
            .ok_or_else(|| MocError::parse(at, format!("order {order} does not hold an array")))?;
        for cell in cells {
            let at = cursor.seek(&cell.to_string());
            let cell = cell.as_u64().ok_or_else(|| {
                MocError::parse(at, format!("order {order} holds a non-integer value {cell}"))
            })?;
            ranges.push(dim.to_flat(order, cell)?);
        }
    }
    Ok(())
}

pub(crate) fn parse_blocks(text: &str) -> Result<ParsedBlocks> {
    let value: Value = serde_json::from_str(text)?;
    let mut cursor = Cursor::new(text);
    let blocks = value
        .as_array()
        .ok_or_else(|| MocError::parse(cursor.at, "expected a JSON array of time/space blocks"))?;
    let mut parsed = ParsedBlocks::default();
    for block in blocks {
        cursor.at += 1;
        let at = cursor.seek("{");
        let (Some(t), Some(s)) = (block.get("t"), block.get("s")) else {
            return Err(MocError::parse(at, "each block needs a \"t\" and an \"s\" member"));
        };
        let mut time = Vec::new();
        let mut space = Vec::new();
        cursor.seek("\"t\"");
        cells_from_object(Dimension::Time, t, &mut cursor, &mut time, &mut parsed.time_deepest)?;
        cursor.seek("\"s\"");
        cells_from_object(Dimension::Space, s, &mut cursor, &mut space, &mut parsed.space_deepest)?;
        match (time.is_empty(), space.is_empty()) {
            (false, false) => parsed.blocks.push((
                RangeSet::from_intervals(time),
                RangeSet::from_intervals(space),
            )),
            (true, true) => {}
            _ => return Err(MocError::parse(at, "block with time cells but no space cells, or the reverse")),
        }
    }
    Ok(parsed)
}

fn object_from_cells(cells: &[Cell], moc_order: Option<u8>) -> Map<String, Value> {
    let mut object = Map::new();
    for cell in cells {
        let entry = object
            .entry(cell.order.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(values) = entry {
            values.push(Value::from(cell.index));
        }
    }
    if let Some(order) = moc_order {
        let deepest = cells.iter().map(|c| c.order).max();
        if deepest.is_none_or(|d| order > d) {
            object.insert(order.to_string(), Value::Array(Vec::new()));
        }
    }
    object
}

pub(crate) fn write_moc(moc: &Moc) -> Result<String> {
    let object = object_from_cells(&moc.cells(), Some(moc.moc_order()));
    Ok(serde_json::to_string(&Value::Object(object))?)
}

pub(crate) fn write_stmoc(st: &StMoc) -> Result<String> {
    let mut blocks: Vec<Value> = st
        .segments()
        .iter()
        .map(|segment| {
            let time = Dimension::Time.cells(&RangeSet::from_intervals([segment.time]), 0);
            let space = Dimension::Space.cells(&segment.space, 0);
            let mut block = Map::new();
            block.insert("t".into(), Value::Object(object_from_cells(&time, None)));
            block.insert("s".into(), Value::Object(object_from_cells(&space, None)));
            Value::Object(block)
        })
        .collect();

    let mut orders = Map::new();
    let mut t = Map::new();
    t.insert(st.time_order().to_string(), Value::Array(Vec::new()));
    let mut s = Map::new();
    s.insert(st.space_order().to_string(), Value::Array(Vec::new()));
    orders.insert("t".into(), Value::Object(t));
    orders.insert("s".into(), Value::Object(s));
    blocks.push(Value::Object(orders));

    Ok(serde_json::to_string(&Value::Array(blocks))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_orders_and_declarations() {
        let parsed = parse_cells(Dimension::Space, r#"{"3":[1,3,10],"8":[]}"#).unwrap();
        assert_eq!(parsed.ranges.len(), 3);
        assert_eq!(parsed.deepest, Some(8));
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(matches!(
            parse_cells(Dimension::Space, "[1,2]"),
            Err(MocError::Parse { .. })
        ));
        assert!(parse_cells(Dimension::Space, r#"{"x":[1]}"#).is_err());
        assert!(parse_cells(Dimension::Space, r#"{"3":[1.5]}"#).is_err());
        assert!(parse_cells(Dimension::Space, r#"{"3":7}"#).is_err());
        assert!(matches!(
            parse_cells(Dimension::Space, r#"{"0":[12]}"#),
            Err(MocError::OutOfRange { .. })
        ));
        assert!(matches!(
            parse_cells(Dimension::Space, "{\"3\":[1"),
            Err(MocError::Json(_))
        ));
    }

    #[test]
    fn shape_errors_point_at_the_member() {
        fn position<T: std::fmt::Debug>(r: Result<T>) -> usize {
            match r {
                Err(MocError::Parse { position, .. }) => position,
                other => panic!("expected a parse error, got {other:?}"),
            }
        }
        assert_eq!(position(parse_cells(Dimension::Space, r#"{"3":[1],"x":[1]}"#)), 9);
        assert_eq!(position(parse_cells(Dimension::Space, r#"{"3":[1, 2.5]}"#)), 9);
        assert_eq!(position(parse_cells(Dimension::Space, "  [1]")), 2);
        let text = r#"[{"t":{"1":[0]},"s":{"0":[1]}},{"t":{"1":[1]}}]"#;
        assert_eq!(position(parse_blocks(text)), 31);
    }

    #[test]
    fn writes_one_key_per_order() {
        let moc = Moc::parse(Dimension::Space, "3/1 3 10 4/16-18 22").unwrap();
        assert_eq!(
            write_moc(&moc).unwrap(),
            r#"{"3":[1,3,10],"4":[16,17,18,22]}"#
        );
    }

    #[test]
    fn writes_trailing_order() {
        let moc = Moc::parse(Dimension::Space, "3/1 8/").unwrap();
        assert_eq!(write_moc(&moc).unwrap(), r#"{"3":[1],"8":[]}"#);
        assert_eq!(write_moc(&Moc::space()).unwrap(), r#"{"0":[]}"#);
    }

    #[test]
    fn parses_blocks() {
        let parsed =
            parse_blocks(r#"[{"t":{"1":[0]},"s":{"0":[2,3]}},{"t":{"3":[]},"s":{"6":[]}}]"#)
                .unwrap();
        assert_eq!(parsed.blocks.len(), 1);
        assert_eq!(parsed.time_deepest, Some(3));
        assert_eq!(parsed.space_deepest, Some(6));
        assert!(parse_blocks(r#"[{"t":{"1":[0]},"s":{}}]"#).is_err());
        assert!(parse_blocks(r#"[{"t":{"1":[0]}}]"#).is_err());
    }
}
