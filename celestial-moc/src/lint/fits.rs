//! Rules for FITS containers.
//!
//! The header is scanned card by card so a single bad card does not hide the
//! rest. Table rows are read straight from the byte image; nothing here goes
//! through the FITS reader.

use super::cells::CellTracker;
use super::{Collector, Findings, Flow, MapKind, TooManyErrors};
use crate::config::MocVersion;
use crate::dim::Dimension;
use crate::io::fits::{is_reserved, Card, BLOCK_SIZE, CARD_SIZE};
use byteorder::{BigEndian, ByteOrder};

/// Keywords commonly found in MOC files that no revision defines.
const COMMON_KEYWORDS: &[&str] = &[
    "EXTNAME", "DATE", "ORIGIN", "MOCTOOL", "MOCID", "MOCTYPE", "TUNIT1", "CHECKSUM", "DATASUM",
    "TELESCOP", "INSTRUME", "OBJECT", "AUTHOR", "REFERENC", "DATE-OBS",
];

/// Keywords that only exist from 2.0 on.
const V2_KEYWORDS: &[&str] = &["MOCDIM", "MOCORD_S", "MOCORD_T", "TIMESYS"];

struct Hdu {
    name: &'static str,
    cards: Vec<(usize, Card)>,
    /// Offset of the first block after the header.
    end: usize,
}

impl Hdu {
    fn get(&self, key: &str) -> Option<&Card> {
        self.cards.iter().find(|(_, c)| c.keyword == key).map(|(_, c)| c)
    }

    fn at(&self, key: &str) -> String {
        match self.cards.iter().find(|(_, c)| c.keyword == key) {
            Some((i, _)) => format!("{} card {i} ({key})", self.name),
            None => format!("{} header", self.name),
        }
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Card::as_str).map(str::trim)
    }

    /// An integer keyword that must be present.
    fn int(&self, out: &mut Collector, key: &str) -> Result<Option<i64>, TooManyErrors> {
        match self.get(key) {
            None => {
                out.error(self.at(key), format!("missing required keyword {key}"))?;
                Ok(None)
            }
            Some(card) => match card.as_int() {
                Some(v) => Ok(Some(v)),
                None => {
                    out.error(self.at(key), format!("{key} must be an integer"))?;
                    Ok(None)
                }
            },
        }
    }

    fn expect_int(&self, out: &mut Collector, key: &str, expected: i64) -> Flow {
        match self.int(out, key)? {
            Some(v) if v != expected => {
                out.error(self.at(key), format!("{key} = {v}, expected {expected}"))
            }
            _ => Ok(()),
        }
    }

    /// A string keyword that must be present and take one of `allowed`.
    fn choice(
        &self,
        out: &mut Collector,
        key: &str,
        allowed: &[&'static str],
    ) -> Result<Option<&'static str>, TooManyErrors> {
        let Some(card) = self.get(key) else {
            out.error(self.at(key), format!("missing required keyword {key}"))?;
            return Ok(None);
        };
        let value = card.as_str().map(str::trim);
        match allowed.iter().find(|a| Some(**a) == value) {
            Some(v) => Ok(Some(*v)),
            None => {
                out.error(self.at(key), format!("{key} must be one of {}", quoted(allowed)))?;
                Ok(None)
            }
        }
    }

    /// A required order keyword within the dimension's range.
    fn order(
        &self,
        out: &mut Collector,
        key: &str,
        dim: Dimension,
    ) -> Result<Option<u8>, TooManyErrors> {
        let Some(v) = self.int(out, key)? else {
            return Ok(None);
        };
        match u8::try_from(v) {
            Ok(order) if order <= dim.max_order() => Ok(Some(order)),
            _ => {
                out.error(
                    self.at(key),
                    format!("{key} = {v} is outside 0..={}", dim.max_order()),
                )?;
                Ok(None)
            }
        }
    }
}

fn quoted(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("'{v}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// What the extension header says about the table.
struct Table {
    width: usize,
    rows: usize,
}

struct Layout {
    kind: MapKind,
    range: bool,
    space_order: Option<u8>,
    time_order: Option<u8>,
}

pub(crate) fn check(bytes: &[u8], out: &mut Collector, findings: &mut Findings) -> Flow {
    if bytes.len() % BLOCK_SIZE != 0 {
        out.error(
            "file",
            format!("size {} is not a multiple of {BLOCK_SIZE} bytes", bytes.len()),
        )?;
    }

    let Some(primary) = scan_header(bytes, 0, "primary", out)? else {
        return Ok(());
    };
    check_primary(&primary, out)?;

    let Some(ext) = scan_header(bytes, primary.end, "extension", out)? else {
        return Ok(());
    };
    let table = check_table(&ext, out)?;
    let version = check_version(&ext, findings.version, out)?;
    findings.version = Some(version);
    let layout = if version.is_legacy() {
        check_legacy(&ext, version, out)?
    } else {
        check_v2(&ext, out)?
    };
    findings.kind = Some(layout.kind);
    check_column_name(&ext, &layout, out);
    check_extra_keywords(&ext, out);

    if let Some(table) = table {
        check_data(bytes, ext.end, &table, &layout, out)?;
    }
    Ok(())
}

fn scan_header(
    bytes: &[u8],
    offset: usize,
    name: &'static str,
    out: &mut Collector,
) -> Result<Option<Hdu>, TooManyErrors> {
    let mut cards: Vec<(usize, Card)> = Vec::new();
    let mut pos = offset;
    let mut index = 1;
    while pos + CARD_SIZE <= bytes.len() {
        let raw = &bytes[pos..pos + CARD_SIZE];
        pos += CARD_SIZE;
        let card = match Card::parse(raw) {
            Ok(card) => card,
            Err(e) => {
                out.error(format_args!("{name} card {index}"), e.to_string())?;
                index += 1;
                continue;
            }
        };
        if card.keyword == "END" {
            let end = pos.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
            return Ok(Some(Hdu { name, cards, end }));
        }
        let repeatable = matches!(card.keyword.as_str(), "" | "COMMENT" | "HISTORY");
        if !repeatable && cards.iter().any(|(_, c)| c.keyword == card.keyword) {
            let at = format!("{name} card {index} ({})", card.keyword);
            let message = format!("keyword {} is duplicated", card.keyword);
            if is_reserved(&card.keyword) {
                out.error(at, message)?;
            } else {
                out.warn(at, message);
            }
        }
        cards.push((index, card));
        index += 1;
    }
    if offset >= bytes.len() {
        out.error(name, format!("{name} header is missing"))?;
    } else {
        out.error(name, format!("{name} header has no END card"))?;
    }
    Ok(None)
}

fn check_primary(hdu: &Hdu, out: &mut Collector) -> Flow {
    let first = hdu.cards.first().map(|(_, c)| c);
    if first.map(|c| c.keyword.as_str()) != Some("SIMPLE") {
        out.error("primary card 1", "first card must be SIMPLE")?;
    } else if first.and_then(Card::as_bool) != Some(true) {
        out.error(hdu.at("SIMPLE"), "SIMPLE must be T")?;
    }
    hdu.expect_int(out, "BITPIX", 8)?;
    hdu.expect_int(out, "NAXIS", 0)?;
    match hdu.get("EXTEND").map(Card::as_bool) {
        None => out.warn(hdu.at("EXTEND"), "EXTEND = T is expected before an extension"),
        Some(Some(true)) => {}
        Some(_) => out.warn(hdu.at("EXTEND"), "EXTEND should be T"),
    }
    Ok(())
}

fn check_table(ext: &Hdu, out: &mut Collector) -> Result<Option<Table>, TooManyErrors> {
    let first = ext.cards.first().map(|(_, c)| c);
    if first.map(|c| c.keyword.as_str()) != Some("XTENSION") {
        out.error("extension card 1", "first card must be XTENSION")?;
    } else if ext.text("XTENSION") != Some("BINTABLE") {
        out.error(ext.at("XTENSION"), "XTENSION must be 'BINTABLE'")?;
    }
    ext.expect_int(out, "BITPIX", 8)?;
    ext.expect_int(out, "NAXIS", 2)?;
    ext.expect_int(out, "PCOUNT", 0)?;
    ext.expect_int(out, "GCOUNT", 1)?;

    let fields = ext.int(out, "TFIELDS")?;
    if let Some(n) = fields.filter(|&n| n != 1) {
        out.error(
            ext.at("TFIELDS"),
            format!("TFIELDS = {n}, a MOC table has exactly one column"),
        )?;
    }
    let width = match ext.choice(out, "TFORM1", &["1J", "J", "1K", "K"])? {
        Some("1J") | Some("J") => Some(4),
        Some(_) => Some(8),
        None => None,
    };
    let naxis1 = ext.int(out, "NAXIS1")?;
    if let (Some(w), Some(n)) = (width, naxis1) {
        if n != w as i64 {
            out.error(
                ext.at("NAXIS1"),
                format!("NAXIS1 = {n} does not match a {w}-byte TFORM1"),
            )?;
        }
    }
    let rows = match ext.int(out, "NAXIS2")? {
        Some(n) if n < 0 => {
            out.error(ext.at("NAXIS2"), "NAXIS2 is negative")?;
            None
        }
        Some(n) => usize::try_from(n).ok(),
        None => None,
    };

    Ok(match (fields, width, naxis1, rows) {
        (Some(1), Some(width), Some(n), Some(rows)) if n == width as i64 => {
            Some(Table { width, rows })
        }
        _ => None,
    })
}

fn check_version(
    ext: &Hdu,
    forced: Option<MocVersion>,
    out: &mut Collector,
) -> Result<MocVersion, TooManyErrors> {
    let declared_text = ext.text("MOCVERS");
    let declared = match declared_text {
        Some(text) => {
            let parsed = MocVersion::parse(text);
            if parsed.is_none() {
                out.warn(
                    ext.at("MOCVERS"),
                    format!("unknown MOCVERS '{text}', checking as 2.0"),
                );
            }
            parsed.or(Some(MocVersion::V2_0))
        }
        None => None,
    };
    let inferred = declared.unwrap_or(if ext.get("MOCDIM").is_some() {
        MocVersion::V2_0
    } else {
        MocVersion::V1_0
    });
    let version = match forced {
        Some(forced) if forced != inferred => {
            out.info(
                "extension header",
                format!("checking against MOC {forced}, the file looks like MOC {inferred}"),
            );
            forced
        }
        Some(forced) => forced,
        None => inferred,
    };
    if version != MocVersion::V1_0 && declared_text.is_none() {
        out.error(
            "extension header",
            format!("missing MOCVERS, required by MOC {version}"),
        )?;
    }
    Ok(version)
}

fn check_legacy(
    ext: &Hdu,
    version: MocVersion,
    out: &mut Collector,
) -> Result<Layout, TooManyErrors> {
    for key in V2_KEYWORDS {
        if ext.get(key).is_some() {
            out.warn(ext.at(key), format!("{key} is not defined by MOC {version}"));
        }
    }
    ext.choice(out, "ORDERING", &["NUNIQ"])?;
    ext.choice(out, "PIXTYPE", &["HEALPIX"])?;
    ext.choice(out, "COORDSYS", &["C"])?;
    let order = ext.order(out, "MOCORDER", Dimension::Space)?;
    Ok(Layout {
        kind: MapKind::Space,
        range: false,
        space_order: order,
        time_order: None,
    })
}

fn check_v2(ext: &Hdu, out: &mut Collector) -> Result<Layout, TooManyErrors> {
    let kind = match ext.choice(out, "MOCDIM", &["SPACE", "TIME", "TIME.SPACE"])? {
        Some("TIME") => MapKind::Time,
        Some("TIME.SPACE") => MapKind::SpaceTime,
        _ => MapKind::Space,
    };
    let range = ext.choice(out, "ORDERING", &["NUNIQ", "RANGE"])? == Some("RANGE");
    if kind == MapKind::SpaceTime && ext.text("ORDERING") == Some("NUNIQ") {
        out.error(ext.at("ORDERING"), "space-time maps must use ORDERING = 'RANGE'")?;
    }

    let has_space = kind != MapKind::Time;
    let has_time = kind != MapKind::Space;
    let mut space_order = None;
    let mut time_order = None;

    if has_space {
        match ext.text("COORDSYS") {
            None => out.error(ext.at("COORDSYS"), "missing required keyword COORDSYS")?,
            Some("C") => {}
            Some(other) => out.warn(
                ext.at("COORDSYS"),
                format!("COORDSYS '{other}' is not a standard frame"),
            ),
        }
        space_order = ext.order(out, "MOCORD_S", Dimension::Space)?;
        if let Some(legacy) = ext.get("MOCORDER").and_then(Card::as_int) {
            if space_order.is_some_and(|s| i64::from(s) != legacy) {
                out.warn(ext.at("MOCORDER"), "MOCORDER disagrees with MOCORD_S");
            }
        }
        if let Some(pixtype) = ext.text("PIXTYPE").filter(|p| *p != "HEALPIX") {
            out.error(
                ext.at("PIXTYPE"),
                format!("PIXTYPE '{pixtype}', expected 'HEALPIX'"),
            )?;
        }
    } else if ext.get("COORDSYS").is_some() {
        out.warn(ext.at("COORDSYS"), "COORDSYS has no meaning on a time map");
    }

    if has_time {
        match ext.text("TIMESYS") {
            None => out.error(ext.at("TIMESYS"), "missing required keyword TIMESYS")?,
            Some("TCB") => {}
            Some(other) => out.warn(ext.at("TIMESYS"), format!("TIMESYS '{other}' is not 'TCB'")),
        }
        time_order = ext.order(out, "MOCORD_T", Dimension::Time)?;
    } else if ext.get("TIMESYS").is_some() {
        out.warn(ext.at("TIMESYS"), "TIMESYS has no meaning on a space map");
    }

    Ok(Layout {
        kind,
        range,
        space_order,
        time_order,
    })
}

fn check_column_name(ext: &Hdu, layout: &Layout, out: &mut Collector) {
    let expected = if layout.range { "RANGE" } else { "UNIQ" };
    match ext.text("TTYPE1") {
        Some(name) if name == expected => {}
        Some(name) => out.warn(
            ext.at("TTYPE1"),
            format!("column is named '{name}', expected '{expected}'"),
        ),
        None => out.info(
            ext.at("TTYPE1"),
            format!("column has no TTYPE1, expected '{expected}'"),
        ),
    }
}

fn check_extra_keywords(ext: &Hdu, out: &mut Collector) {
    for (i, card) in &ext.cards {
        let key = card.keyword.as_str();
        if key.is_empty() || is_reserved(key) || COMMON_KEYWORDS.contains(&key) {
            continue;
        }
        out.info(
            format_args!("extension card {i} ({key})"),
            format!("keyword {key} is not part of the MOC standard"),
        );
    }
}

fn check_data(
    bytes: &[u8],
    start: usize,
    table: &Table,
    layout: &Layout,
    out: &mut Collector,
) -> Flow {
    let start = start.min(bytes.len());
    let available = bytes.len() - start;
    let announced = table.rows.saturating_mul(table.width);
    let rows = if available < announced {
        out.error(
            "data",
            format!(
                "table truncated: {} rows announced, {} present",
                table.rows,
                available / table.width
            ),
        )?;
        available / table.width
    } else {
        table.rows
    };

    let data_end = start + rows * table.width;
    let padded_end = data_end.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    if let Some(padding) = bytes.get(data_end..padded_end.min(bytes.len())) {
        if padding.iter().any(|&b| b != 0) {
            out.warn("data", "data padding is not zero-filled");
        }
    }
    if bytes.len() > padded_end {
        out.info(
            "data",
            format!("{} bytes follow the MOC table", bytes.len() - padded_end),
        );
    }

    let values: Vec<i64> = bytes[start..data_end]
        .chunks_exact(table.width)
        .map(|raw| {
            if table.width == 4 {
                i64::from(BigEndian::read_i32(raw))
            } else {
                BigEndian::read_i64(raw)
            }
        })
        .collect();

    if layout.range && table.width == 4 {
        out.error("extension header", "RANGE tables need 64-bit (1K) columns")?;
    }
    match (layout.kind, layout.range) {
        (MapKind::Space, false) => check_nuniq(&values, Dimension::Space, layout.space_order, out),
        (MapKind::Time, false) => check_nuniq(&values, Dimension::Time, layout.time_order, out),
        (MapKind::Space, true) => check_ranges(&values, Dimension::Space, layout.space_order, out),
        (MapKind::Time, true) => check_ranges(&values, Dimension::Time, layout.time_order, out),
        (MapKind::SpaceTime, _) => check_space_time(&values, layout, out),
    }
}

fn check_nuniq(values: &[i64], dim: Dimension, declared: Option<u8>, out: &mut Collector) -> Flow {
    let name = dim.name().to_lowercase();
    let mut tracker = CellTracker::new(dim);
    for (row, &v) in values.iter().enumerate() {
        let at = format!("row {}", row + 1);
        let cell = match u64::try_from(v).ok().map(|u| dim.uniq_decode(u)) {
            Some(Ok(cell)) => cell,
            _ => {
                out.error(at, format!("{v} is not a valid {name} UNIQ value"))?;
                continue;
            }
        };
        if let Some(order) = declared.filter(|&o| cell.order > o) {
            out.error(
                &at,
                format!(
                    "cell {}/{} is deeper than the declared order {order}",
                    cell.order, cell.index
                ),
            )?;
        }
        tracker.cells(out, at, cell.order, cell.index, cell.index)?;
    }
    tracker.finish(out, "data");
    Ok(())
}

/// Validate one `[start, end)` pair. Returns the pair when it is usable for
/// ordering checks.
fn flat_pair(
    dim: Dimension,
    declared: Option<u8>,
    start: u64,
    end: u64,
    at: &str,
    out: &mut Collector,
) -> Result<Option<(u64, u64)>, TooManyErrors> {
    let name = dim.name().to_lowercase();
    if start >= end {
        out.error(at, format!("{name} range [{start}, {end}) is empty or reversed"))?;
        return Ok(None);
    }
    if end > dim.domain_end() {
        out.error(
            at,
            format!("{name} range end {end} is past the domain end {}", dim.domain_end()),
        )?;
        return Ok(None);
    }
    if let Some(order) = declared {
        let mask = dim.cell_size(order) - 1;
        if start & mask != 0 || end & mask != 0 {
            out.error(
                at,
                format!("range [{start}, {end}) is not aligned to order {order} cells"),
            )?;
        }
    }
    Ok(Some((start, end)))
}

/// Tracks ascending, disjoint, merged pairs along one axis.
#[derive(Default)]
struct Sequence {
    last_end: Option<u64>,
}

impl Sequence {
    fn push(&mut self, (start, end): (u64, u64), what: &str, at: &str, out: &mut Collector) -> Flow {
        match self.last_end {
            Some(prev) if start < prev => {
                out.error(at, format!("{what} ranges overlap or are not ascending"))?;
            }
            Some(prev) if start == prev => {
                out.warn(at, format!("adjacent {what} ranges are not merged"));
            }
            _ => {}
        }
        self.last_end = Some(self.last_end.map_or(end, |prev| prev.max(end)));
        Ok(())
    }
}

fn check_ranges(values: &[i64], dim: Dimension, declared: Option<u8>, out: &mut Collector) -> Flow {
    if values.len() % 2 != 0 {
        out.error("data", "RANGE column holds an odd number of values")?;
    }
    let what = dim.name().to_lowercase();
    let mut seq = Sequence::default();
    for (i, pair) in values.chunks_exact(2).enumerate() {
        let at = format!("rows {}-{}", 2 * i + 1, 2 * i + 2);
        let (Ok(start), Ok(end)) = (u64::try_from(pair[0]), u64::try_from(pair[1])) else {
            out.error(&at, format!("negative value in a {what} range"))?;
            continue;
        };
        if let Some(pair) = flat_pair(dim, declared, start, end, &at, out)? {
            seq.push(pair, &what, &at, out)?;
        }
    }
    Ok(())
}

/// Blocks of negative (time) pairs followed by non-negative (space) pairs.
fn check_space_time(values: &[i64], layout: &Layout, out: &mut Collector) -> Flow {
    let mut time_seq = Sequence::default();
    let mut previous: Option<(u64, Vec<(u64, u64)>)> = None;
    let mut i = 0;

    while i < values.len() {
        let block_row = i + 1;
        if values[i] >= 0 {
            out.error(
                format_args!("row {block_row}"),
                "space range before any time range",
            )?;
            while i < values.len() && values[i] >= 0 {
                i += 1;
            }
            continue;
        }

        let mut first_time = None;
        let mut last_time_end = 0;
        while i < values.len() && values[i] < 0 {
            let at = format!("rows {}-{}", i + 1, i + 2);
            match values.get(i + 1) {
                Some(&end) if end < 0 => {
                    let start = (-1 - values[i]) as u64;
                    let end = (-1 - end) as u64;
                    if let Some(pair) =
                        flat_pair(Dimension::Time, layout.time_order, start, end, &at, out)?
                    {
                        time_seq.push(pair, "time", &at, out)?;
                        first_time.get_or_insert(pair.0);
                        last_time_end = pair.1;
                    }
                }
                _ => {
                    out.error(at, "time range is missing its end")?;
                }
            }
            i += 2;
        }

        let mut space = Vec::new();
        let mut space_seq = Sequence::default();
        while i < values.len() && values[i] >= 0 {
            let at = format!("rows {}-{}", i + 1, i + 2);
            match values.get(i + 1) {
                Some(&end) if end >= 0 => {
                    if let Some(pair) = flat_pair(
                        Dimension::Space,
                        layout.space_order,
                        values[i] as u64,
                        end as u64,
                        &at,
                        out,
                    )? {
                        space_seq.push(pair, "space", &at, out)?;
                        space.push(pair);
                    }
                }
                _ => {
                    out.error(at, "space range is missing its end")?;
                }
            }
            i += 2;
        }

        if space.is_empty() {
            out.error(
                format_args!("row {block_row}"),
                "time range without a following space range",
            )?;
            continue;
        }
        if let (Some(first), Some((prev_end, prev_space))) = (first_time, &previous) {
            if first == *prev_end && *prev_space == space {
                out.warn(
                    format_args!("row {block_row}"),
                    "consecutive segments with identical space coverage are not merged",
                );
            }
        }
        previous = Some((last_time_end, space));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::{lint_bytes, Level, LintStatus};
    use super::*;
    use crate::config::{ColumnOrdering, LintConfig, WriteOptions};
    use crate::moc::Moc;
    use crate::stmoc::StMoc;

    fn space_fits(opts: &WriteOptions) -> Vec<u8> {
        let moc = Moc::parse(Dimension::Space, "3/1 3 10 4/16-18 22").unwrap();
        moc.to_fits(opts).unwrap()
    }

    /// Overwrite the value of an extension card in place.
    fn patch(bytes: &mut [u8], key: &str, value: &str) {
        let ext = &mut bytes[BLOCK_SIZE..2 * BLOCK_SIZE];
        let card = ext
            .chunks_exact_mut(CARD_SIZE)
            .find(|c| c.starts_with(format!("{key:<8}=").as_bytes()))
            .unwrap();
        let mut text = format!("{key:<8}= {value}").into_bytes();
        text.resize(CARD_SIZE, b' ');
        card.copy_from_slice(&text);
    }

    fn lint(bytes: &[u8]) -> super::super::LintReport {
        lint_bytes(bytes, &LintConfig::default())
    }

    #[test]
    fn written_files_are_clean() {
        for ordering in [ColumnOrdering::Nuniq, ColumnOrdering::Range] {
            let report = lint(&space_fits(&WriteOptions::default().with_ordering(ordering)));
            assert_eq!(report.status(), LintStatus::Ok, "{report}");
            assert_eq!(report.version, Some(MocVersion::V2_0));
            assert_eq!(report.kind, Some(MapKind::Space));
        }
        let time = Moc::parse(Dimension::Time, "t10/5-9").unwrap();
        let report = lint(&time.to_fits(&WriteOptions::default()).unwrap());
        assert_eq!(report.status(), LintStatus::Ok, "{report}");
        assert_eq!(report.kind, Some(MapKind::Time));
    }

    #[test]
    fn space_time_files_are_clean() {
        let st = StMoc::parse("t1/0 s3/1-2 t2/3 s4/0").unwrap();
        let report = lint(&st.to_bytes(&WriteOptions::default()).unwrap());
        assert_eq!(report.status(), LintStatus::Ok, "{report}");
        assert_eq!(report.kind, Some(MapKind::SpaceTime));
    }

    #[test]
    fn two_fields_is_an_error() {
        let mut bytes = space_fits(&WriteOptions::default());
        patch(&mut bytes, "TFIELDS", "                   2");
        let report = lint(&bytes);
        assert_eq!(report.status(), LintStatus::Error);
        assert!(report.errors().any(|d| d.message.contains("TFIELDS = 2")));
    }

    #[test]
    fn missing_required_keyword() {
        let mut bytes = space_fits(&WriteOptions::default());
        patch(&mut bytes, "MOCDIM", "'SKY'");
        let report = lint(&bytes);
        assert!(report.errors().any(|d| d.location.contains("MOCDIM")));
    }

    #[test]
    fn legacy_file_needs_pixtype_and_mocorder() {
        let mut bytes = space_fits(&WriteOptions::default());
        // Turn the 2.0 header into a bare 1.0 one.
        for key in ["MOCVERS", "MOCDIM", "MOCORD_S", "PIXTYPE"] {
            let ext = &mut bytes[BLOCK_SIZE..2 * BLOCK_SIZE];
            for card in ext.chunks_exact_mut(CARD_SIZE) {
                if card.starts_with(format!("{key:<8}=").as_bytes()) {
                    card.fill(b' ');
                }
            }
        }
        let report = lint(&bytes);
        assert_eq!(report.version, Some(MocVersion::V1_0));
        assert!(report.errors().any(|d| d.message.contains("PIXTYPE")));
        assert!(!report.errors().any(|d| d.message.contains("MOCVERS")));
    }

    #[test]
    fn cells_deeper_than_declared_order() {
        let mut bytes = space_fits(&WriteOptions::default());
        patch(&mut bytes, "MOCORD_S", "                   3");
        let report = lint(&bytes);
        assert!(report.errors().any(|d| d.message.contains("deeper")));
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.level == Level::Warning && d.message.contains("MOCORDER")));
    }

    #[test]
    fn truncated_data() {
        let mut bytes = space_fits(&WriteOptions::default());
        patch(&mut bytes, "NAXIS2", "                 1000");
        let report = lint(&bytes);
        assert!(report.errors().any(|d| d.message.contains("truncated")));
    }

    #[test]
    fn unsorted_ranges() {
        let mut bytes = space_fits(&WriteOptions::default().with_ordering(ColumnOrdering::Range));
        let data = 2 * BLOCK_SIZE;
        // Swap the first two ranges.
        let (a, b) = bytes[data..data + 32].split_at_mut(16);
        a.swap_with_slice(b);
        let report = lint(&bytes);
        assert!(report.errors().any(|d| d.message.contains("not ascending")));
    }

    #[test]
    fn trailing_time_range() {
        let st = StMoc::parse("t1/0 s3/1-2").unwrap();
        let mut bytes = st.to_bytes(&WriteOptions::default()).unwrap();
        // Rows: t_start t_end s_start s_end. Make the space pair a time pair.
        let data = 2 * BLOCK_SIZE;
        BigEndian::write_i64(&mut bytes[data + 16..data + 24], -1);
        BigEndian::write_i64(&mut bytes[data + 24..data + 32], -2);
        let report = lint(&bytes);
        assert!(report.errors().any(|d| d.message.contains("without a following space")));
    }

    #[test]
    fn garbage_never_panics() {
        for bytes in [
            b"SIMPLE".to_vec(),
            {
                let mut v = b"SIMPLE".to_vec();
                v.resize(BLOCK_SIZE, b' ');
                v
            },
            {
                let mut v = space_fits(&WriteOptions::default());
                v.truncate(BLOCK_SIZE + 100);
                v
            },
            {
                let mut v = space_fits(&WriteOptions::default());
                let end = v[BLOCK_SIZE..]
                    .chunks_exact(80)
                    .position(|card| card.starts_with(b"END "))
                    .unwrap();
                v.truncate(BLOCK_SIZE + (end + 1) * 80);
                v
            },
        ] {
            assert_eq!(lint(&bytes).status(), LintStatus::Error);
        }
    }

    #[test]
    fn stream_ending_at_extension_end_is_truncated() {
        let mut bytes = space_fits(&WriteOptions::default());
        let end = bytes[BLOCK_SIZE..]
            .chunks_exact(80)
            .position(|card| card.starts_with(b"END "))
            .unwrap();
        bytes.truncate(BLOCK_SIZE + (end + 1) * 80);
        let report = lint(&bytes);
        assert_eq!(report.status(), LintStatus::Error);
        assert!(report.errors().any(|d| d.message.contains("table truncated")));
    }
}
