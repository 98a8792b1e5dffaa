use super::card::{pad_to_block, HeaderWriter};
use crate::config::{ColumnOrdering, WriteOptions};
use crate::dim::Dimension;
use crate::error::{MocError, Result};
use crate::moc::Moc;
use crate::stmoc::StMoc;
use byteorder::{BigEndian, WriteBytesExt};
use std::collections::BTreeMap;

const MOC_VERSION: &str = "2.0";

/// Column description shared by both encoders.
struct Column {
    name: &'static str,
    ordering: ColumnOrdering,
    wide: bool,
    values: Vec<i64>,
}

impl Column {
    fn width(&self) -> usize {
        if self.wide {
            8
        } else {
            4
        }
    }

    fn form(&self) -> &'static str {
        if self.wide {
            "1K"
        } else {
            "1J"
        }
    }

    fn data(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.values.len() * self.width());
        for &v in &self.values {
            if self.wide {
                out.write_i64::<BigEndian>(v)?;
            } else {
                let v = i32::try_from(v)
                    .map_err(|_| MocError::format(format!("value {v} does not fit a 1J column")))?;
                out.write_i32::<BigEndian>(v)?;
            }
        }
        pad_to_block(&mut out, 0);
        Ok(out)
    }
}

fn to_i64(v: u64) -> Result<i64> {
    i64::try_from(v).map_err(|_| MocError::format(format!("value {v} does not fit a 1K column")))
}

fn primary_header() -> Vec<u8> {
    let mut h = HeaderWriter::new();
    h.logical("SIMPLE", true)
        .integer("BITPIX", 8)
        .integer("NAXIS", 0)
        .logical("EXTEND", true);
    h.finish()
}

/// Structural cards of the table extension, up to and including `TFORM1`.
fn table_header(column: &Column) -> Result<HeaderWriter> {
    let mut h = HeaderWriter::new();
    h.string("XTENSION", "BINTABLE")?;
    h.integer("BITPIX", 8)
        .integer("NAXIS", 2)
        .integer("NAXIS1", column.width() as i64)
        .integer("NAXIS2", column.values.len() as i64)
        .integer("PCOUNT", 0)
        .integer("GCOUNT", 1)
        .integer("TFIELDS", 1);
    h.string("TTYPE1", column.name)?;
    h.string("TFORM1", column.form())?;
    h.string("MOCVERS", MOC_VERSION)?;
    Ok(h)
}

fn assemble(
    column: &Column,
    mut header: HeaderWriter,
    properties: &BTreeMap<String, String>,
) -> Result<Vec<u8>> {
    for (key, value) in properties {
        header.string(key, value)?;
    }
    let mut bytes = primary_header();
    bytes.extend(header.finish());
    bytes.extend(column.data()?);
    tracing::debug!(
        ordering = column.ordering.keyword(),
        form = column.form(),
        rows = column.values.len(),
        bytes = bytes.len(),
        "encoded FITS MOC"
    );
    Ok(bytes)
}

/// Encode a single-dimension map. `NUNIQ` tables use 32-bit values when all
/// of them fit, unless `force_64bit` is set.
pub fn encode_moc(moc: &Moc, options: &WriteOptions) -> Result<Vec<u8>> {
    let dim = moc.dimension();
    let values = match options.ordering {
        ColumnOrdering::Nuniq => moc
            .cells()
            .iter()
            .map(|c| to_i64(dim.uniq_encode(c.order, c.index)))
            .collect::<Result<Vec<_>>>()?,
        ColumnOrdering::Range => {
            let mut values = Vec::with_capacity(moc.range_count() * 2);
            for iv in moc.ranges() {
                values.push(to_i64(iv.start)?);
                values.push(to_i64(iv.end)?);
            }
            values
        }
    };
    let wide = options.force_64bit
        || options.ordering == ColumnOrdering::Range
        || values.iter().any(|&v| v > i64::from(i32::MAX));
    let column = Column {
        name: match options.ordering {
            ColumnOrdering::Nuniq => "UNIQ",
            ColumnOrdering::Range => "RANGE",
        },
        ordering: options.ordering,
        wide,
        values,
    };

    let mut h = table_header(&column)?;
    h.string("MOCDIM", dim.name())?;
    h.string("ORDERING", options.ordering.keyword())?;
    h.string(dim.system_keyword(), moc.system())?;
    h.integer(dim.order_keyword(), i64::from(moc.moc_order()));
    if dim == Dimension::Space {
        h.integer("MOCORDER", i64::from(moc.moc_order()));
        h.string("PIXTYPE", "HEALPIX")?;
    }
    assemble(&column, h, moc.property_map())
}

/// Encode a space-time map as a `RANGE` table. Runs of segments sharing one
/// sky are written as a single block of time pairs.
pub fn encode_stmoc(st: &StMoc) -> Result<Vec<u8>> {
    let segments = st.segments();
    let mut values = Vec::new();
    let mut i = 0;
    while i < segments.len() {
        let space = &segments[i].space;
        let mut j = i;
        while j < segments.len() && segments[j].space == *space {
            values.push(-1 - to_i64(segments[j].time.start)?);
            values.push(-1 - to_i64(segments[j].time.end)?);
            j += 1;
        }
        for iv in space {
            values.push(to_i64(iv.start)?);
            values.push(to_i64(iv.end)?);
        }
        i = j;
    }
    let column = Column {
        name: "RANGE",
        ordering: ColumnOrdering::Range,
        wide: true,
        values,
    };

    let mut h = table_header(&column)?;
    h.string("MOCDIM", "TIME.SPACE")?;
    h.string("ORDERING", ColumnOrdering::Range.keyword())?;
    h.string("COORDSYS", st.space_system())?;
    h.string("TIMESYS", st.time_system())?;
    h.integer("MOCORD_T", i64::from(st.time_order()));
    h.integer("MOCORD_S", i64::from(st.space_order()));
    assemble(&column, h, st.property_map())
}

#[cfg(test)]
mod tests {
    use super::super::card::{read_header, BLOCK_SIZE, CARD_SIZE};
    use super::super::{decode, Decoded};
    use super::*;
    use crate::io::Format;

    fn card_text(bytes: &[u8], index: usize) -> &str {
        std::str::from_utf8(&bytes[index * CARD_SIZE..(index + 1) * CARD_SIZE])
            .unwrap()
            .trim_end()
    }

    #[test]
    fn header_layout() {
        let moc = Moc::parse(Dimension::Space, "3/1 3 10 4/16-18 22").unwrap();
        let bytes = encode_moc(&moc, &WriteOptions::default()).unwrap();
        assert_eq!(bytes.len(), 3 * BLOCK_SIZE);

        assert_eq!(card_text(&bytes, 0), "SIMPLE  =                    T");
        assert_eq!(card_text(&bytes, 4), "END");

        let ext = &bytes[BLOCK_SIZE..];
        let keys: Vec<&str> = (0..17)
            .map(|i| card_text(ext, i).get(..8).unwrap_or("END").trim_end())
            .collect();
        assert_eq!(
            keys,
            [
                "XTENSION", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "PCOUNT", "GCOUNT", "TFIELDS",
                "TTYPE1", "TFORM1", "MOCVERS", "MOCDIM", "ORDERING", "COORDSYS", "MOCORD_S",
                "MOCORDER", "PIXTYPE",
            ]
        );
        assert_eq!(card_text(ext, 3), "NAXIS1  =                    4");
        assert_eq!(card_text(ext, 4), "NAXIS2  =                    7");
        assert_eq!(card_text(ext, 9), "TFORM1  = '1J      '");
        assert_eq!(card_text(ext, 11), "MOCDIM  = 'SPACE   '");
        assert_eq!(card_text(ext, 17), "END");
    }

    #[test]
    fn nuniq_data_is_big_endian() {
        let moc = Moc::parse(Dimension::Space, "0/4").unwrap();
        let bytes = encode_moc(&moc, &WriteOptions::default()).unwrap();
        let data = &bytes[2 * BLOCK_SIZE..];
        // uniq = 4 + 4
        assert_eq!(&data[..4], &[0, 0, 0, 8]);
        assert!(data[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn wide_column_when_values_overflow_i32() {
        let moc = Moc::parse(Dimension::Space, "29/0").unwrap();
        let bytes = encode_moc(&moc, &WriteOptions::default()).unwrap();
        let (cards, _) = read_header(&bytes, BLOCK_SIZE).unwrap();
        let form = cards.iter().find(|c| c.keyword == "TFORM1").unwrap();
        assert_eq!(form.as_str(), Some("1K"));

        let small = Moc::parse(Dimension::Space, "3/1").unwrap();
        let bytes = encode_moc(&small, &WriteOptions::default().with_64bit(true)).unwrap();
        let (cards, _) = read_header(&bytes, BLOCK_SIZE).unwrap();
        let naxis1 = cards.iter().find(|c| c.keyword == "NAXIS1").unwrap();
        assert_eq!(naxis1.as_int(), Some(8));
    }

    #[test]
    fn round_trips_through_decode() {
        for ordering in [ColumnOrdering::Nuniq, ColumnOrdering::Range] {
            let mut moc = Moc::parse(Dimension::Space, "3/1 3 10 4/16-18 22 9/").unwrap();
            moc.set_property("MOCTOOL", "celestial-moc").unwrap();
            let opts = WriteOptions::new(Format::Fits).with_ordering(ordering);
            let bytes = encode_moc(&moc, &opts).unwrap();
            let back = decode(&bytes).unwrap().into_moc().unwrap();
            assert_eq!(back, moc);
            assert_eq!(back.moc_order(), 9);
            assert_eq!(back.property("MOCTOOL"), Some("celestial-moc"));
        }
    }

    #[test]
    fn time_maps_use_time_keywords() {
        let moc = Moc::parse(Dimension::Time, "t10/5-9").unwrap();
        let bytes = encode_moc(&moc, &WriteOptions::default()).unwrap();
        let (cards, _) = read_header(&bytes, BLOCK_SIZE).unwrap();
        assert!(cards.iter().any(|c| c.keyword == "TIMESYS" && c.as_str() == Some("TCB")));
        assert!(cards.iter().any(|c| c.keyword == "MOCORD_T" && c.as_int() == Some(10)));
        assert!(!cards.iter().any(|c| c.keyword == "PIXTYPE"));
        let back = decode(&bytes).unwrap();
        assert!(matches!(back, Decoded::Moc(ref m) if m.dimension() == Dimension::Time));
        assert_eq!(back.into_moc().unwrap(), moc);
    }

    #[test]
    fn space_time_round_trip() {
        let st = StMoc::parse("t1/0 s3/1-2 t2/3 s4/0").unwrap();
        let bytes = encode_stmoc(&st).unwrap();
        let back = decode(&bytes).unwrap().into_stmoc().unwrap();
        assert_eq!(back, st);
        assert_eq!(back.time_order(), st.time_order());
        assert_eq!(back.space_order(), st.space_order());
        assert!(decode(&bytes).unwrap().into_moc().is_err());
    }

    #[test]
    fn empty_space_time_map() {
        let bytes = encode_stmoc(&StMoc::new()).unwrap();
        let (cards, _) = read_header(&bytes, BLOCK_SIZE).unwrap();
        assert!(cards.iter().any(|c| c.keyword == "NAXIS2" && c.as_int() == Some(0)));
        assert!(decode(&bytes).unwrap().into_stmoc().unwrap().is_empty());
    }

    #[test]
    fn huge_row_count_is_rejected() {
        let moc = Moc::parse(Dimension::Space, "3/1 3 10").unwrap();
        let mut bytes = encode_moc(&moc, &WriteOptions::default().with_64bit(true)).unwrap();
        let index = (0..36)
            .find(|&i| card_text(&bytes[BLOCK_SIZE..], i).starts_with("NAXIS2"))
            .unwrap();
        let at = BLOCK_SIZE + index * CARD_SIZE;
        let card = format!("{:<8}= {:>20}", "NAXIS2", (usize::MAX / 8).to_string());
        bytes[at..at + card.len()].copy_from_slice(card.as_bytes());
        assert!(decode(&bytes).is_err());
    }
}
