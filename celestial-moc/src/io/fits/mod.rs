//! FITS binary-table codec.
//!
//! A MOC file is an empty primary HDU followed by one `BINTABLE` extension
//! with a single integer column:
//!
//! | `ORDERING` | Column | Values |
//! |------------|--------|--------|
//! | `NUNIQ` | `UNIQ`, `1J` or `1K` | one [uniq](crate::Dimension::uniq_encode) id per cell |
//! | `RANGE` | `RANGE`, `1K` | flat `start, end` pairs |
//! | `RANGE` + `MOCDIM='TIME.SPACE'` | `RANGE`, `1K` | per block: time pairs stored as `-1 - t`, then space pairs |
//!
//! Both directions work on whole byte images: the writer builds the file in
//! memory, the reader validates everything before handing back a map.

mod card;
mod reader;
mod writer;

pub use card::{Card, CardValue, BLOCK_SIZE, CARD_SIZE, MAX_VALUE_LEN};
pub use reader::{decode, Decoded};
pub use writer::{encode_moc, encode_stmoc};

pub(crate) use card::{check_keyword, read_header};

use crate::error::{MocError, Result};

/// Keywords describing the FITS structure itself.
pub const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "EXTEND", "XTENSION", "PCOUNT", "GCOUNT",
    "TFIELDS", "TTYPE1", "TFORM1", "END",
];

/// Keywords the codec derives from the map.
pub const MOC_KEYWORDS: &[&str] = &[
    "MOCVERS", "MOCDIM", "ORDERING", "COORDSYS", "TIMESYS", "MOCORD_S", "MOCORD_T", "MOCORDER",
    "PIXTYPE", "COMMENT", "HISTORY",
];

pub fn is_reserved(key: &str) -> bool {
    STRUCTURAL_KEYWORDS.contains(&key) || MOC_KEYWORDS.contains(&key)
}

/// Validate a free-form property for storage in a header card.
pub fn check_property(key: &str, value: &str) -> Result<()> {
    check_keyword(key)?;
    if is_reserved(key) {
        return Err(MocError::ReservedProperty(key.to_string()));
    }
    check_value(key, value)
}

/// Validate a string value for storage in a header card.
pub fn check_value(key: &str, value: &str) -> Result<()> {
    card::check_value(key, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_keywords() {
        for key in ["MOCDIM", "ORDERING", "NAXIS2", "TFORM1", "PIXTYPE", "HISTORY"] {
            assert!(is_reserved(key), "{key}");
        }
        for key in ["MOCTOOL", "DATE", "ORIGIN", "MOCID", "EXTNAME"] {
            assert!(!is_reserved(key), "{key}");
        }
    }

    #[test]
    fn property_checks() {
        assert!(matches!(
            check_property("MOCORD_S", "3"),
            Err(MocError::ReservedProperty(_))
        ));
        assert!(matches!(
            check_property("moctool", "x"),
            Err(MocError::InvalidProperty { .. })
        ));
        assert!(check_property("DATE", "2026-10-17T12:00:00").is_ok());
    }
}
