//! Serialization codecs.
//!
//! Three interchangeable representations of a coverage map:
//!
//! - **FITS** ([`fits`]): binary table inside a FITS file, the IVOA exchange
//!   format. Bit-exact, carries free-form metadata.
//! - **ASCII** ([`ascii`]): `3/1 3 10 4/16-18` style text.
//! - **JSON** ([`json`]): `{"3":[1,3,10],"4":[16,17,18]}`.
//!
//! [`Format::detect`] picks the codec from the first bytes of a stream, so
//! readers never need to be told what they are given.

pub mod ascii;
pub mod fits;
pub mod json;

use crate::error::{MocError, Result};
use crate::moc::Moc;
use crate::ranges::{Interval, RangeSet};
use crate::stmoc::StMoc;
use fits::Decoded;
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Format {
    Fits,
    Ascii,
    Json,
}

impl Format {
    /// Sniff the format from the start of a stream.
    ///
    /// A FITS file always opens with the `SIMPLE` card. JSON opens with an
    /// object or array once leading whitespace is skipped. Anything else is
    /// taken as ASCII.
    pub fn detect(bytes: &[u8]) -> Format {
        if bytes.starts_with(b"SIMPLE") {
            return Format::Fits;
        }
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') | Some(b'[') => Format::Json,
            _ => Format::Ascii,
        }
    }

    /// Guess the format from a file extension.
    pub fn from_extension(path: impl AsRef<Path>) -> Option<Format> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "fits" | "fit" | "fts" => Some(Format::Fits),
            "json" => Some(Format::Json),
            "txt" | "ascii" | "moc" => Some(Format::Ascii),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Format::Fits => "fits",
            Format::Ascii => "ascii",
            Format::Json => "json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = MocError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fits" => Ok(Format::Fits),
            "ascii" | "text" | "txt" => Ok(Format::Ascii),
            "json" => Ok(Format::Json),
            other => Err(MocError::parse(0, format!("unknown format '{other}'"))),
        }
    }
}

/// Decode a map of whichever kind the stream holds.
///
/// FITS files say what they hold. Text is a space-time map when it is a JSON
/// array or carries an `s` prefix, a time map when it opens with `t`, and a
/// space map otherwise.
pub fn decode_any(bytes: &[u8]) -> Result<Decoded> {
    if Format::detect(bytes) == Format::Fits {
        return fits::decode(bytes);
    }
    let text = as_text(bytes)?;
    if text.trim_start().starts_with('[') || text.contains('s') {
        Ok(Decoded::StMoc(StMoc::parse(text)?))
    } else {
        Ok(Decoded::Moc(text.parse::<Moc>()?))
    }
}

pub fn read_any(path: impl AsRef<Path>) -> Result<Decoded> {
    with_file_bytes(path, decode_any)
}

/// Flat intervals read from one textual map, before they touch a [`Moc`].
///
/// [`Moc`]: crate::Moc
#[derive(Debug, Default)]
pub(crate) struct ParsedCells {
    pub ranges: Vec<Interval>,
    /// Deepest order mentioned, including bare `n/` declarations.
    pub deepest: Option<u8>,
}

/// Blocks of (time × space) read from one textual space-time map.
#[derive(Debug, Default)]
pub(crate) struct ParsedBlocks {
    pub blocks: Vec<(RangeSet, RangeSet)>,
    pub time_deepest: Option<u8>,
    pub space_deepest: Option<u8>,
}

pub(crate) fn raise(deepest: &mut Option<u8>, order: u8) {
    *deepest = Some(deepest.map_or(order, |d| d.max(order)));
}

/// Text view of a byte stream, for the textual codecs.
pub(crate) fn as_text(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| {
        MocError::parse(e.valid_up_to(), "input is not valid UTF-8 text")
    })
}

/// Run `f` over the contents of a file, memory-mapped.
pub(crate) fn with_file_bytes<T>(
    path: impl AsRef<Path>,
    f: impl FnOnce(&[u8]) -> Result<T>,
) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return f(&[]);
    }
    // SAFETY: read-only mapping, dropped before return.
    let mmap = unsafe { Mmap::map(&file)? };
    tracing::debug!(path = %path.display(), bytes = mmap.len(), "mapped input file");
    f(&mmap)
}
