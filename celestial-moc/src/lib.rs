//! Multi-Order Coverage maps (MOC) over the sky, time and space-time.
//!
//! A MOC describes a region as a set of cells from a hierarchical
//! tessellation: HEALPix nested cells on the sky, power-of-two microsecond
//! intervals in time. Internally every map is a sorted list of disjoint
//! intervals over the finest-order index space, so union, intersection and
//! friends are linear merges regardless of how many orders are mixed.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`dim`] | [`Dimension`] (space/time), cell ↔ flat index mapping, UNIQ encoding |
//! | [`ranges`] | [`RangeSet`] canonical interval store, set algebra, degradation, [`Logic`] |
//! | [`moc`] | [`Moc`]: a single-dimension map with order bookkeeping and metadata |
//! | [`stmoc`] | [`StMoc`]: time segments each carrying a sky coverage |
//! | [`hpx`] | Longitude/latitude → HEALPix nested cell |
//! | [`time`] | Julian Date ↔ time cell |
//! | [`io`] | FITS, ASCII and JSON codecs, format detection |
//! | [`lint`] | Conformance checker for serialized maps |
//! | [`config`] | [`WriteOptions`], [`LintConfig`] |
//!
//! # Quick Start
//!
//! ```
//! use celestial_moc::{Dimension, Moc};
//!
//! let mut a = Moc::parse(Dimension::Space, "3/1 3 10 4/16-18")?;
//! let b: Moc = "3/3-4".parse()?;
//! let both = a.intersection(&b)?;
//! assert_eq!(both.to_string(), "3/3 4/16-18");
//!
//! a.add_position(8, 83.633, -5.375)?;
//! assert!(a.contains_position(83.633, -5.375)?);
//! # Ok::<(), celestial_moc::MocError>(())
//! ```
//!
//! # Resolution
//!
//! Every map carries a `moc_order`, the finest order it claims to resolve.
//! [`Logic`] decides what happens when orders differ. Under `Max` (the
//! default) operations run at the finer of the two orders and degradation
//! keeps partly covered cells. Under `Min` the finer operand is first
//! degraded to the coarser order and partly covered cells are dropped.
//!
//! # Features
//!
//! - **`serde`**: `Serialize`/`Deserialize` for the option and enum types.
//! - **`cli`**: the `moc` and `moc-lint` binaries.

pub mod config;
pub mod dim;
pub mod error;
pub mod hpx;
pub mod io;
pub mod lint;
pub mod moc;
pub mod ranges;
pub mod stmoc;
pub mod time;

pub use config::{ColumnOrdering, LintConfig, MocVersion, WriteOptions};
pub use dim::{Cell, Dimension};
pub use error::{MocError, Result};
pub use io::fits::Decoded;
pub use io::Format;
pub use lint::{LintReport, LintStatus};
pub use moc::Moc;
pub use ranges::{Interval, Logic, RangeSet};
pub use stmoc::{StMoc, StSegment};
