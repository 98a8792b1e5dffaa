//! Conformance checker for serialized coverage maps.
//!
//! The checker re-reads a FITS, ASCII or JSON stream on its own terms rather
//! than through the codecs, so it can keep going past the first problem and
//! report everything it finds. Rules follow the IVOA MOC recommendation in
//! its three revisions:
//!
//! | Version | Adds |
//! |---------|------|
//! | 1.0 | `NUNIQ` space maps, `MOCORDER`, `PIXTYPE = 'HEALPIX'`, `COORDSYS = 'C'` |
//! | 1.1 | `MOCVERS` |
//! | 2.0 | `MOCDIM`, `MOCORD_S` / `MOCORD_T`, `TIMESYS`, `RANGE` tables, space-time maps |
//!
//! Malformed input never produces an `Err`: every deviation becomes a
//! [`Diagnostic`], and the checker stops early once
//! [`LintConfig::max_errors`] errors have been reported.
//!
//! ```
//! use celestial_moc::{lint, LintConfig};
//!
//! let report = lint::lint_bytes(b"3/1 3 10 4/16-18", &LintConfig::default());
//! assert_eq!(report.status(), lint::LintStatus::Ok);
//! ```

mod cells;
mod fits;
mod text;

use crate::config::{LintConfig, MocVersion};
use crate::error::Result;
use crate::io::{self, Format};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    /// Where the problem was found: a header card, a table row, a byte offset.
    pub location: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<7} {}: {}", self.level, self.location, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintStatus {
    Ok,
    Warning,
    Error,
}

/// Which kind of map the stream claims to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    Space,
    Time,
    SpaceTime,
}

impl fmt::Display for MapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MapKind::Space => "space",
            MapKind::Time => "time",
            MapKind::SpaceTime => "space-time",
        })
    }
}

#[derive(Debug, Clone)]
pub struct LintReport {
    pub format: Format,
    pub version: Option<MocVersion>,
    pub kind: Option<MapKind>,
    pub diagnostics: Vec<Diagnostic>,
    /// The checker gave up after reaching the error cap.
    pub truncated: bool,
}

impl LintReport {
    pub fn status(&self) -> LintStatus {
        match self.diagnostics.iter().map(|d| d.level).max() {
            Some(Level::Error) => LintStatus::Error,
            Some(Level::Warning) => LintStatus::Warning,
            _ => LintStatus::Ok,
        }
    }

    pub fn count(&self, level: Level) -> usize {
        self.diagnostics.iter().filter(|d| d.level == level).count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.level == Level::Error)
    }
}

impl fmt::Display for LintReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.diagnostics {
            writeln!(f, "{d}")?;
        }
        let status = match self.status() {
            LintStatus::Ok => "OK",
            LintStatus::Warning => "OK with warnings",
            LintStatus::Error => "ERROR",
        };
        write!(f, "{} MOC", self.format.name().to_uppercase())?;
        if let Some(version) = self.version {
            write!(f, " {version}")?;
        }
        if let Some(kind) = self.kind {
            write!(f, " ({kind})")?;
        }
        write!(
            f,
            ": {status}, {} error(s), {} warning(s)",
            self.count(Level::Error),
            self.count(Level::Warning)
        )?;
        if self.truncated {
            f.write_str(", stopped after too many errors")?;
        }
        Ok(())
    }
}

/// Raised through the rule functions with `?` once the error cap is hit.
#[derive(Debug)]
pub(crate) struct TooManyErrors;

pub(crate) type Flow = std::result::Result<(), TooManyErrors>;

pub(crate) struct Collector {
    diagnostics: Vec<Diagnostic>,
    errors: usize,
    max_errors: usize,
}

impl Collector {
    fn new(config: &LintConfig) -> Self {
        Self {
            diagnostics: Vec::new(),
            errors: 0,
            max_errors: config.max_errors.max(1),
        }
    }

    pub(crate) fn info(&mut self, location: impl fmt::Display, message: impl Into<String>) {
        self.push(Level::Info, location, message);
    }

    pub(crate) fn warn(&mut self, location: impl fmt::Display, message: impl Into<String>) {
        self.push(Level::Warning, location, message);
    }

    pub(crate) fn error(&mut self, location: impl fmt::Display, message: impl Into<String>) -> Flow {
        self.push(Level::Error, location, message);
        self.errors += 1;
        if self.errors >= self.max_errors {
            return Err(TooManyErrors);
        }
        Ok(())
    }

    fn push(&mut self, level: Level, location: impl fmt::Display, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            level,
            location: location.to_string(),
            message: message.into(),
        });
    }
}

/// Findings of one format-specific pass.
pub(crate) struct Findings {
    pub version: Option<MocVersion>,
    pub kind: Option<MapKind>,
}

/// Check an in-memory stream. The format is detected from its first bytes.
pub fn lint_bytes(bytes: &[u8], config: &LintConfig) -> LintReport {
    let format = Format::detect(bytes);
    let mut out = Collector::new(config);
    let mut findings = Findings {
        version: config.version,
        kind: None,
    };
    let flow = match format {
        Format::Fits => fits::check(bytes, &mut out, &mut findings),
        Format::Ascii | Format::Json => match std::str::from_utf8(bytes) {
            Ok(text) if format == Format::Json => text::check_json(text, &mut out, &mut findings),
            Ok(text) => text::check_ascii(text, &mut out, &mut findings),
            Err(e) => out.error(
                format_args!("byte {}", e.valid_up_to()),
                "text MOC is not valid UTF-8",
            ),
        },
    };
    let truncated = flow.is_err();
    if truncated {
        out.push(
            Level::Error,
            "checker",
            format!("too many errors ({}), giving up", out.errors),
        );
    }
    tracing::debug!(
        %format,
        diagnostics = out.diagnostics.len(),
        errors = out.errors,
        truncated,
        "conformance check finished"
    );
    LintReport {
        format,
        version: findings.version,
        kind: findings.kind,
        diagnostics: out.diagnostics,
        truncated,
    }
}

/// Check a file. Only failing to read the file is an `Err`.
pub fn lint_path(path: impl AsRef<Path>, config: &LintConfig) -> Result<LintReport> {
    io::with_file_bytes(path, |bytes| Ok(lint_bytes(bytes, config)))
}
