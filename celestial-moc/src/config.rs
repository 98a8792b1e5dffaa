//! Options for the serializers and the conformance checker.

use crate::io::Format;

/// Column layout of the FITS binary table for single-dimension maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ColumnOrdering {
    /// One `UNIQ` value per cell.
    #[default]
    Nuniq,
    /// Flat `[start, end)` pairs.
    Range,
}

impl ColumnOrdering {
    /// Value of the `ORDERING` keyword.
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Nuniq => "NUNIQ",
            Self::Range => "RANGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WriteOptions {
    pub format: Format,
    pub ordering: ColumnOrdering,
    /// Always write 64-bit `1K` columns, even when every value fits `1J`.
    pub force_64bit: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            format: Format::Fits,
            ordering: ColumnOrdering::Nuniq,
            force_64bit: false,
        }
    }
}

impl WriteOptions {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn with_ordering(mut self, ordering: ColumnOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_64bit(mut self, force: bool) -> Self {
        self.force_64bit = force;
        self
    }
}

/// Revision of the IVOA MOC recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MocVersion {
    V1_0,
    V1_1,
    V2_0,
}

impl MocVersion {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "1.0" | "1" => Some(Self::V1_0),
            "1.1" => Some(Self::V1_1),
            "2.0" | "2" => Some(Self::V2_0),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1_0 => "1.0",
            Self::V1_1 => "1.1",
            Self::V2_0 => "2.0",
        }
    }

    /// 1.0 and 1.1 only know space maps stored as NUNIQ.
    pub const fn is_legacy(self) -> bool {
        !matches!(self, Self::V2_0)
    }
}

impl std::fmt::Display for MocVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LintConfig {
    /// Errors reported before the checker gives up.
    pub max_errors: usize,
    /// Check against this revision instead of the one the file declares.
    pub version: Option<MocVersion>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            max_errors: 20,
            version: None,
        }
    }
}

impl LintConfig {
    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors.max(1);
        self
    }

    pub fn with_version(mut self, version: MocVersion) -> Self {
        self.version = Some(version);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let w = WriteOptions::default();
        assert_eq!(w.format, Format::Fits);
        assert_eq!(w.ordering, ColumnOrdering::Nuniq);
        assert!(!w.force_64bit);
        assert_eq!(LintConfig::default().max_errors, 20);
    }

    #[test]
    fn builders() {
        let w = WriteOptions::new(Format::Json)
            .with_ordering(ColumnOrdering::Range)
            .with_64bit(true);
        assert_eq!(w.format, Format::Json);
        assert_eq!(w.ordering.keyword(), "RANGE");
        assert!(w.force_64bit);

        let l = LintConfig::default()
            .with_max_errors(0)
            .with_version(MocVersion::V1_1);
        assert_eq!(l.max_errors, 1);
        assert_eq!(l.version, Some(MocVersion::V1_1));
    }

    #[test]
    fn version_parse() {
        assert_eq!(MocVersion::parse("2.0"), Some(MocVersion::V2_0));
        assert_eq!(MocVersion::parse(" 1.1 "), Some(MocVersion::V1_1));
        assert_eq!(MocVersion::parse("3.0"), None);
        assert!(MocVersion::V1_0.is_legacy());
        assert!(!MocVersion::V2_0.is_legacy());
        assert!(MocVersion::V1_0 < MocVersion::V2_0);
    }
}
