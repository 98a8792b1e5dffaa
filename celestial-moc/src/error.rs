//! Error types for coverage-map construction, algebra and serialization.
//!
//! Every fallible operation in the crate returns [`Result<T>`], which is
//! `Result<T, MocError>`. Operations either fully commit or fail before the
//! receiver is touched, so an `Err` never leaves a half-updated map behind.
//!
//! # Error Categories
//!
//! | Variant | Raised by | Meaning |
//! |---------|-----------|---------|
//! | [`Format`](MocError::Format) | FITS reader | Malformed container: truncated table, bad alignment, missing keyword |
//! | [`Parse`](MocError::Parse) | ASCII/JSON readers | Unparsable token or structure |
//! | [`InvalidOrder`](MocError::InvalidOrder) | insertion, degradation | Order above the dimension's maximum |
//! | [`OutOfRange`](MocError::OutOfRange) | insertion, decoding | Cell index outside the domain at its order |
//! | [`InvalidCoordinate`](MocError::InvalidCoordinate) | position/time insertion | Longitude, latitude or date outside its domain |
//! | [`IncompatibleSystem`](MocError::IncompatibleSystem) | algebra | Operands tagged with different reference systems |
//! | [`DimensionMismatch`](MocError::DimensionMismatch) | algebra, typed insertion | Space map combined with a time map |
//! | [`ReservedProperty`](MocError::ReservedProperty) / [`InvalidProperty`](MocError::InvalidProperty) | metadata | Keyword owned by the codec, or not representable in a FITS card |
//!
//! Conformance deviations found by [`crate::lint`] are reported as
//! diagnostics and never surface as a `MocError`.

use crate::dim::Dimension;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MocError {
    /// Structurally invalid binary container.
    #[error("invalid MOC container: {0}")]
    Format(String),

    /// Unparsable textual input. `position` is a byte offset into the text.
    #[error("parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("order {order} exceeds the maximum order {max}")]
    InvalidOrder { order: u8, max: u8 },

    #[error("cell {value} is outside the domain at order {order} (max {max})")]
    OutOfRange { order: u8, value: u64, max: u64 },

    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("incompatible reference systems: {left} vs {right}")]
    IncompatibleSystem { left: String, right: String },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: Dimension,
        actual: Dimension,
    },

    #[error("property {0} is managed by the MOC codec and cannot be set")]
    ReservedProperty(String),

    #[error("invalid property {key}: {reason}")]
    InvalidProperty { key: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MocError>;

impl MocError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        Self::Format(reason.into())
    }

    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_property(key: &str, reason: &str) -> Self {
        Self::InvalidProperty {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` for errors caused by malformed serialized input.
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::Format(_) | Self::Parse { .. } | Self::Json(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_display() {
        let err = MocError::format("missing END card");
        assert_eq!(err.to_string(), "invalid MOC container: missing END card");
    }

    #[test]
    fn parse_error_carries_position() {
        let err = MocError::parse(7, "expected a cell number");
        assert_eq!(
            err.to_string(),
            "parse error at byte 7: expected a cell number"
        );
    }

    #[test]
    fn out_of_range_display() {
        let err = MocError::OutOfRange {
            order: 0,
            value: 12,
            max: 11,
        };
        assert!(err.to_string().contains("cell 12"));
        assert!(err.to_string().contains("order 0"));
    }

    #[test]
    fn dimension_mismatch_display() {
        let err = MocError::DimensionMismatch {
            expected: Dimension::Space,
            actual: Dimension::Time,
        };
        assert_eq!(
            err.to_string(),
            "dimension mismatch: expected SPACE, got TIME"
        );
    }

    #[test]
    fn io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: MocError = io.into();
        assert!(matches!(err, MocError::Io(_)));
        assert!(!err.is_format_error());
    }

    #[test]
    fn format_errors_are_classified() {
        assert!(MocError::format("x").is_format_error());
        assert!(MocError::parse(0, "x").is_format_error());
        assert!(!MocError::ReservedProperty("MOCDIM".into()).is_format_error());
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MocError>();
    }
}
