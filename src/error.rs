use crate::pose::Landmark;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("frame dimension mismatch: expected {expected} values per frame, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("frame {frame} has {actual} values, expected {expected}")]
    RaggedFrame {
        frame: usize,
        expected: usize,
        actual: usize,
    },

    #[error("joint group {group:?} refers to dimension {index}, but frames only have {dim}")]
    IndexOutOfRange {
        group: String,
        index: usize,
        dim: usize,
    },

    #[error("score setting {field} must be {expected}, got {value}")]
    InvalidScoreConfig {
        field: &'static str,
        expected: &'static str,
        value: f64,
    },

    #[error("landmark {0:?} is not part of the {1:?} layout")]
    LandmarkNotInLayout(Landmark, crate::pose::Layout),

    #[error("failed to convert landmark variant to usize: {0:?}")]
    LandmarkVariantToUSize(Landmark),

    #[error("failed to construct NotNan from f64: {1}")]
    ConstructNotNan(#[source] ordered_float::FloatIsNan, f64),

    #[error("failed to convert value to f64")]
    ConvertToF64,

    #[error("failed to construct pose sequence from frames")]
    ConstructSequence(#[source] ndarray::ShapeError),

    #[error("failed to read pose sequence file: {1:?}")]
    ReadSequence(#[source] std::io::Error, PathBuf),

    #[error("failed to parse pose sequence file: {1:?}")]
    ParseSequence(#[source] serde_json::Error, PathBuf),

    #[error("failed to parse pose sequence")]
    ParseJson(#[source] serde_json::Error),

    #[error("text generation with {0} failed: {1}")]
    TextGeneration(&'static str, String),

    #[error("text generation with {0} returned no content")]
    EmptyTextGeneration(&'static str),

    #[cfg(feature = "remote")]
    #[error("request to {1} failed")]
    Request(#[source] reqwest::Error, &'static str),
}

impl Error {
    /// Whether the inputs do not fit the configured keypoint layout. Such
    /// errors apply to every comparison of a run, not just one input.
    pub fn is_layout_mismatch(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. }
                | Self::IndexOutOfRange { .. }
                | Self::LandmarkNotInLayout(..)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fail unless both widths are equal.
pub(crate) fn check_dim(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        Err(Error::DimensionMismatch { expected, actual })
    } else {
        Ok(())
    }
}
