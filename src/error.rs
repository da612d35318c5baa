use std::path::PathBuf;
use thiserror::Error;

/// The error taxonomy for the inspection engine.
///
/// Most variants are recoverable at the per-image level: the batch runner logs
/// them and moves on to the next image. `ClassifierInput` and `Network` are
/// the exception — they indicate a calibration or configuration bug that no
/// amount of skipping will fix, so they abort the whole batch.
#[derive(Debug, Error)]
pub enum InspectError {
    /// The source image or its companion mask does not exist on disk.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// The file exists but cannot be decoded as an image.
    #[error("could not decode {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Image dimensions are incompatible with the grid, or the source and
    /// mask disagree about their resolution.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// The source and mask produced tile sequences of different lengths.
    #[error("tile count mismatch: {image_tiles} image tiles vs {mask_tiles} mask tiles")]
    ShapeMismatch {
        image_tiles: usize,
        mask_tiles: usize,
    },

    /// The flattened feature vector does not match the network's input size.
    #[error("feature vector length {actual} does not match classifier input length {expected}")]
    ClassifierInput { expected: usize, actual: usize },

    /// The serialized network definition is unreadable or inconsistent.
    #[error("invalid network definition: {0}")]
    Network(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl InspectError {
    /// Whether this error must abort the batch instead of skipping the image.
    ///
    /// A feature-vector length mismatch means the grid configuration and the
    /// trained network disagree — every subsequent image would fail the same
    /// way, so there is nothing to recover per-image.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            InspectError::ClassifierInput { .. } | InspectError::Network(_)
        )
    }
}
