use std::path::PathBuf;

use thiserror::Error;

/// Error type for every fallible step of an experiment run.
#[derive(Error, Debug)]
pub enum ExperimentError {
    /// I/O operation error on a specific file.
    #[error("I/O error on `{path}`: {source}")]
    Io {
        /// File that was being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The dataset files exist but do not follow the expected layout.
    #[error("malformed dataset: {0}")]
    MalformedDataset(String),

    /// A model artifact was requested but is not on disk.
    #[error("model artifact `{0}` does not exist")]
    ArtifactMissing(PathBuf),

    /// A model artifact exists but cannot be decoded.
    #[error("model artifact `{path}` is unreadable: {reason}")]
    ArtifactCorrupt {
        /// Artifact location.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// Samples do not have the shape the model was built for.
    #[error("shape mismatch: expected {expected:?}, got {found:?}")]
    ShapeMismatch {
        /// Shape the consumer expects.
        expected: Vec<usize>,
        /// Shape that was provided.
        found: Vec<usize>,
    },

    /// A plot or image grid could not be drawn or encoded.
    #[error("failed to render `{path}`: {reason}")]
    Render {
        /// Output image path.
        path: PathBuf,
        /// Renderer message.
        reason: String,
    },

    /// The experiment configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ExperimentError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ExperimentError>;
