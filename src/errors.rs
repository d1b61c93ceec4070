//! Error types for the RFA pipeline.
//!
//! Every failure is fatal to a run: stages return `Result` and the builder
//! stops at the first error, never handing back a partial matrix.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by loading, graph construction and the RFA solve.
#[derive(Debug, Error)]
pub enum RfaError {
    /// Missing or malformed input data.
    #[error("Data format error in {path:?}: {message}")]
    DataFormat {
        /// File or directory the problem was found in
        path: PathBuf,
        /// What is wrong with it
        message: String,
    },

    /// Reading an input file or directory failed.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The requested local metric cannot be used with the chosen mode.
    #[error("Invalid metric '{metric}' for {mode} mode")]
    InvalidMetric {
        metric: String,
        mode: String,
    },

    /// A numeric parameter is out of range.
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// The graph is degenerate (no nodes, or sizes that do not line up).
    #[error("Disconnected input: {message}")]
    DisconnectedInput { message: String },

    /// `L + I` could not be inverted, even after the ridge fallback.
    #[error("Singular matrix ({n}x{n}): {reason}")]
    SingularMatrix { n: usize, reason: String },
}

impl RfaError {
    pub fn data_format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DataFormat {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_metric(metric: impl Into<String>, mode: impl Into<String>) -> Self {
        Self::InvalidMetric {
            metric: metric.into(),
            mode: mode.into(),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::DisconnectedInput {
            message: message.into(),
        }
    }

    pub fn singular(n: usize, reason: impl Into<String>) -> Self {
        Self::SingularMatrix {
            n,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RfaError>;
