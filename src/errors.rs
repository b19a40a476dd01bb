use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failures that can come out of the processing stages. Any of these aborts a pipeline run, with
/// the exception of `DegenerateMesh` coming from a single cluster, which only means that cluster
/// cannot intersect anything.
#[derive(Debug, Clone, PartialEq)]
pub enum CloudError {
    /// The input file could not be read or parsed, or held no points.
    UnreadableCloud { reason: String },

    /// An index selection referred to a point that does not exist.
    IndexOutOfRange { index: usize, len: usize },

    /// A stage needs more points than it was given.
    InsufficientPoints {
        stage: &'static str,
        required: usize,
        actual: usize,
    },

    /// Mesh reconstruction produced no usable geometry.
    DegenerateMesh { reason: String },

    /// A parameter was outside of its documented range.
    InvalidParameter { name: &'static str, reason: String },

    /// Every RANSAC sample was degenerate, so no plane could be scored.
    PlaneNotFound { iterations: usize },

    /// Parallel data (colors, merged clouds) did not line up with the points.
    InconsistentData { reason: String },
}

impl CloudError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn unreadable(reason: impl Into<String>) -> Self {
        Self::UnreadableCloud {
            reason: reason.into(),
        }
    }

    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateMesh {
            reason: reason.into(),
        }
    }
}

impl Display for CloudError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnreadableCloud { reason } => write!(f, "unreadable point cloud: {reason}"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} is out of range for a cloud of {len} points")
            }
            Self::InsufficientPoints {
                stage,
                required,
                actual,
            } => write!(
                f,
                "not enough data for {stage}: need at least {required} points, got {actual}; \
                 adjust the upstream filters"
            ),
            Self::DegenerateMesh { reason } => write!(f, "degenerate mesh: {reason}"),
            Self::InvalidParameter { name, reason } => {
                write!(f, "invalid parameter '{name}': {reason}")
            }
            Self::PlaneNotFound { iterations } => write!(
                f,
                "no plane could be fit in {iterations} iterations, all samples were degenerate"
            ),
            Self::InconsistentData { reason } => write!(f, "inconsistent data: {reason}"),
        }
    }
}

impl Error for CloudError {}

impl From<std::io::Error> for CloudError {
    fn from(err: std::io::Error) -> Self {
        Self::UnreadableCloud {
            reason: err.to_string(),
        }
    }
}
