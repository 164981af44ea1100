use std::fmt;

/// Errors surfaced by the forest core. Every failure is reported
/// synchronously from the triggering call; nothing is retried internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForestError {
    /// builder-time contradiction, e.g. dimensions not divisible by shingle size
    InvalidConfiguration { msg: &'static str },
    /// runtime vector length does not match the configured dimensions
    DimensionMismatch { msg: &'static str },
    /// store or sampler index outside `[0, capacity)` or freed
    InvalidIndex { msg: &'static str },
    /// add beyond capacity when no compaction can reclaim
    Capacity { msg: &'static str },
    /// structural invariant violated (heap property, mass accounting, double free)
    IllegalState { msg: &'static str },
    /// query before the minimum number of warm-up observations
    NotReady { msg: &'static str },
}

impl ForestError {
    pub fn message(&self) -> &'static str {
        match self {
            ForestError::InvalidConfiguration { msg } => msg,
            ForestError::DimensionMismatch { msg } => msg,
            ForestError::InvalidIndex { msg } => msg,
            ForestError::Capacity { msg } => msg,
            ForestError::IllegalState { msg } => msg,
            ForestError::NotReady { msg } => msg,
        }
    }
}

impl fmt::Display for ForestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForestError::InvalidConfiguration { msg } => {
                write!(f, "invalid configuration: {}", msg)
            }
            ForestError::DimensionMismatch { msg } => write!(f, "dimension mismatch: {}", msg),
            ForestError::InvalidIndex { msg } => write!(f, "invalid index: {}", msg),
            ForestError::Capacity { msg } => write!(f, "capacity exceeded: {}", msg),
            ForestError::IllegalState { msg } => write!(f, "illegal state: {}", msg),
            ForestError::NotReady { msg } => write!(f, "not ready: {}", msg),
        }
    }
}

impl std::error::Error for ForestError {}
