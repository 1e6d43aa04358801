use thiserror::Error;

/// Result alias used by every fallible operation in the crate
pub type StatsResult<T> = Result<T, StatsError>;

/// Errors raised by the aggregators
///
/// Configuration errors are raised at construction. Contract violations are raised by updates
/// and queries whose preconditions do not hold; in both cases the aggregate is left untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    /// A structural parameter is missing or out of its valid domain
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A named policy (interpolation, transfer function) is not recognised
    #[error("unknown {kind} `{name}`")]
    UnknownType {
        /// Family of the name, e.g. "interpolator"
        kind: &'static str,
        /// The rejected name
        name: String,
    },

    /// More values were removed than the aggregate currently holds
    #[error("cannot remove from empty {0}")]
    EmptyAggregate(&'static str),

    /// An eviction arrived with a timestamp older than a previous eviction
    #[error("eviction at {evicted} precedes previous eviction at {last}")]
    OutOfOrderEviction {
        /// Timestamp of the rejected eviction
        evicted: u64,
        /// Newest eviction timestamp already applied
        last: u64,
    },

    /// A point arrived with a timestamp older than (or equal to, with another value) the newest point
    #[error("point at {timestamp} does not follow newest point at {last}")]
    OutOfOrderPoint {
        /// Timestamp of the rejected point
        timestamp: u64,
        /// Timestamp of the newest accepted point
        last: u64,
    },

    /// Two parallel input slices have different lengths
    #[error("{what}: expected {expected} elements, got {actual}")]
    LengthMismatch {
        /// Which input pair disagreed
        what: &'static str,
        /// Length of the reference slice
        expected: usize,
        /// Length of the offending slice
        actual: usize,
    },

    /// An interpolation was requested outside the retained bracket
    #[error("cannot interpolate at {0}")]
    CannotInterpolate(u64),

    /// A time range query is empty, reversed or wider than the period
    #[error("invalid range [{from}, {to}] for period {period}")]
    InvalidRange {
        /// Range start
        from: u64,
        /// Range end
        to: u64,
        /// Configured period
        period: u64,
    },

    /// A vector has the wrong number of dimensions
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension
        expected: usize,
        /// Offered dimension
        actual: usize,
    },

    /// A NaN value was offered where a number is required
    #[error("NaN value in {0}")]
    NanValue(&'static str),

    /// Persisted state is truncated or malformed
    #[error("corrupt state: {0}")]
    Decode(String),

    /// Persisted state was written by an unknown format version
    #[error("unsupported state version {0}")]
    UnsupportedVersion(u8),

    /// Persisted state belongs to a different aggregate kind
    #[error("state kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        /// Tag of the aggregate being restored
        expected: u8,
        /// Tag found in the blob
        found: u8,
    },
}

impl StatsError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub(crate) fn unknown(kind: &'static str, name: &str) -> Self {
        Self::UnknownType {
            kind,
            name: name.to_string(),
        }
    }
}

impl From<serde_json::Error> for StatsError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
