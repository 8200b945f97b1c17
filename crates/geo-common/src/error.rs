//! Error types for geocoding construction and fitting.

use thiserror::Error;

/// Result type alias using GeoCodingError.
pub type Result<T> = std::result::Result<T, GeoCodingError>;

/// Failure of a least-squares polynomial fit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("not enough points for fit: need {required}, got {actual}")]
    TooFewPoints { required: usize, actual: usize },

    #[error("fit input contains non-finite values")]
    NonFinite,

    #[error("design matrix is rank deficient (rank {rank} of {terms})")]
    RankDeficient { rank: usize, terms: usize },

    #[error("least-squares solve failed: {0}")]
    Solve(String),
}

/// Primary error type for geocoding operations.
///
/// Lookups never produce errors: positions outside a coding's coverage come
/// back as NaN. Errors are only raised when a coding cannot be built.
#[derive(Debug, Error)]
pub enum GeoCodingError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("fit error: {0}")]
    Fit(#[from] FitError),

    #[error("unsupported subset: {0}")]
    UnsupportedSubset(String),

    #[error("invalid configuration value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },
}

impl GeoCodingError {
    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an UnsupportedSubset error.
    pub fn unsupported_subset(msg: impl Into<String>) -> Self {
        Self::UnsupportedSubset(msg.into())
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// True for errors raised while validating construction input.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GeoCodingError::Configuration(_) | GeoCodingError::InvalidParameter { .. }
        )
    }
}

impl From<serde_json::Error> for GeoCodingError {
    fn from(err: serde_json::Error) -> Self {
        GeoCodingError::Configuration(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_error_converts() {
        let err: GeoCodingError = FitError::RankDeficient { rank: 2, terms: 3 }.into();
        assert!(matches!(err, GeoCodingError::Fit(_)));
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("rank 2 of 3"));
    }

    #[test]
    fn test_configuration_helpers() {
        assert!(GeoCodingError::configuration("grids differ").is_configuration());
        assert!(GeoCodingError::invalid_parameter("x", "bad").is_configuration());
    }
}
