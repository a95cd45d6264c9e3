//! Error types for MEI generation.
//!
//! This module defines the error types shared by every crate of the
//! workspace: tensor shape problems, invalid parameters, strategy lookup
//! failures and persistence errors.

use thiserror::Error;

/// Errors that can occur while building, optimizing or storing MEIs.
#[derive(Debug, Clone, Error)]
pub enum MeiError {
    /// Dimension mismatch between tensors.
    ///
    /// This error occurs when operations involve tensors with incompatible shapes.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensions
        expected: String,
        /// Actual dimensions
        actual: String,
    },

    /// A channel index does not exist in the tensor.
    #[error("Invalid channel {channel}: tensor has {available} channels")]
    InvalidChannel {
        /// Requested channel index
        channel: usize,
        /// Number of channels along axis 1
        available: usize,
    },

    /// A parameter value is outside its valid domain.
    #[error("Invalid parameter: {reason}")]
    InvalidParameter {
        /// Description of why the parameter is invalid
        reason: String,
    },

    /// Numerical instability detected.
    #[error("Numerical instability detected: {reason}")]
    NumericalError {
        /// Description of the numerical issue
        reason: String,
    },

    /// A strategy name could not be resolved by the registry.
    #[error("Unknown {kind} strategy: {name}")]
    UnknownStrategy {
        /// Strategy category (transform, regularization, ...)
        kind: String,
        /// The unresolved name
        name: String,
    },

    /// A user-supplied strategy or model reported a failure.
    #[error("Strategy {name} failed: {reason}")]
    StrategyFailed {
        /// Name of the failing strategy
        name: String,
        /// Description of the failure
        reason: String,
    },

    /// A requested entity does not exist.
    #[error("Not found: {entity}")]
    NotFound {
        /// Description of the missing entity
        entity: String,
    },

    /// An entity with the same primary key already exists.
    #[error("Duplicate entry: {key}")]
    DuplicateEntry {
        /// The duplicated key
        key: String,
    },

    /// Reading or writing a stored artifact failed.
    #[error("Storage error at {path}: {reason}")]
    Storage {
        /// Location of the artifact
        path: String,
        /// Underlying cause
        reason: String,
    },

    /// Encoding or decoding a record failed.
    #[error("Serialization error: {reason}")]
    Serialization {
        /// Underlying cause
        reason: String,
    },

    /// Propagated optimizer error.
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),
}

impl MeiError {
    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch<S1, S2>(expected: S1, actual: S2) -> Self
    where
        S1: std::fmt::Display,
        S2: std::fmt::Display,
    {
        Self::DimensionMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an InvalidParameter error with a custom reason.
    pub fn invalid_parameter<S: Into<String>>(reason: S) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }

    /// Create a NumericalError with a custom reason.
    pub fn numerical_error<S: Into<String>>(reason: S) -> Self {
        Self::NumericalError {
            reason: reason.into(),
        }
    }

    /// Create an UnknownStrategy error.
    pub fn unknown_strategy<S1: Into<String>, S2: Into<String>>(kind: S1, name: S2) -> Self {
        Self::UnknownStrategy {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a StrategyFailed error.
    pub fn strategy_failed<S1: Into<String>, S2: Into<String>>(name: S1, reason: S2) -> Self {
        Self::StrategyFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found<S: Into<String>>(entity: S) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    /// Create a DuplicateEntry error.
    pub fn duplicate_entry<S: Into<String>>(key: S) -> Self {
        Self::DuplicateEntry { key: key.into() }
    }

    /// Create a Storage error.
    pub fn storage<S1: Into<String>, S2: std::fmt::Display>(path: S1, reason: S2) -> Self {
        Self::Storage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a Serialization error.
    pub fn serialization<S: std::fmt::Display>(reason: S) -> Self {
        Self::Serialization {
            reason: reason.to_string(),
        }
    }
}

/// Errors raised while configuring an optimizer.
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    /// Invalid optimizer configuration.
    ///
    /// This error occurs when the optimizer is configured with invalid
    /// parameters (e.g., negative step size, nesterov without momentum).
    #[error("Invalid optimizer configuration: {reason} ({parameter} = {value})")]
    InvalidConfiguration {
        /// Description of the configuration error
        reason: String,
        /// Name of the invalid parameter
        parameter: String,
        /// Value that was invalid
        value: String,
    },

    /// The requested optimizer algorithm does not exist.
    #[error("Unsupported optimizer: {name}")]
    UnsupportedOptimizer {
        /// The requested name
        name: String,
    },

    /// A keyword argument is not accepted by the chosen optimizer.
    #[error("Optimizer {optimizer} got an unexpected keyword argument '{argument}'")]
    UnexpectedArgument {
        /// Name of the optimizer
        optimizer: String,
        /// The rejected keyword
        argument: String,
    },
}

impl OptimizerError {
    /// Create an InvalidConfiguration error.
    pub fn invalid_configuration<S1, S2, S3>(reason: S1, parameter: S2, value: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::InvalidConfiguration {
            reason: reason.into(),
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    /// Create an UnexpectedArgument error.
    pub fn unexpected_argument<S1: Into<String>, S2: Into<String>>(
        optimizer: S1,
        argument: S2,
    ) -> Self {
        Self::UnexpectedArgument {
            optimizer: optimizer.into(),
            argument: argument.into(),
        }
    }
}

/// Result type alias for MEI operations.
pub type Result<T> = std::result::Result<T, MeiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = MeiError::dimension_mismatch("[1, 2, 3]", "[1, 2]");
        assert!(matches!(err, MeiError::DimensionMismatch { .. }));
        assert_eq!(
            err.to_string(),
            "Dimension mismatch: expected [1, 2, 3], got [1, 2]"
        );

        let err = MeiError::unknown_strategy("transform", "warp");
        assert_eq!(err.to_string(), "Unknown transform strategy: warp");
    }

    #[test]
    fn test_error_display() {
        let errors = vec![
            MeiError::invalid_parameter("negative depth"),
            MeiError::numerical_error("gradient is NaN"),
            MeiError::strategy_failed("jitter", "shift too large"),
            MeiError::not_found("method 3"),
            MeiError::duplicate_entry("(1, a, b)"),
            MeiError::storage("/tmp/x", "permission denied"),
            MeiError::serialization("eof"),
            MeiError::InvalidChannel {
                channel: 4,
                available: 2,
            },
        ];

        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn test_optimizer_error_propagation() {
        let err = OptimizerError::invalid_configuration("must be positive", "step_size", "-0.1");
        let mei_err: MeiError = err.into();

        assert!(matches!(mei_err, MeiError::Optimizer(_)));
        assert!(mei_err.to_string().contains("step_size = -0.1"));
    }

    #[test]
    fn test_unexpected_argument_message() {
        let err = OptimizerError::unexpected_argument("SGD", "betas");
        assert_eq!(
            err.to_string(),
            "Optimizer SGD got an unexpected keyword argument 'betas'"
        );
    }
}
