//! Built-in post-updates constraining the candidate after each step.

use crate::strategy::PostUpdate;
use mei_core::{OptimizerError, Result, Scalar, Tensor};
use num_traits::Float;

/// Clamps every element into `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampRange<T: Scalar> {
    /// Lower bound
    pub min: T,
    /// Upper bound
    pub max: T,
}

impl<T: Scalar> ClampRange<T> {
    /// Creates the constraint; `min` must not exceed `max`.
    pub fn new(min: T, max: T) -> Result<Self> {
        if min > max || <T as Float>::is_nan(min) || <T as Float>::is_nan(max) {
            return Err(OptimizerError::invalid_configuration(
                "clamp range is empty",
                "min",
                format!("{} > {}", min, max),
            )
            .into());
        }
        Ok(Self { min, max })
    }
}

impl<T: Scalar> PostUpdate<T> for ClampRange<T> {
    fn apply(&self, candidate: &mut Tensor<T>, _iteration: usize) -> Result<()> {
        candidate.clamp_mut(self.min, self.max);
        Ok(())
    }
}

/// Scales the candidate down when its Euclidean norm exceeds `max_norm`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampNorm<T: Scalar> {
    /// Largest allowed norm
    pub max_norm: T,
}

impl<T: Scalar> ClampNorm<T> {
    /// Creates the constraint.
    pub fn new(max_norm: T) -> Result<Self> {
        positive("max_norm", max_norm)?;
        Ok(Self { max_norm })
    }
}

impl<T: Scalar> PostUpdate<T> for ClampNorm<T> {
    fn apply(&self, candidate: &mut Tensor<T>, _iteration: usize) -> Result<()> {
        let norm = candidate.norm();
        if norm > self.max_norm {
            candidate.scale_mut(self.max_norm / norm);
        }
        Ok(())
    }
}

/// Rescales the candidate to an exact Euclidean norm. A zero candidate is left as is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeNorm<T: Scalar> {
    /// Target norm
    pub norm: T,
}

impl<T: Scalar> ChangeNorm<T> {
    /// Creates the constraint.
    pub fn new(norm: T) -> Result<Self> {
        positive("norm", norm)?;
        Ok(Self { norm })
    }
}

impl<T: Scalar> PostUpdate<T> for ChangeNorm<T> {
    fn apply(&self, candidate: &mut Tensor<T>, _iteration: usize) -> Result<()> {
        let current = candidate.norm();
        if current > T::zero() {
            candidate.scale_mut(self.norm / current);
        }
        Ok(())
    }
}

fn positive<T: Scalar>(parameter: &str, value: T) -> Result<()> {
    if value <= T::zero() || <T as Float>::is_nan(value) {
        return Err(OptimizerError::invalid_configuration(
            "must be positive",
            parameter,
            value.to_string(),
        )
        .into());
    }
    Ok(())
}
