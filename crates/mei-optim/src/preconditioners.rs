//! Built-in gradient functions.

use crate::strategy::GradientFunction;
use mei_core::{OptimizerError, Result, Scalar, Tensor};
use num_traits::Float;

/// Rescales the gradient to unit Euclidean norm. A zero gradient is left as is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeGradient;

impl<T: Scalar> GradientFunction<T> for NormalizeGradient {
    fn apply(&self, mut gradient: Tensor<T>, _iteration: usize) -> Result<Tensor<T>> {
        let norm = gradient.norm();
        if norm > T::zero() {
            gradient.scale_mut(T::one() / norm);
        }
        Ok(gradient)
    }
}

/// Scales the gradient down when its norm exceeds `max_norm`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipGradient<T: Scalar> {
    /// Largest allowed gradient norm
    pub max_norm: T,
}

impl<T: Scalar> ClipGradient<T> {
    /// Creates the clipping function. `max_norm` must be positive.
    pub fn new(max_norm: T) -> Result<Self> {
        if max_norm <= T::zero() || <T as Float>::is_nan(max_norm) {
            return Err(OptimizerError::invalid_configuration(
                "gradient clipping threshold must be positive",
                "max_norm",
                max_norm.to_string(),
            )
            .into());
        }
        Ok(Self { max_norm })
    }
}

impl<T: Scalar> GradientFunction<T> for ClipGradient<T> {
    fn apply(&self, mut gradient: Tensor<T>, _iteration: usize) -> Result<Tensor<T>> {
        let norm = gradient.norm();
        if norm > self.max_norm {
            gradient.scale_mut(self.max_norm / norm);
        }
        Ok(gradient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize() {
        let g = Tensor::from_vec(vec![2], vec![3.0_f64, 4.0]).unwrap();
        let out = NormalizeGradient.apply(g, 0).unwrap();
        assert_relative_eq!(out.norm(), 1.0);
        assert_relative_eq!(out.as_slice()[0], 0.6);

        let zero = NormalizeGradient.apply(Tensor::<f64>::zeros(&[3]), 0).unwrap();
        assert_eq!(zero, Tensor::zeros(&[3]));
    }

    #[test]
    fn test_clip() {
        let clip = ClipGradient::new(1.0_f64).unwrap();
        let big = Tensor::from_vec(vec![2], vec![3.0, 4.0]).unwrap();
        assert_relative_eq!(clip.apply(big, 0).unwrap().norm(), 1.0);

        let small = Tensor::from_vec(vec![2], vec![0.3, 0.4]).unwrap();
        assert_eq!(clip.apply(small.clone(), 0).unwrap(), small);

        assert!(ClipGradient::new(0.0_f64).is_err());
        assert!(ClipGradient::new(f64::NAN).is_err());
        assert!(ClipGradient::new(f32::NAN).is_err());
    }
}
