//! Type definitions and aliases for MEI generation.
//!
//! This module provides the scalar trait shared by tensors, the autodiff
//! graph and the optimizers, so that every computation stays in the element
//! type of the initial guess.

use nalgebra::{RealField, Scalar as NalgebraScalar};
use num_traits::{Float, FromPrimitive};
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;
use std::fmt::{Debug, Display};

/// Trait for scalar types used in tensors and optimization (f32 or f64).
pub trait Scalar:
    NalgebraScalar
    + RealField
    + Float
    + FromPrimitive
    + Display
    + Debug
    + Default
    + Copy
    + Send
    + Sync
    + 'static
{
    /// Machine epsilon for this scalar type.
    const EPSILON: Self;

    /// Default tolerance for numerical comparisons.
    const DEFAULT_TOLERANCE: Self;

    /// Convert from f64 (for constants and configuration values).
    fn from_f64(v: f64) -> Self;

    /// Convert to f64 (for logging and serialization of traces).
    fn to_f64(self) -> f64;

    /// Convert from usize (for iteration counts).
    fn from_usize(v: usize) -> Self {
        <Self as Scalar>::from_f64(v as f64)
    }

    /// Draws one sample from the standard normal distribution.
    fn sample_standard_normal(rng: &mut dyn RngCore) -> Self;
}

impl Scalar for f32 {
    const EPSILON: Self = f32::EPSILON;
    const DEFAULT_TOLERANCE: Self = 1e-4;

    fn from_f64(v: f64) -> Self {
        v as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn sample_standard_normal(rng: &mut dyn RngCore) -> Self {
        rng.sample::<f32, _>(StandardNormal)
    }
}

impl Scalar for f64 {
    const EPSILON: Self = f64::EPSILON;
    const DEFAULT_TOLERANCE: Self = 1e-8;

    fn from_f64(v: f64) -> Self {
        v
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn sample_standard_normal(rng: &mut dyn RngCore) -> Self {
        rng.sample::<f64, _>(StandardNormal)
    }
}

/// Type alias for the flat storage of a tensor.
pub type DVector<T> = nalgebra::DVector<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_scalar_conversions() {
        let val_f64 = 3.14159;
        let val_f32 = <f32 as Scalar>::from_f64(val_f64);
        assert_relative_eq!(val_f32 as f64, val_f64, epsilon = 1e-6);

        let back_f64 = Scalar::to_f64(val_f32);
        assert_relative_eq!(back_f64, val_f32 as f64);
        assert_eq!(<f64 as Scalar>::from_usize(7), 7.0);
    }

    #[test]
    fn test_tolerance_ordering() {
        assert!(<f32 as Scalar>::EPSILON < <f32 as Scalar>::DEFAULT_TOLERANCE);
        assert!(<f64 as Scalar>::EPSILON < <f64 as Scalar>::DEFAULT_TOLERANCE);
    }

    #[test]
    fn test_standard_normal_is_seeded() {
        let mut a = StdRng::seed_from_u64(3);
        let mut b = StdRng::seed_from_u64(3);
        let x = <f64 as Scalar>::sample_standard_normal(&mut a);
        let y = <f64 as Scalar>::sample_standard_normal(&mut b);
        assert_eq!(x, y);
    }
}
