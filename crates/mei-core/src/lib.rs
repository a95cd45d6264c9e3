//! Core types for Maximally Exciting Image (MEI) generation.
//!
//! This crate provides the foundational pieces shared by the autodiff
//! engine, the optimizers and the persistence layer.
//!
//! # Modules
//!
//! - [`error`]: Error types and the crate-wide `Result` alias
//! - [`types`]: The `Scalar` trait (f32 or f64)
//! - [`tensor`]: Dense n-dimensional tensors
//! - [`initial`]: Initial-guess creators feeding the optimizer

pub mod error;
pub mod initial;
pub mod tensor;
pub mod types;

pub use error::{MeiError, OptimizerError, Result};
pub use initial::{
    InitialGuessCreator, RandomNormal, RandomNormalNullChannel, RandomNormalNullChannels,
};
pub use tensor::Tensor;
pub use types::Scalar;

/// Prelude module for convenient imports.
///
/// # Example
/// ```
/// use mei_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{MeiError, OptimizerError, Result};
    pub use crate::initial::{
        InitialGuessCreator, RandomNormal, RandomNormalNullChannel, RandomNormalNullChannels,
    };
    pub use crate::tensor::Tensor;
    pub use crate::types::Scalar;
}
