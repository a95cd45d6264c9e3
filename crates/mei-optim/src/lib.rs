//! Gradient ascent for Maximally Exciting Image (MEI) generation.
//!
//! This crate turns a differentiable model and an initial guess into the
//! input that maximizes the model's response. The loop is fixed; its
//! behavior is customized through four optional strategies and the choice
//! of step rule.
//!
//! # Step rules
//!
//! - **SGD**: Stochastic gradient ascent with momentum, dampening, Nesterov and weight decay
//! - **Adam**: Adaptive moment estimation with optional AMSGrad
//!
//! # Built-in strategies
//!
//! - Transforms: [`Identity`], [`Jitter`]
//! - Regularizations: [`L2Penalty`], [`TotalVariation`]
//! - Gradient functions: [`NormalizeGradient`], [`ClipGradient`]
//! - Post-updates: [`ClampRange`], [`ClampNorm`], [`ChangeNorm`]
//!
//! # Examples
//!
//! ```rust
//! use mei_autodiff::{Graph, NodeId, TensorGraph};
//! use mei_core::{Result, Tensor};
//! use mei_optim::{gradient_ascent, FnModel, OptimizationConfig};
//!
//! // Response peaks at the origin.
//! let model = FnModel::new(|g: &Graph<f64>, x: NodeId| -> Result<NodeId> {
//!     let sq = g.square(x)?;
//!     let total = g.sum(sq)?;
//!     g.neg(total)
//! });
//!
//! let config = OptimizationConfig::<f64>::new()
//!     .with_step_size(0.1)
//!     .with_num_iterations(50);
//! let result = gradient_ascent(&model, Tensor::ones(&[1, 4]), &config).unwrap();
//! assert!(result.mei.norm() < 0.01);
//! ```

pub mod adam;
pub mod ascent;
pub mod config;
pub mod constraints;
pub mod model;
pub mod preconditioners;
pub mod regularizers;
pub mod sgd;
pub mod step_rule;
pub mod strategy;
pub mod transforms;

pub use adam::Adam;
pub use ascent::{gradient_ascent, MeiResult, StopReason};
pub use config::{AdamKwargs, OptimizationConfig, OptimizerKind, OptimizerKwargs, SgdKwargs};
pub use constraints::{ChangeNorm, ClampNorm, ClampRange};
pub use model::{DifferentiableFunction, FnModel};
pub use preconditioners::{ClipGradient, NormalizeGradient};
pub use regularizers::{L2Penalty, TotalVariation};
pub use sgd::Sgd;
pub use step_rule::{build_step_rule, StepRule};
pub use strategy::{
    FnGradient, FnPostUpdate, FnRegularization, FnTransform, GradientFunction, PostUpdate,
    Regularization, Transform,
};
pub use transforms::{Identity, Jitter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exports() {
        let _config = OptimizationConfig::<f64>::new();
        let _kwargs = OptimizerKwargs::default_for(OptimizerKind::Adam);
        let _clamp = ClampRange::new(-1.0_f64, 1.0).unwrap();
        let _jitter = Jitter::new(2);
    }
}
