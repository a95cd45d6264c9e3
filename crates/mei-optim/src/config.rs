//! Configuration of a gradient ascent run.
//!
//! [`OptimizationConfig`] bundles the four optional strategies, the step
//! size, the step rule with its keyword arguments and the iteration count.
//! Keyword arguments use the names of the corresponding PyTorch optimizers
//! so that method records written for them load unchanged.

use crate::strategy::{GradientFunction, PostUpdate, Regularization, Transform};
use mei_core::{MeiError, OptimizerError, Result, Scalar};
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Step rule used to move the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// Stochastic gradient descent (ascent form), optionally with momentum
    #[serde(rename = "SGD")]
    Sgd,
    /// Adaptive moment estimation
    #[serde(rename = "Adam")]
    Adam,
}

impl OptimizerKind {
    /// The canonical name, as stored in method records.
    pub fn as_str(self) -> &'static str {
        match self {
            OptimizerKind::Sgd => "SGD",
            OptimizerKind::Adam => "Adam",
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizerKind {
    type Err = MeiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SGD" => Ok(OptimizerKind::Sgd),
            "Adam" => Ok(OptimizerKind::Adam),
            other => Err(OptimizerError::UnsupportedOptimizer {
                name: other.to_string(),
            }
            .into()),
        }
    }
}

/// Keyword arguments of the SGD step rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SgdKwargs {
    /// Momentum factor
    pub momentum: f64,
    /// Dampening for momentum
    pub dampening: f64,
    /// Enables Nesterov momentum
    pub nesterov: bool,
    /// L2 penalty pulling the candidate towards zero
    pub weight_decay: f64,
}

impl SgdKwargs {
    const ARGUMENTS: [&'static str; 4] = ["momentum", "dampening", "nesterov", "weight_decay"];

    /// Checks the arguments.
    pub fn validate(&self) -> Result<()> {
        non_negative("momentum", self.momentum)?;
        non_negative("dampening", self.dampening)?;
        non_negative("weight_decay", self.weight_decay)?;
        if self.nesterov && (self.momentum <= 0.0 || self.dampening != 0.0) {
            return Err(OptimizerError::invalid_configuration(
                "Nesterov momentum requires a momentum and zero dampening",
                "nesterov",
                "true",
            )
            .into());
        }
        Ok(())
    }
}

impl Default for SgdKwargs {
    fn default() -> Self {
        Self {
            momentum: 0.0,
            dampening: 0.0,
            nesterov: false,
            weight_decay: 0.0,
        }
    }
}

/// Keyword arguments of the Adam step rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdamKwargs {
    /// Decay rates of the first and second moment estimates
    pub betas: (f64, f64),
    /// Term added to the denominator for stability
    pub eps: f64,
    /// L2 penalty pulling the candidate towards zero
    pub weight_decay: f64,
    /// Uses the maximum of past second moments (AMSGrad)
    pub amsgrad: bool,
}

impl AdamKwargs {
    const ARGUMENTS: [&'static str; 4] = ["betas", "eps", "weight_decay", "amsgrad"];

    /// Checks the arguments.
    pub fn validate(&self) -> Result<()> {
        for (name, beta) in [("betas[0]", self.betas.0), ("betas[1]", self.betas.1)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(OptimizerError::invalid_configuration(
                    "beta must lie in [0, 1)",
                    name,
                    beta.to_string(),
                )
                .into());
            }
        }
        non_negative("eps", self.eps)?;
        non_negative("weight_decay", self.weight_decay)
    }
}

impl Default for AdamKwargs {
    fn default() -> Self {
        Self {
            betas: (0.9, 0.999),
            eps: 1e-8,
            weight_decay: 0.0,
            amsgrad: false,
        }
    }
}

fn non_negative(parameter: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(OptimizerError::invalid_configuration(
            "must be finite and non-negative",
            parameter,
            value.to_string(),
        )
        .into());
    }
    Ok(())
}

/// Step rule together with its keyword arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerKwargs {
    /// SGD arguments
    Sgd(SgdKwargs),
    /// Adam arguments
    Adam(AdamKwargs),
}

impl OptimizerKwargs {
    /// Default arguments for `kind`.
    pub fn default_for(kind: OptimizerKind) -> Self {
        match kind {
            OptimizerKind::Sgd => OptimizerKwargs::Sgd(SgdKwargs::default()),
            OptimizerKind::Adam => OptimizerKwargs::Adam(AdamKwargs::default()),
        }
    }

    /// Parses keyword arguments for `kind` from a JSON object.
    ///
    /// `None` and JSON `null` select the defaults. Keys the optimizer does
    /// not accept are rejected with [`OptimizerError::UnexpectedArgument`].
    pub fn from_json(kind: OptimizerKind, value: Option<&serde_json::Value>) -> Result<Self> {
        let value = match value {
            None | Some(serde_json::Value::Null) => return Ok(Self::default_for(kind)),
            Some(value) => value,
        };

        let accepted: &[&str] = match kind {
            OptimizerKind::Sgd => &SgdKwargs::ARGUMENTS,
            OptimizerKind::Adam => &AdamKwargs::ARGUMENTS,
        };
        let object = value.as_object().ok_or_else(|| {
            MeiError::serialization(format!("{} keyword arguments must be an object", kind))
        })?;
        if let Some(key) = object.keys().find(|k| !accepted.contains(&k.as_str())) {
            return Err(OptimizerError::unexpected_argument(kind.as_str(), key.as_str()).into());
        }

        let kwargs = match kind {
            OptimizerKind::Sgd => OptimizerKwargs::Sgd(
                serde_json::from_value(value.clone()).map_err(MeiError::serialization)?,
            ),
            OptimizerKind::Adam => OptimizerKwargs::Adam(
                serde_json::from_value(value.clone()).map_err(MeiError::serialization)?,
            ),
        };
        kwargs.validate()?;
        Ok(kwargs)
    }

    /// The step rule these arguments belong to.
    pub fn kind(&self) -> OptimizerKind {
        match self {
            OptimizerKwargs::Sgd(_) => OptimizerKind::Sgd,
            OptimizerKwargs::Adam(_) => OptimizerKind::Adam,
        }
    }

    /// Checks the arguments.
    pub fn validate(&self) -> Result<()> {
        match self {
            OptimizerKwargs::Sgd(kwargs) => kwargs.validate(),
            OptimizerKwargs::Adam(kwargs) => kwargs.validate(),
        }
    }
}

impl Default for OptimizerKwargs {
    fn default() -> Self {
        Self::default_for(OptimizerKind::Sgd)
    }
}

/// Configuration of one gradient ascent run.
///
/// All strategies are optional; a missing strategy behaves as the identity
/// transform, a zero penalty, an unchanged gradient or no post-update.
#[derive(Debug, Clone)]
pub struct OptimizationConfig<T: Scalar> {
    /// Differentiable transformation applied before the model
    pub transform: Option<Arc<dyn Transform<T>>>,
    /// Differentiable penalty subtracted from the response
    pub regularization: Option<Arc<dyn Regularization<T>>>,
    /// Preconditioner applied to the ascent gradient
    pub gradient_f: Option<Arc<dyn GradientFunction<T>>>,
    /// Constraint applied after each step
    pub post_update: Option<Arc<dyn PostUpdate<T>>>,
    /// Learning rate of the step rule
    pub step_size: T,
    /// Step rule and its keyword arguments
    pub optimizer: OptimizerKwargs,
    /// Number of gradient ascent steps
    pub num_iterations: usize,
    /// Emit a progress event every this many iterations
    pub log_every: Option<usize>,
    /// Keep a copy of the candidate every this many iterations
    pub save_every: Option<usize>,
}

impl<T: Scalar> Default for OptimizationConfig<T> {
    fn default() -> Self {
        Self {
            transform: None,
            regularization: None,
            gradient_f: None,
            post_update: None,
            step_size: <T as Scalar>::from_f64(0.1),
            optimizer: OptimizerKwargs::default(),
            num_iterations: 1000,
            log_every: None,
            save_every: None,
        }
    }
}

impl<T: Scalar> OptimizationConfig<T> {
    /// Creates a configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transform.
    pub fn with_transform(mut self, transform: Arc<dyn Transform<T>>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Sets the regularization.
    pub fn with_regularization(mut self, regularization: Arc<dyn Regularization<T>>) -> Self {
        self.regularization = Some(regularization);
        self
    }

    /// Sets the gradient preconditioner.
    pub fn with_gradient_f(mut self, gradient_f: Arc<dyn GradientFunction<T>>) -> Self {
        self.gradient_f = Some(gradient_f);
        self
    }

    /// Sets the post-update.
    pub fn with_post_update(mut self, post_update: Arc<dyn PostUpdate<T>>) -> Self {
        self.post_update = Some(post_update);
        self
    }

    /// Sets the step size.
    pub fn with_step_size(mut self, step_size: T) -> Self {
        self.step_size = step_size;
        self
    }

    /// Sets the step rule and its arguments.
    pub fn with_optimizer(mut self, optimizer: OptimizerKwargs) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets the number of iterations.
    pub fn with_num_iterations(mut self, num_iterations: usize) -> Self {
        self.num_iterations = num_iterations;
        self
    }

    /// Emits a progress event every `every` iterations.
    pub fn with_log_every(mut self, every: usize) -> Self {
        self.log_every = Some(every);
        self
    }

    /// Keeps a snapshot of the candidate every `every` iterations.
    pub fn with_save_every(mut self, every: usize) -> Self {
        self.save_every = Some(every);
        self
    }

    /// The step rule in use.
    pub fn optimizer_kind(&self) -> OptimizerKind {
        self.optimizer.kind()
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if !<T as Float>::is_finite(self.step_size) || self.step_size <= T::zero() {
            return Err(OptimizerError::invalid_configuration(
                "step size must be finite and positive",
                "step_size",
                self.step_size.to_string(),
            )
            .into());
        }
        for (parameter, every) in [("log_every", self.log_every), ("save_every", self.save_every)]
        {
            if every == Some(0) {
                return Err(OptimizerError::invalid_configuration(
                    "interval must be positive",
                    parameter,
                    "0",
                )
                .into());
            }
        }
        self.optimizer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("SGD".parse::<OptimizerKind>().unwrap(), OptimizerKind::Sgd);
        assert_eq!("Adam".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adam);
        let err = "LBFGS".parse::<OptimizerKind>().unwrap_err();
        assert!(matches!(
            err,
            MeiError::Optimizer(OptimizerError::UnsupportedOptimizer { .. })
        ));
        assert_eq!(OptimizerKind::Adam.to_string(), "Adam");
    }

    #[test]
    fn test_default_config() {
        let config = OptimizationConfig::<f64>::new();
        assert_eq!(config.step_size, 0.1);
        assert_eq!(config.num_iterations, 1000);
        assert_eq!(config.optimizer_kind(), OptimizerKind::Sgd);
        assert!(config.transform.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_step_size_validation() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = OptimizationConfig::<f64>::new().with_step_size(bad);
            assert!(config.validate().is_err(), "accepted step size {}", bad);
        }
        let config = OptimizationConfig::<f32>::new().with_log_every(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sgd_kwargs_from_json() {
        let kwargs =
            OptimizerKwargs::from_json(OptimizerKind::Sgd, Some(&json!({"momentum": 0.9})))
                .unwrap();
        assert_eq!(
            kwargs,
            OptimizerKwargs::Sgd(SgdKwargs {
                momentum: 0.9,
                ..SgdKwargs::default()
            })
        );
    }

    #[test]
    fn test_adam_kwargs_from_json() {
        let kwargs = OptimizerKwargs::from_json(
            OptimizerKind::Adam,
            Some(&json!({"betas": [0.5, 0.9], "amsgrad": true})),
        )
        .unwrap();
        match kwargs {
            OptimizerKwargs::Adam(adam) => {
                assert_eq!(adam.betas, (0.5, 0.9));
                assert!(adam.amsgrad);
                assert_eq!(adam.eps, 1e-8);
            }
            other => panic!("unexpected kwargs {:?}", other),
        }
    }

    #[test]
    fn test_missing_kwargs_select_defaults() {
        let null = json!(null);
        assert_eq!(
            OptimizerKwargs::from_json(OptimizerKind::Adam, Some(&null)).unwrap(),
            OptimizerKwargs::Adam(AdamKwargs::default())
        );
        assert_eq!(
            OptimizerKwargs::from_json(OptimizerKind::Sgd, None).unwrap(),
            OptimizerKwargs::default()
        );
    }

    #[test]
    fn test_unexpected_argument() {
        let err = OptimizerKwargs::from_json(OptimizerKind::Sgd, Some(&json!({"betas": [0.9, 0.99]})))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Optimizer error: Optimizer SGD got an unexpected keyword argument 'betas'"
        );
    }

    #[test]
    fn test_invalid_kwargs() {
        let nesterov = json!({"nesterov": true});
        assert!(OptimizerKwargs::from_json(OptimizerKind::Sgd, Some(&nesterov)).is_err());

        let nesterov = json!({"nesterov": true, "momentum": 0.9});
        assert!(OptimizerKwargs::from_json(OptimizerKind::Sgd, Some(&nesterov)).is_ok());

        let betas = json!({"betas": [1.0, 0.999]});
        assert!(OptimizerKwargs::from_json(OptimizerKind::Adam, Some(&betas)).is_err());

        let wrong_type = json!({"momentum": "fast"});
        assert!(matches!(
            OptimizerKwargs::from_json(OptimizerKind::Sgd, Some(&wrong_type)),
            Err(MeiError::Serialization { .. })
        ));

        let not_object = json!([0.9]);
        assert!(OptimizerKwargs::from_json(OptimizerKind::Sgd, Some(&not_object)).is_err());
    }
}
