//! Stored MEI generation methods.

use crate::loader::Dataloaders;
use crate::registry::StrategyRegistry;
use mei_core::{InitialGuessCreator, MeiError, RandomNormal, Result, Scalar};
use mei_optim::{
    gradient_ascent, DifferentiableFunction, MeiResult, OptimizationConfig, OptimizerKind,
    OptimizerKwargs,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

fn default_step_size() -> f64 {
    0.1
}

fn default_optim_name() -> OptimizerKind {
    OptimizerKind::Sgd
}

fn default_num_iterations() -> u16 {
    1000
}

/// A named recipe for generating MEIs.
///
/// Strategies are stored by name (see [`crate::registry`]); a missing
/// strategy leaves the corresponding step of the ascent loop out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeiMethod {
    /// Primary key
    pub method_id: u8,
    /// Transform applied to the candidate before the model
    #[serde(default)]
    pub transform: Option<String>,
    /// Penalty subtracted from the response
    #[serde(default)]
    pub regularization: Option<String>,
    /// Gradient preconditioner
    #[serde(default)]
    pub gradient_f: Option<String>,
    /// Constraint applied after each step
    #[serde(default)]
    pub post_update: Option<String>,
    /// Learning rate of the step rule
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    /// Step rule
    #[serde(default = "default_optim_name")]
    pub optim_name: OptimizerKind,
    /// Keyword arguments of the step rule
    #[serde(default)]
    pub optim_kwargs: Option<Value>,
    /// Number of ascent iterations
    #[serde(default = "default_num_iterations")]
    pub num_iterations: u16,
}

impl MeiMethod {
    /// A method with the default settings and no strategies.
    pub fn new(method_id: u8) -> Self {
        Self {
            method_id,
            transform: None,
            regularization: None,
            gradient_f: None,
            post_update: None,
            step_size: default_step_size(),
            optim_name: default_optim_name(),
            optim_kwargs: None,
            num_iterations: default_num_iterations(),
        }
    }

    /// Parses a method record.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(MeiError::serialization)
    }

    /// Serializes the record.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(MeiError::serialization)
    }

    /// Resolves the strategy names and builds the optimization config.
    ///
    /// Every name and argument is checked here, before any optimization runs.
    pub fn resolve<T: Scalar>(
        &self,
        registry: &StrategyRegistry<T>,
    ) -> Result<OptimizationConfig<T>> {
        let mut config = OptimizationConfig::new()
            .with_step_size(<T as Scalar>::from_f64(self.step_size))
            .with_optimizer(OptimizerKwargs::from_json(
                self.optim_name,
                self.optim_kwargs.as_ref(),
            )?)
            .with_num_iterations(usize::from(self.num_iterations));

        if let Some(spec) = &self.transform {
            config = config.with_transform(registry.resolve_transform(spec)?);
        }
        if let Some(spec) = &self.regularization {
            config = config.with_regularization(registry.resolve_regularization(spec)?);
        }
        if let Some(spec) = &self.gradient_f {
            config = config.with_gradient_f(registry.resolve_gradient_function(spec)?);
        }
        if let Some(spec) = &self.post_update {
            config = config.with_post_update(registry.resolve_post_update(spec)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Generates an MEI for `model` starting from a standard normal guess.
    ///
    /// The guess has the model's input shape with a batch size of one.
    pub fn generate_mei<T, M>(
        &self,
        registry: &StrategyRegistry<T>,
        dataloaders: &Dataloaders,
        model: &M,
        rng: &mut dyn RngCore,
    ) -> Result<MeiResult<T>>
    where
        T: Scalar,
        M: DifferentiableFunction<T> + ?Sized,
    {
        let config = self.resolve(registry)?;
        let input_shape = dataloaders.input_shape()?;
        if input_shape.is_empty() {
            return Err(MeiError::invalid_parameter("model input shape has no axes"));
        }

        let mut shape = Vec::with_capacity(input_shape.len());
        shape.push(1);
        shape.extend_from_slice(&input_shape[1..]);
        debug!(method = self.method_id, shape = ?shape, "Creating initial guess");

        let initial_guess = InitialGuessCreator::<T>::create(&RandomNormal, &shape, rng)?;
        gradient_ascent(model, initial_guess, &config)
    }
}

/// Table of stored methods keyed by `method_id`.
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    methods: BTreeMap<u8, MeiMethod>,
}

impl MethodTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a method after checking that it resolves against `registry`.
    pub fn insert<T: Scalar>(
        &mut self,
        method: MeiMethod,
        registry: &StrategyRegistry<T>,
    ) -> Result<()> {
        if self.methods.contains_key(&method.method_id) {
            return Err(MeiError::duplicate_entry(format!(
                "method {}",
                method.method_id
            )));
        }
        method.resolve(registry)?;
        self.methods.insert(method.method_id, method);
        Ok(())
    }

    /// Looks up a method.
    pub fn get(&self, method_id: u8) -> Result<&MeiMethod> {
        self.methods
            .get(&method_id)
            .ok_or_else(|| MeiError::not_found(format!("method {}", method_id)))
    }

    /// Number of stored methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
