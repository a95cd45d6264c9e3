//! Name-to-strategy resolution.
//!
//! Stored methods refer to strategies by name. A name is either a bare
//! identifier (`"jitter"`) or an identifier followed by a JSON object of
//! parameters (`"jitter:{\"max_shift\": 2}"`). Each strategy category keeps
//! its own table of factories; the built-ins are registered by
//! [`StrategyRegistry::new`].
//!
//! | Category | Built-ins |
//! |----------|-----------|
//! | transform | `identity`, `jitter{max_shift, seed}` |
//! | regularization | `l2{weight}`, `total_variation{weight}` |
//! | gradient function | `normalize`, `clip{max_norm}` |
//! | post-update | `clamp_range{min, max}`, `clamp_norm{max_norm}`, `change_norm{norm}` |

use mei_core::{MeiError, Result, Scalar};
use mei_optim::{
    ChangeNorm, ClampNorm, ClampRange, ClipGradient, GradientFunction, Identity, Jitter,
    L2Penalty, NormalizeGradient, PostUpdate, Regularization, TotalVariation, Transform,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds a strategy from its JSON parameters (`null` when none were given).
pub type Factory<S> = Box<dyn Fn(&Value) -> Result<Arc<S>> + Send + Sync>;

/// Splits `"name"` or `"name:{json}"` into the name and its parameters.
pub fn parse_strategy_spec(spec: &str) -> Result<(&str, Value)> {
    let (name, params) = match spec.split_once(':') {
        Some((name, params)) => {
            let params: Value = serde_json::from_str(params)
                .map_err(|e| MeiError::serialization(format!("parameters of {}: {}", name, e)))?;
            (name.trim(), params)
        }
        None => (spec.trim(), Value::Null),
    };
    if name.is_empty() {
        return Err(MeiError::invalid_parameter(format!(
            "empty strategy name in '{}'",
            spec
        )));
    }
    Ok((name, params))
}

fn params<P: DeserializeOwned>(name: &str, value: &Value) -> Result<P> {
    let value = match value {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| MeiError::serialization(format!("{}: {}", name, e)))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JitterParams {
    max_shift: usize,
    #[serde(default)]
    seed: u64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WeightParams {
    weight: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MaxNormParams {
    max_norm: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RangeParams {
    min: f64,
    max: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NormParams {
    norm: f64,
}

struct Catalog<S: ?Sized> {
    kind: &'static str,
    factories: BTreeMap<String, Factory<S>>,
}

impl<S: ?Sized> Catalog<S> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: BTreeMap::new(),
        }
    }

    fn register(&mut self, name: &str, factory: Factory<S>) -> Result<()> {
        if name.is_empty() || name.contains(':') {
            return Err(MeiError::invalid_parameter(format!(
                "invalid {} name '{}'",
                self.kind, name
            )));
        }
        if self.factories.contains_key(name) {
            return Err(MeiError::duplicate_entry(format!("{} {}", self.kind, name)));
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    fn resolve(&self, spec: &str) -> Result<Arc<S>> {
        let (name, params) = parse_strategy_spec(spec)?;
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| MeiError::unknown_strategy(self.kind, name))?;
        factory(&params)
    }

    fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

/// Strategy factories by category and name.
pub struct StrategyRegistry<T: Scalar> {
    transforms: Catalog<dyn Transform<T>>,
    regularizations: Catalog<dyn Regularization<T>>,
    gradient_functions: Catalog<dyn GradientFunction<T>>,
    post_updates: Catalog<dyn PostUpdate<T>>,
}

impl<T: Scalar> StrategyRegistry<T> {
    /// A registry with no strategies.
    pub fn empty() -> Self {
        Self {
            transforms: Catalog::new("transform"),
            regularizations: Catalog::new("regularization"),
            gradient_functions: Catalog::new("gradient function"),
            post_updates: Catalog::new("post-update"),
        }
    }

    /// A registry holding the built-in strategies.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        let transforms: [(&str, Factory<dyn Transform<T>>); 2] = [
            (
                "identity",
                Box::new(|v: &Value| -> Result<Arc<dyn Transform<T>>> {
                    params::<NoParams>("identity", v)?;
                    Ok(Arc::new(Identity))
                }),
            ),
            (
                "jitter",
                Box::new(|v: &Value| -> Result<Arc<dyn Transform<T>>> {
                    let p: JitterParams = params("jitter", v)?;
                    Ok(Arc::new(Jitter::try_new(p.max_shift)?.with_seed(p.seed)))
                }),
            ),
        ];
        for (name, factory) in transforms {
            self.transforms.factories.insert(name.to_string(), factory);
        }

        let regularizations: [(&str, Factory<dyn Regularization<T>>); 2] = [
            (
                "l2",
                Box::new(|v: &Value| -> Result<Arc<dyn Regularization<T>>> {
                    let p: WeightParams = params("l2", v)?;
                    Ok(Arc::new(L2Penalty::new(<T as Scalar>::from_f64(p.weight))))
                }),
            ),
            (
                "total_variation",
                Box::new(|v: &Value| -> Result<Arc<dyn Regularization<T>>> {
                    let p: WeightParams = params("total_variation", v)?;
                    Ok(Arc::new(TotalVariation::new(<T as Scalar>::from_f64(
                        p.weight,
                    ))))
                }),
            ),
        ];
        for (name, factory) in regularizations {
            self.regularizations.factories.insert(name.to_string(), factory);
        }

        let gradient_functions: [(&str, Factory<dyn GradientFunction<T>>); 2] = [
            (
                "normalize",
                Box::new(|v: &Value| -> Result<Arc<dyn GradientFunction<T>>> {
                    params::<NoParams>("normalize", v)?;
                    Ok(Arc::new(NormalizeGradient))
                }),
            ),
            (
                "clip",
                Box::new(|v: &Value| -> Result<Arc<dyn GradientFunction<T>>> {
                    let p: MaxNormParams = params("clip", v)?;
                    Ok(Arc::new(ClipGradient::new(<T as Scalar>::from_f64(
                        p.max_norm,
                    ))?))
                }),
            ),
        ];
        for (name, factory) in gradient_functions {
            self.gradient_functions
                .factories
                .insert(name.to_string(), factory);
        }

        let post_updates: [(&str, Factory<dyn PostUpdate<T>>); 3] = [
            (
                "clamp_range",
                Box::new(|v: &Value| -> Result<Arc<dyn PostUpdate<T>>> {
                    let p: RangeParams = params("clamp_range", v)?;
                    Ok(Arc::new(ClampRange::new(
                        <T as Scalar>::from_f64(p.min),
                        <T as Scalar>::from_f64(p.max),
                    )?))
                }),
            ),
            (
                "clamp_norm",
                Box::new(|v: &Value| -> Result<Arc<dyn PostUpdate<T>>> {
                    let p: MaxNormParams = params("clamp_norm", v)?;
                    Ok(Arc::new(ClampNorm::new(<T as Scalar>::from_f64(
                        p.max_norm,
                    ))?))
                }),
            ),
            (
                "change_norm",
                Box::new(|v: &Value| -> Result<Arc<dyn PostUpdate<T>>> {
                    let p: NormParams = params("change_norm", v)?;
                    Ok(Arc::new(ChangeNorm::new(<T as Scalar>::from_f64(p.norm))?))
                }),
            ),
        ];
        for (name, factory) in post_updates {
            self.post_updates.factories.insert(name.to_string(), factory);
        }
    }

    /// Registers a transform factory under `name`.
    pub fn register_transform<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&Value) -> Result<Arc<dyn Transform<T>>> + Send + Sync + 'static,
    {
        self.transforms.register(name, Box::new(factory))
    }

    /// Registers a regularization factory under `name`.
    pub fn register_regularization<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&Value) -> Result<Arc<dyn Regularization<T>>> + Send + Sync + 'static,
    {
        self.regularizations.register(name, Box::new(factory))
    }

    /// Registers a gradient function factory under `name`.
    pub fn register_gradient_function<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&Value) -> Result<Arc<dyn GradientFunction<T>>> + Send + Sync + 'static,
    {
        self.gradient_functions.register(name, Box::new(factory))
    }

    /// Registers a post-update factory under `name`.
    pub fn register_post_update<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&Value) -> Result<Arc<dyn PostUpdate<T>>> + Send + Sync + 'static,
    {
        self.post_updates.register(name, Box::new(factory))
    }

    /// Builds the transform described by `spec`.
    pub fn resolve_transform(&self, spec: &str) -> Result<Arc<dyn Transform<T>>> {
        self.transforms.resolve(spec)
    }

    /// Builds the regularization described by `spec`.
    pub fn resolve_regularization(&self, spec: &str) -> Result<Arc<dyn Regularization<T>>> {
        self.regularizations.resolve(spec)
    }

    /// Builds the gradient function described by `spec`.
    pub fn resolve_gradient_function(&self, spec: &str) -> Result<Arc<dyn GradientFunction<T>>> {
        self.gradient_functions.resolve(spec)
    }

    /// Builds the post-update described by `spec`.
    pub fn resolve_post_update(&self, spec: &str) -> Result<Arc<dyn PostUpdate<T>>> {
        self.post_updates.resolve(spec)
    }

    /// Registered transform names.
    pub fn transform_names(&self) -> Vec<&str> {
        self.transforms.names()
    }

    /// Registered regularization names.
    pub fn regularization_names(&self) -> Vec<&str> {
        self.regularizations.names()
    }

    /// Registered gradient function names.
    pub fn gradient_function_names(&self) -> Vec<&str> {
        self.gradient_functions.names()
    }

    /// Registered post-update names.
    pub fn post_update_names(&self) -> Vec<&str> {
        self.post_updates.names()
    }
}

impl<T: Scalar> Default for StrategyRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> fmt::Debug for StrategyRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("transforms", &self.transforms.names())
            .field("regularizations", &self.regularizations.names())
            .field("gradient_functions", &self.gradient_functions.names())
            .field("post_updates", &self.post_updates.names())
            .finish()
    }
}
