//! # mei
//!
//! Maximally Exciting Image (MEI) generation for trained neural response
//! models.
//!
//! An MEI is the input that maximizes the predicted response of a single
//! neuron. This crate ties together the pieces needed to produce and keep
//! them:
//!
//! - [`model`]: multi-session response models
//! - [`selector`]: restricting a model to one neuron
//! - [`ensemble`]: averaging trained models
//! - [`loader`]: loading trained models through a bounded cache
//! - [`registry`]: resolving strategy names into strategies
//! - [`method`]: stored generation recipes
//! - [`storage`]: MEI artifacts
//! - [`table`]: the table of generated MEIs
//!
//! The optimizer itself lives in `mei-optim`, the autodiff graph in
//! `mei-autodiff` and the tensor and error types in `mei-core`; the most
//! used items are re-exported here.
//!
//! ## Quick Start
//!
//! ```rust
//! use mei::prelude::*;
//! use std::sync::Arc;
//!
//! // A session with two neurons reading a 1x4x4 image.
//! let filters = vec![
//!     Tensor::from_fn(&[1, 1, 4, 4], |i| if i % 2 == 0 { 1.0 } else { -1.0 }),
//!     Tensor::from_fn(&[1, 1, 4, 4], |i| i as f64 / 16.0),
//! ];
//! let model = LinearNonlinearModel::new(Nonlinearity::Softplus)
//!     .with_session("session-1", filters, vec![0.0, 0.0])
//!     .unwrap();
//! let neuron = OutputSelectedModel::new(Arc::new(model), 0, "session-1");
//!
//! let method = MeiMethod::from_json(
//!     r#"{"method_id": 1, "post_update": "clamp_range:{\"min\": -1, \"max\": 1}", "num_iterations": 20}"#,
//! )
//! .unwrap();
//! let dataloaders = Dataloaders::new().with_session("session-1", vec![32, 1, 4, 4]);
//! let mut rng = rand::thread_rng();
//!
//! let result = method
//!     .generate_mei(&StrategyRegistry::new(), &dataloaders, &neuron, &mut rng)
//!     .unwrap();
//! assert_eq!(result.mei.shape(), &[1, 4, 4]);
//! assert_eq!(result.evaluations.len(), 20);
//! ```

pub mod ensemble;
pub mod loader;
pub mod method;
pub mod model;
pub mod registry;
pub mod selector;
pub mod storage;
pub mod table;

pub use ensemble::{EnsembleModel, EnsembleSource, TrainedEnsemble};
pub use loader::{
    Dataloaders, LoadedModel, ModelKey, ModelLoader, TrainedModelSource,
    DEFAULT_CACHE_SIZE_LIMIT,
};
pub use method::{MeiMethod, MethodTable};
pub use model::{LinearNonlinearModel, Nonlinearity, SessionModel};
pub use registry::{parse_strategy_spec, StrategyRegistry};
pub use selector::{NeuronMapping, NeuronSelector, OutputSelectedModel, SelectorKey};
pub use storage::{artifact_name, ArtifactStore, DirectoryStore, MemoryStore};
pub use table::{MeiKey, MeiRecord, MeiTable};

pub use mei_autodiff::{Graph, NodeId, TensorGraph};
pub use mei_core::{
    InitialGuessCreator, MeiError, OptimizerError, RandomNormal, RandomNormalNullChannel,
    RandomNormalNullChannels, Result, Scalar, Tensor,
};
pub use mei_optim::{
    gradient_ascent, DifferentiableFunction, MeiResult, OptimizationConfig, OptimizerKind,
    OptimizerKwargs, StopReason,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        Dataloaders, DirectoryStore, EnsembleModel, LinearNonlinearModel, MeiKey, MeiMethod,
        MeiTable, MethodTable, ModelKey, ModelLoader, NeuronMapping, NeuronSelector,
        Nonlinearity, OutputSelectedModel, SelectorKey, SessionModel, StrategyRegistry,
        TrainedModelSource,
    };
    pub use mei_autodiff::{Graph, NodeId, TensorGraph};
    pub use mei_core::prelude::*;
    pub use mei_optim::{
        gradient_ascent, DifferentiableFunction, MeiResult, OptimizationConfig, OptimizerKind,
        OptimizerKwargs,
    };
}
