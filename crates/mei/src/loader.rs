//! Loading trained models with a bounded LRU cache.

use crate::model::SessionModel;
use lru::LruCache;
use mei_core::{MeiError, Result, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// Default number of models kept in memory by a [`ModelLoader`].
pub const DEFAULT_CACHE_SIZE_LIMIT: usize = 10;

/// Primary key of a trained model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    /// Hash of the dataset the model was trained on
    pub dataset_hash: String,
    /// Identifier of the ensemble within the dataset
    pub ensemble_id: u8,
}

impl ModelKey {
    /// Creates a key.
    pub fn new(dataset_hash: impl Into<String>, ensemble_id: u8) -> Self {
        Self {
            dataset_hash: dataset_hash.into(),
            ensemble_id,
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/ensemble {}", self.dataset_hash, self.ensemble_id)
    }
}

/// Input description of the data a model was trained on.
///
/// Shapes include the batch dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataloaders {
    /// Input shape per session
    pub input_shapes: BTreeMap<String, Vec<usize>>,
}

impl Dataloaders {
    /// Creates an empty description.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the input shape of a session.
    pub fn with_session(mut self, session_id: impl Into<String>, shape: Vec<usize>) -> Self {
        self.input_shapes.insert(session_id.into(), shape);
        self
    }

    /// Input shape of the first session.
    pub fn input_shape(&self) -> Result<&[usize]> {
        self.input_shapes
            .values()
            .next()
            .map(Vec::as_slice)
            .ok_or_else(|| MeiError::not_found("dataloader sessions"))
    }
}

/// A model together with the description of its inputs.
pub type LoadedModel<T> = (Dataloaders, Arc<dyn SessionModel<T>>);

/// Source of trained models.
pub trait TrainedModelSource<T: Scalar>: fmt::Debug {
    /// Loads the model stored under `key`.
    fn load_model(&self, key: &ModelKey) -> Result<LoadedModel<T>>;
}

/// Loads models from a [`TrainedModelSource`], keeping the most recently
/// used ones in memory.
pub struct ModelLoader<T: Scalar> {
    source: Box<dyn TrainedModelSource<T>>,
    cache: Option<LruCache<ModelKey, LoadedModel<T>>>,
}

impl<T: Scalar> ModelLoader<T> {
    /// Creates a loader caching at most `cache_size_limit` models.
    ///
    /// A limit of zero disables caching.
    pub fn new(source: Box<dyn TrainedModelSource<T>>, cache_size_limit: usize) -> Self {
        Self {
            source,
            cache: NonZeroUsize::new(cache_size_limit).map(LruCache::new),
        }
    }

    /// Creates a loader with [`DEFAULT_CACHE_SIZE_LIMIT`].
    pub fn with_default_cache(source: Box<dyn TrainedModelSource<T>>) -> Self {
        Self::new(source, DEFAULT_CACHE_SIZE_LIMIT)
    }

    /// Returns the model stored under `key`, loading it on a cache miss.
    pub fn load(&mut self, key: &ModelKey) -> Result<LoadedModel<T>> {
        let Some(cache) = self.cache.as_mut() else {
            return self.source.load_model(key);
        };

        if let Some((dataloaders, model)) = cache.get(key) {
            debug!(model = %key, "Model cache hit");
            return Ok((dataloaders.clone(), Arc::clone(model)));
        }

        debug!(model = %key, "Model cache miss");
        let (dataloaders, model) = self.source.load_model(key)?;
        if let Some((evicted, _)) = cache.push(key.clone(), (dataloaders.clone(), Arc::clone(&model)))
        {
            debug!(model = %evicted, "Evicted model from cache");
        }
        Ok((dataloaders, model))
    }

    /// Whether `key` is currently cached.
    pub fn is_cached(&self, key: &ModelKey) -> bool {
        self.cache
            .as_ref()
            .is_some_and(|cache| cache.contains(key))
    }

    /// Number of cached models.
    pub fn cached(&self) -> usize {
        self.cache.as_ref().map_or(0, LruCache::len)
    }

    /// Maximum number of cached models.
    pub fn cache_size_limit(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.cap().get())
    }
}

impl<T: Scalar> fmt::Debug for ModelLoader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelLoader")
            .field("source", &self.source)
            .field("cached", &self.cached())
            .field("cache_size_limit", &self.cache_size_limit())
            .finish()
    }
}
