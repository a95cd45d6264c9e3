//! Restricting multi-session models to a single neuron.

use crate::model::SessionModel;
use mei_autodiff::{Graph, NodeId, TensorGraph};
use mei_core::{MeiError, Result, Scalar};
use mei_optim::DifferentiableFunction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Maximum length of a session identifier.
pub const MAX_SESSION_ID_LEN: usize = 13;

/// Primary key of the selector table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SelectorKey {
    /// Hash of the dataset the neuron was recorded in
    pub dataset_hash: String,
    /// Neuron identifier unique within the dataset
    pub neuron_id: u32,
}

impl SelectorKey {
    /// Creates a key.
    pub fn new(dataset_hash: impl Into<String>, neuron_id: u32) -> Self {
        Self {
            dataset_hash: dataset_hash.into(),
            neuron_id,
        }
    }
}

impl fmt::Display for SelectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/neuron {}", self.dataset_hash, self.neuron_id)
    }
}

/// Where a neuron lives in the model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeuronMapping {
    /// Index of the neuron in the session's response vector
    pub neuron_position: usize,
    /// Session the neuron was recorded in
    pub session_id: String,
}

impl NeuronMapping {
    /// Creates a mapping, rejecting session identifiers longer than
    /// [`MAX_SESSION_ID_LEN`].
    pub fn new(neuron_position: usize, session_id: impl Into<String>) -> Result<Self> {
        let session_id = session_id.into();
        if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
            return Err(MeiError::invalid_parameter(format!(
                "session id '{}' must have between 1 and {} characters",
                session_id, MAX_SESSION_ID_LEN
            )));
        }
        Ok(Self {
            neuron_position,
            session_id,
        })
    }
}

/// Table of neuron mappings keyed by dataset and neuron.
#[derive(Debug, Clone, Default)]
pub struct NeuronSelector {
    entries: BTreeMap<SelectorKey, NeuronMapping>,
}

impl NeuronSelector {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts one row.
    pub fn insert(&mut self, key: SelectorKey, mapping: NeuronMapping) -> Result<()> {
        if self.entries.contains_key(&key) {
            return Err(MeiError::duplicate_entry(key.to_string()));
        }
        self.entries.insert(key, mapping);
        Ok(())
    }

    /// Inserts one row per `(neuron_id, mapping)` of a dataset.
    ///
    /// Nothing is inserted if any row is rejected.
    pub fn populate<I>(&mut self, dataset_hash: &str, mappings: I) -> Result<usize>
    where
        I: IntoIterator<Item = (u32, NeuronMapping)>,
    {
        let rows: Vec<_> = mappings
            .into_iter()
            .map(|(neuron_id, mapping)| (SelectorKey::new(dataset_hash, neuron_id), mapping))
            .collect();

        let mut seen = std::collections::BTreeSet::new();
        for (key, _) in &rows {
            if self.entries.contains_key(key) || !seen.insert(key) {
                return Err(MeiError::duplicate_entry(key.to_string()));
            }
        }

        let count = rows.len();
        self.entries.extend(rows);
        Ok(count)
    }

    /// Looks up the mapping of a neuron.
    pub fn get(&self, key: &SelectorKey) -> Result<&NeuronMapping> {
        self.entries
            .get(key)
            .ok_or_else(|| MeiError::not_found(format!("selector {}", key)))
    }

    /// Wraps `model` so that it returns only the selected neuron's response.
    pub fn get_output_selected_model<T: Scalar>(
        &self,
        model: Arc<dyn SessionModel<T>>,
        key: &SelectorKey,
    ) -> Result<OutputSelectedModel<T>> {
        let mapping = self.get(key)?;
        let available = model.num_neurons(&mapping.session_id)?;
        if mapping.neuron_position >= available {
            return Err(MeiError::invalid_parameter(format!(
                "neuron position {} out of range for session {} with {} neurons",
                mapping.neuron_position, mapping.session_id, available
            )));
        }
        Ok(OutputSelectedModel {
            model,
            neuron_position: mapping.neuron_position,
            session_id: mapping.session_id.clone(),
        })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A session model restricted to one output neuron.
#[derive(Debug, Clone)]
pub struct OutputSelectedModel<T: Scalar> {
    model: Arc<dyn SessionModel<T>>,
    neuron_position: usize,
    session_id: String,
}

impl<T: Scalar> OutputSelectedModel<T> {
    /// Wraps `model` without consulting a selector table.
    pub fn new(
        model: Arc<dyn SessionModel<T>>,
        neuron_position: usize,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            model,
            neuron_position,
            session_id: session_id.into(),
        }
    }

    /// The selected position.
    pub fn neuron_position(&self) -> usize {
        self.neuron_position
    }

    /// The session evaluated.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl<T: Scalar> DifferentiableFunction<T> for OutputSelectedModel<T> {
    fn evaluate(&self, graph: &Graph<T>, input: NodeId) -> Result<NodeId> {
        let responses = self
            .model
            .evaluate_session(graph, input, &self.session_id)?;
        graph.select(responses, self.neuron_position)
    }
}
