//! Ensembles of trained models.

use crate::loader::{Dataloaders, LoadedModel, ModelKey, TrainedModelSource};
use crate::model::SessionModel;
use mei_autodiff::{Graph, NodeId, TensorGraph};
use mei_core::{MeiError, Result, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Averages the responses of its members.
#[derive(Debug, Clone)]
pub struct EnsembleModel<T: Scalar> {
    members: Vec<Arc<dyn SessionModel<T>>>,
}

impl<T: Scalar> EnsembleModel<T> {
    /// Creates an ensemble. At least one member is required.
    pub fn new(members: Vec<Arc<dyn SessionModel<T>>>) -> Result<Self> {
        if members.is_empty() {
            return Err(MeiError::invalid_parameter(
                "an ensemble needs at least one member",
            ));
        }
        Ok(Self { members })
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false; construction rejects empty ensembles.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<T: Scalar> SessionModel<T> for EnsembleModel<T> {
    fn evaluate_session(
        &self,
        graph: &Graph<T>,
        input: NodeId,
        session_id: &str,
    ) -> Result<NodeId> {
        let mut total = self.members[0].evaluate_session(graph, input, session_id)?;
        for member in &self.members[1..] {
            let response = member.evaluate_session(graph, input, session_id)?;
            total = graph.add(total, response)?;
        }
        let n = <T as Scalar>::from_usize(self.members.len());
        graph.scale(total, T::one() / n)
    }

    fn num_neurons(&self, session_id: &str) -> Result<usize> {
        let expected = self.members[0].num_neurons(session_id)?;
        for member in &self.members[1..] {
            let actual = member.num_neurons(session_id)?;
            if actual != expected {
                return Err(MeiError::dimension_mismatch(
                    format!("{} neurons", expected),
                    format!("{} neurons", actual),
                ));
            }
        }
        Ok(expected)
    }
}

/// Stored description of a trained ensemble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainedEnsemble {
    /// Hash of the dataset the members were trained on
    pub dataset_hash: String,
    /// Identifier within the dataset
    pub ensemble_id: u8,
    /// Identifiers of the member models
    pub members: Vec<String>,
}

impl TrainedEnsemble {
    /// The model key of this ensemble.
    pub fn key(&self) -> ModelKey {
        ModelKey::new(self.dataset_hash.clone(), self.ensemble_id)
    }
}

/// [`TrainedModelSource`] assembling ensembles from registered members.
pub struct EnsembleSource<T: Scalar> {
    ensembles: BTreeMap<ModelKey, TrainedEnsemble>,
    members: BTreeMap<String, LoadedModel<T>>,
}

impl<T: Scalar> EnsembleSource<T> {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self {
            ensembles: BTreeMap::new(),
            members: BTreeMap::new(),
        }
    }

    /// Registers a trained member model.
    pub fn add_member(
        &mut self,
        member_id: impl Into<String>,
        dataloaders: Dataloaders,
        model: Arc<dyn SessionModel<T>>,
    ) -> Result<()> {
        let member_id = member_id.into();
        if self.members.contains_key(&member_id) {
            return Err(MeiError::duplicate_entry(format!("member {}", member_id)));
        }
        self.members.insert(member_id, (dataloaders, model));
        Ok(())
    }

    /// Registers an ensemble.
    pub fn add_ensemble(&mut self, ensemble: TrainedEnsemble) -> Result<()> {
        let key = ensemble.key();
        if self.ensembles.contains_key(&key) {
            return Err(MeiError::duplicate_entry(key.to_string()));
        }
        if ensemble.members.is_empty() {
            return Err(MeiError::invalid_parameter(format!(
                "ensemble {} has no members",
                key
            )));
        }
        self.ensembles.insert(key, ensemble);
        Ok(())
    }
}

impl<T: Scalar> Default for EnsembleSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> TrainedModelSource<T> for EnsembleSource<T> {
    fn load_model(&self, key: &ModelKey) -> Result<LoadedModel<T>> {
        let ensemble = self
            .ensembles
            .get(key)
            .ok_or_else(|| MeiError::not_found(format!("ensemble {}", key)))?;

        let mut dataloaders: Option<&Dataloaders> = None;
        let mut models = Vec::with_capacity(ensemble.members.len());
        for member_id in &ensemble.members {
            let (member_loaders, model) = self
                .members
                .get(member_id)
                .ok_or_else(|| MeiError::not_found(format!("member {}", member_id)))?;
            match dataloaders {
                Some(first) if first != member_loaders => {
                    return Err(MeiError::invalid_parameter(format!(
                        "member {} of ensemble {} was trained on different inputs",
                        member_id, key
                    )));
                }
                Some(_) => {}
                None => dataloaders = Some(member_loaders),
            }
            models.push(Arc::clone(model));
        }

        let dataloaders = dataloaders.cloned().unwrap_or_default();
        Ok((dataloaders, Arc::new(EnsembleModel::new(models)?)))
    }
}

impl<T: Scalar> fmt::Debug for EnsembleSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnsembleSource")
            .field("ensembles", &self.ensembles.len())
            .field("members", &self.members.len())
            .finish()
    }
}
