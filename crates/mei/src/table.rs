//! The table of generated MEIs.

use crate::loader::{ModelKey, ModelLoader};
use crate::method::MethodTable;
use crate::registry::StrategyRegistry;
use crate::selector::{NeuronSelector, SelectorKey};
use crate::storage::{artifact_name, decode_mei, encode_mei, ArtifactStore};
use mei_core::{MeiError, Result, Scalar, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

/// Primary key of a generated MEI.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MeiKey {
    /// Method used to generate the MEI
    pub method_id: u8,
    /// Trained model the MEI maximizes
    pub model_id: ModelKey,
    /// Neuron whose response is maximized
    pub selector_id: SelectorKey,
}

impl MeiKey {
    /// Creates a key.
    pub fn new(method_id: u8, model_id: ModelKey, selector_id: SelectorKey) -> Self {
        Self {
            method_id,
            model_id,
            selector_id,
        }
    }
}

impl fmt::Display for MeiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "method {}, model {}, {}",
            self.method_id, self.model_id, self.selector_id
        )
    }
}

/// A row of the MEI table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeiRecord {
    /// Primary key
    pub key: MeiKey,
    /// Model response at every iteration
    pub evaluations: Vec<f64>,
    /// Name of the stored MEI artifact
    pub artifact: String,
}

/// Generates MEIs and keeps one record per key.
///
/// The table owns its collaborators: the stored methods, the neuron
/// selector, the model loader, the strategy registry and the artifact store.
pub struct MeiTable<T: Scalar> {
    methods: MethodTable,
    selector: NeuronSelector,
    loader: ModelLoader<T>,
    registry: StrategyRegistry<T>,
    store: Box<dyn ArtifactStore>,
    records: BTreeMap<MeiKey, MeiRecord>,
    seed: u64,
}

impl<T> MeiTable<T>
where
    T: Scalar + Serialize + DeserializeOwned,
{
    /// Creates an empty table.
    pub fn new(
        methods: MethodTable,
        selector: NeuronSelector,
        loader: ModelLoader<T>,
        registry: StrategyRegistry<T>,
        store: Box<dyn ArtifactStore>,
    ) -> Self {
        Self {
            methods,
            selector,
            loader,
            registry,
            store,
            records: BTreeMap::new(),
            seed: 0,
        }
    }

    /// Sets the seed of the initial guesses.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Generates the MEI of `key`, stores it and inserts its record.
    pub fn make(&mut self, key: &MeiKey) -> Result<&MeiRecord> {
        if self.records.contains_key(key) {
            return Err(MeiError::duplicate_entry(key.to_string()));
        }
        if key.model_id.dataset_hash != key.selector_id.dataset_hash {
            return Err(MeiError::invalid_parameter(format!(
                "model dataset {} does not match selector dataset {}",
                key.model_id.dataset_hash, key.selector_id.dataset_hash
            )));
        }

        let method = self.methods.get(key.method_id)?;
        let (dataloaders, model) = self.loader.load(&key.model_id)?;
        let model = self
            .selector
            .get_output_selected_model(model, &key.selector_id)?;

        let mut rng = StdRng::seed_from_u64(key_seed(self.seed, key)?);
        let result = method.generate_mei(&self.registry, &dataloaders, &model, &mut rng)?;

        let mei = result.mei.squeeze();
        let artifact = artifact_name(key)?;
        self.store.put(&artifact, &encode_mei(&mei)?)?;

        let evaluations: Vec<f64> = result
            .evaluations
            .iter()
            .map(|&v| Scalar::to_f64(v))
            .collect();
        info!(
            mei = %key,
            artifact = %artifact,
            final_evaluation = evaluations.last().copied(),
            duration_ms = result.duration.as_millis() as u64,
            "Inserted MEI"
        );

        let record = MeiRecord {
            key: key.clone(),
            evaluations,
            artifact,
        };
        Ok(self.records.entry(key.clone()).or_insert(record))
    }

    /// Makes every key that has no record yet. Returns how many were made.
    ///
    /// Stops at the first failure.
    pub fn populate<'a, I>(&mut self, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a MeiKey>,
    {
        let mut made = 0;
        for key in keys {
            if self.records.contains_key(key) {
                continue;
            }
            self.make(key)?;
            made += 1;
        }
        Ok(made)
    }

    /// The record of `key`.
    pub fn get(&self, key: &MeiKey) -> Result<&MeiRecord> {
        self.records
            .get(key)
            .ok_or_else(|| MeiError::not_found(format!("MEI {}", key)))
    }

    /// Loads the stored MEI of `key`.
    pub fn fetch_mei(&self, key: &MeiKey) -> Result<Tensor<T>> {
        let record = self.get(key)?;
        decode_mei(&self.store.get(&record.artifact)?)
    }

    /// All records in key order.
    pub fn records(&self) -> impl Iterator<Item = &MeiRecord> {
        self.records.values()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The model loader.
    pub fn loader(&self) -> &ModelLoader<T> {
        &self.loader
    }

    /// The artifact store.
    pub fn store(&self) -> &dyn ArtifactStore {
        self.store.as_ref()
    }
}

/// Seed of the initial guess of `key`: the table seed mixed with the key's digest.
fn key_seed(seed: u64, key: &MeiKey) -> Result<u64> {
    let encoded = serde_json::to_vec(key).map_err(MeiError::serialization)?;
    let digest = Sha256::digest(&encoded);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    Ok(seed ^ u64::from_le_bytes(prefix))
}

impl<T: Scalar> fmt::Debug for MeiTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeiTable")
            .field("methods", &self.methods.len())
            .field("selector", &self.selector.len())
            .field("loader", &self.loader)
            .field("store", &self.store)
            .field("records", &self.records.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{Dataloaders, LoadedModel, TrainedModelSource};
    use crate::method::MeiMethod;
    use crate::model::{LinearNonlinearModel, Nonlinearity};
    use crate::selector::NeuronMapping;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    #[derive(Debug)]
    struct SingleModel;

    impl TrainedModelSource<f64> for SingleModel {
        fn load_model(&self, key: &ModelKey) -> Result<LoadedModel<f64>> {
            if key.ensemble_id != 0 {
                return Err(MeiError::not_found(key.to_string()));
            }
            let filters = vec![
                Tensor::from_fn(&[1, 1, 3, 3], |i| i as f64 / 9.0 - 0.5),
                Tensor::from_fn(&[1, 1, 3, 3], |i| 0.5 - i as f64 / 9.0),
            ];
            let model = LinearNonlinearModel::new(Nonlinearity::Softplus)
                .with_session("s1", filters, vec![0.0, 0.0])?;
            Ok((
                Dataloaders::new().with_session("s1", vec![16, 1, 3, 3]),
                Arc::new(model),
            ))
        }
    }

    fn table() -> MeiTable<f64> {
        let registry = StrategyRegistry::new();
        let mut methods = MethodTable::new();
        let mut method = MeiMethod::new(1);
        method.num_iterations = 10;
        method.post_update = Some(r#"clamp_range:{"min": -1.0, "max": 1.0}"#.into());
        methods.insert(method, &registry).unwrap();

        let mut selector = NeuronSelector::new();
        selector
            .populate(
                "abc",
                vec![
                    (10, NeuronMapping::new(0, "s1").unwrap()),
                    (11, NeuronMapping::new(1, "s1").unwrap()),
                ],
            )
            .unwrap();

        MeiTable::new(
            methods,
            selector,
            ModelLoader::new(Box::new(SingleModel), 2),
            registry,
            Box::new(MemoryStore::new()),
        )
    }

    fn key(neuron_id: u32) -> MeiKey {
        MeiKey::new(1, ModelKey::new("abc", 0), SelectorKey::new("abc", neuron_id))
    }

    #[test]
    fn test_make_inserts_record_and_artifact() {
        let mut table = table();
        let record = table.make(&key(10)).unwrap().clone();
        assert_eq!(record.evaluations.len(), 10);
        assert_eq!(record.artifact, artifact_name(&key(10)).unwrap());
        assert!(table.store().contains(&record.artifact));

        let mei = table.fetch_mei(&key(10)).unwrap();
        assert_eq!(mei.shape(), &[3, 3]);
        assert!(mei.as_slice().iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let mut table = table();
        table.make(&key(10)).unwrap();
        assert!(matches!(
            table.make(&key(10)),
            Err(MeiError::DuplicateEntry { .. })
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_missing_references() {
        let mut table = table();
        let unknown_method = MeiKey::new(9, ModelKey::new("abc", 0), SelectorKey::new("abc", 10));
        assert!(matches!(table.make(&unknown_method), Err(MeiError::NotFound { .. })));

        let unknown_neuron = key(99);
        assert!(matches!(table.make(&unknown_neuron), Err(MeiError::NotFound { .. })));

        let mismatched = MeiKey::new(1, ModelKey::new("abc", 0), SelectorKey::new("xyz", 10));
        assert!(matches!(
            table.make(&mismatched),
            Err(MeiError::InvalidParameter { .. })
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_each_key_gets_its_own_seed() {
        assert_eq!(key_seed(0, &key(10)).unwrap(), key_seed(0, &key(10)).unwrap());
        assert_ne!(key_seed(0, &key(10)).unwrap(), key_seed(0, &key(11)).unwrap());
        assert_ne!(key_seed(0, &key(10)).unwrap(), key_seed(1, &key(10)).unwrap());

        let other_method = MeiKey::new(2, ModelKey::new("abc", 0), SelectorKey::new("abc", 10));
        assert_ne!(key_seed(0, &key(10)).unwrap(), key_seed(0, &other_method).unwrap());
    }

    #[test]
    fn test_populate_skips_existing_and_reuses_model() {
        let mut table = table();
        table.make(&key(10)).unwrap();
        let keys = vec![key(10), key(11)];
        assert_eq!(table.populate(&keys).unwrap(), 1);
        assert_eq!(table.populate(&keys).unwrap(), 0);
        assert_eq!(table.records().count(), 2);
        assert_eq!(table.loader().cached(), 1);
    }
}
