//! Artifact storage for generated MEIs.

use mei_core::{MeiError, Result, Scalar, Tensor};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of serialized MEI artifacts.
pub const ARTIFACT_EXTENSION: &str = ".mei.json";

/// Name of the artifact holding the MEI of `entity`: the SHA-256 of its
/// JSON encoding in lowercase hex, followed by [`ARTIFACT_EXTENSION`].
pub fn artifact_name<K: Serialize + ?Sized>(entity: &K) -> Result<String> {
    let encoded = serde_json::to_vec(entity).map_err(MeiError::serialization)?;
    let digest = Sha256::digest(&encoded);
    let mut name = String::with_capacity(digest.len() * 2 + ARTIFACT_EXTENSION.len());
    for byte in digest {
        // Writing to a String cannot fail.
        let _ = write!(name, "{:02x}", byte);
    }
    name.push_str(ARTIFACT_EXTENSION);
    Ok(name)
}

/// Serializes an MEI tensor.
pub fn encode_mei<T: Scalar + Serialize>(mei: &Tensor<T>) -> Result<Vec<u8>> {
    serde_json::to_vec(mei).map_err(MeiError::serialization)
}

/// Deserializes an MEI tensor.
pub fn decode_mei<T: Scalar + DeserializeOwned>(bytes: &[u8]) -> Result<Tensor<T>> {
    serde_json::from_slice(bytes).map_err(MeiError::serialization)
}

/// Named blob storage.
pub trait ArtifactStore: fmt::Debug {
    /// Stores `bytes` under `name`, replacing any previous content.
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Reads the artifact stored under `name`.
    fn get(&self, name: &str) -> Result<Vec<u8>>;

    /// Whether an artifact named `name` exists.
    fn contains(&self, name: &str) -> bool;
}

/// Stores artifacts as files in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Opens `root`, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| MeiError::storage(root.display().to_string(), e))?;
        Ok(Self { root })
    }

    /// The directory holding the artifacts.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && Path::new(name).file_name().is_some_and(|file| file == name);
        if !valid {
            return Err(MeiError::invalid_parameter(format!(
                "invalid artifact name '{}'",
                name
            )));
        }
        Ok(self.root.join(name))
    }
}

impl ArtifactStore for DirectoryStore {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(name)?;
        fs::write(&path, bytes).map_err(|e| MeiError::storage(path.display().to_string(), e))
    }

    fn get(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path(name)?;
        fs::read(&path).map_err(|e| MeiError::storage(path.display().to_string(), e))
    }

    fn contains(&self, name: &str) -> bool {
        self.path(name).map(|path| path.is_file()).unwrap_or(false)
    }
}

/// Keeps artifacts in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    artifacts: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts.
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl ArtifactStore for MemoryStore {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.artifacts.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>> {
        self.artifacts
            .get(name)
            .cloned()
            .ok_or_else(|| MeiError::not_found(format!("artifact {}", name)))
    }

    fn contains(&self, name: &str) -> bool {
        self.artifacts.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Entity {
        method_id: u8,
        neuron_id: u32,
    }

    #[test]
    fn test_artifact_name_is_stable() {
        let a = artifact_name(&Entity { method_id: 1, neuron_id: 2 }).unwrap();
        let b = artifact_name(&Entity { method_id: 1, neuron_id: 2 }).unwrap();
        let c = artifact_name(&Entity { method_id: 1, neuron_id: 3 }).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with(ARTIFACT_EXTENSION));
        assert_eq!(a.len(), 64 + ARTIFACT_EXTENSION.len());
        assert!(a[..64].chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn test_known_digest() {
        // SHA-256 of the two bytes `{}`
        assert_eq!(
            artifact_name(&serde_json::json!({})).unwrap(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a.mei.json"
        );
    }

    #[test]
    fn test_directory_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirectoryStore::new(dir.path().join("meis")).unwrap();
        assert!(!store.contains("a.mei.json"));

        store.put("a.mei.json", b"[1, 2]").unwrap();
        assert!(store.contains("a.mei.json"));
        assert_eq!(store.get("a.mei.json").unwrap(), b"[1, 2]".to_vec());
        assert!(matches!(
            store.get("b.mei.json"),
            Err(MeiError::Storage { .. })
        ));
        assert!(store.put("../escape", b"").is_err());
        assert!(store.put("", b"").is_err());
    }

    #[test]
    fn test_tensor_codec() {
        let mei = Tensor::from_vec(vec![2, 2], vec![1.0_f64, -2.0, 0.5, 3.25]).unwrap();
        let bytes = encode_mei(&mei).unwrap();
        let decoded: Tensor<f64> = decode_mei(&bytes).unwrap();
        assert_eq!(decoded, mei);
        assert!(decode_mei::<f64>(b"not json").is_err());
    }
}
