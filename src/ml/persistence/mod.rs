use std::path::PathBuf;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::error::SignalError;
use crate::ml::model::ModelArtifact;
use crate::types::TimeFrame;

/// Durable slots for trained artifacts, keyed by (symbol, interval).
/// Implementations must tolerate concurrent saves to distinct keys.
#[cfg_attr(test, automock)]
pub trait ModelStore: Send + Sync {
    fn exists(&self, symbol: &str, timeframe: TimeFrame) -> bool;
    fn load(&self, symbol: &str, timeframe: TimeFrame) -> Result<ModelArtifact, SignalError>;
    fn save(&self, symbol: &str, timeframe: TimeFrame, artifact: &ModelArtifact) -> Result<(), SignalError>;
}

/// One JSON file per slot under `models_dir`.
pub struct FileModelStore {
    models_dir: PathBuf,
}

impl FileModelStore {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self { models_dir: models_dir.into() }
    }

    pub fn ensure_models_dir(&self) -> Result<(), SignalError> {
        std::fs::create_dir_all(&self.models_dir)
            .map_err(|e| SignalError::Store(format!("create {}: {}", self.models_dir.display(), e)))
    }

    fn model_path(&self, symbol: &str, timeframe: TimeFrame) -> PathBuf {
        self.models_dir.join(format!("{}_{}.json", symbol.to_uppercase(), timeframe.as_str()))
    }
}

impl ModelStore for FileModelStore {
    fn exists(&self, symbol: &str, timeframe: TimeFrame) -> bool {
        self.model_path(symbol, timeframe).is_file()
    }

    fn load(&self, symbol: &str, timeframe: TimeFrame) -> Result<ModelArtifact, SignalError> {
        let path = self.model_path(symbol, timeframe);
        let data = std::fs::read(&path)
            .map_err(|e| SignalError::ModelLoad(format!("read {}: {}", path.display(), e)))?;
        let artifact: ModelArtifact = serde_json::from_slice(&data)
            .map_err(|e| SignalError::ModelLoad(format!("decode {}: {}", path.display(), e)))?;
        debug!("Loaded {} model for {} @ {} from {}", artifact.model_type(), symbol, timeframe, path.display());
        Ok(artifact)
    }

    /// Writes to a temporary sibling and renames it over the slot, so a reader
    /// never sees a half-written artifact and the old one survives a failed write.
    fn save(&self, symbol: &str, timeframe: TimeFrame, artifact: &ModelArtifact) -> Result<(), SignalError> {
        self.ensure_models_dir()?;
        let path = self.model_path(symbol, timeframe);
        let tmp = path.with_extension("json.tmp");

        let data = serde_json::to_vec(artifact)
            .map_err(|e| SignalError::Store(format!("encode artifact: {}", e)))?;
        std::fs::write(&tmp, data)
            .map_err(|e| SignalError::Store(format!("write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| SignalError::Store(format!("rename to {}: {}", path.display(), e)))?;

        info!("Saved {} model for {} @ {} to {}", artifact.model_type(), symbol, timeframe, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::test_support::trained_artifact;
    use tempfile::tempdir;

    #[test]
    fn test_missing_slot() {
        let dir = tempdir().unwrap();
        let store = FileModelStore::new(dir.path());
        assert!(!store.exists("BTCUSDT", TimeFrame::H1));
        let err = store.load("BTCUSDT", TimeFrame::H1).err().unwrap();
        assert_eq!(err.kind(), "model_load");
    }

    #[test]
    fn test_save_then_load_keeps_class_table() {
        let dir = tempdir().unwrap();
        let store = FileModelStore::new(dir.path().join("models"));
        let artifact = trained_artifact(true);

        store.save("ethusdt", TimeFrame::H4, &artifact).unwrap();
        assert!(store.exists("ETHUSDT", TimeFrame::H4));
        assert!(!store.exists("ETHUSDT", TimeFrame::H1));
        assert!(dir.path().join("models/ETHUSDT_4h.json").is_file());
        assert!(!dir.path().join("models/ETHUSDT_4h.json.tmp").exists());

        let loaded = store.load("ETHUSDT", TimeFrame::H4).unwrap();
        assert_eq!(loaded.classes, artifact.classes);
        assert_eq!(loaded.trained_at, artifact.trained_at);
        assert_eq!(loaded.model_type(), artifact.model_type());
    }

    #[test]
    fn test_corrupt_slot_is_load_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("BTCUSDT_1h.json"), b"{not json").unwrap();
        let store = FileModelStore::new(dir.path());
        assert!(store.exists("BTCUSDT", TimeFrame::H1));
        assert!(matches!(store.load("BTCUSDT", TimeFrame::H1), Err(SignalError::ModelLoad(_))));
    }

    #[test]
    fn test_legacy_artifact_without_class_table_loads() {
        let dir = tempdir().unwrap();
        let store = FileModelStore::new(dir.path());
        store.save("SOLUSDT", TimeFrame::H1, &trained_artifact(false)).unwrap();

        let path = dir.path().join("SOLUSDT_1h.json");
        let mut json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        json.as_object_mut().unwrap().remove("classes");
        std::fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let loaded = store.load("SOLUSDT", TimeFrame::H1).unwrap();
        assert!(loaded.classes.is_empty());
        assert_eq!(loaded.n_classes, 3);
    }
}
