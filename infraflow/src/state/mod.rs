//! Persistence of converged state between runs.
//!
//! The engine itself never touches storage: callers load a [`StateMap`],
//! pass it to `apply`, and save whatever comes back (including the partial
//! state carried by a failure).

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::{is_valid_node_id, StateMap};
use crate::errors::{InfraflowError, ValidationError};

/// Storage for per-stack converged state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the state of `stack`; an unknown stack yields an empty map.
    async fn load(&self, stack: &str) -> Result<StateMap, InfraflowError>;

    /// Replaces the stored state of `stack`.
    async fn save(&self, stack: &str, state: &StateMap) -> Result<(), InfraflowError>;
}

/// Process-local state store.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    stacks: DashMap<String, StateMap>,
}

impl InMemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stacks with saved state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    /// Returns true if nothing was saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, stack: &str) -> Result<StateMap, InfraflowError> {
        Ok(self
            .stacks
            .get(stack)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn save(&self, stack: &str, state: &StateMap) -> Result<(), InfraflowError> {
        self.stacks.insert(stack.to_string(), state.clone());
        Ok(())
    }
}

/// State store writing one JSON document per stack into a directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory state files live in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the state file for `stack`.
    #[must_use]
    pub fn path_for(&self, stack: &str) -> PathBuf {
        self.dir.join(format!("{stack}.state.json"))
    }

    /// State file path for `stack`, which must be a plain identifier so it
    /// cannot name a file outside the store directory.
    fn checked_path(&self, stack: &str) -> Result<PathBuf, InfraflowError> {
        if is_valid_node_id(stack) {
            Ok(self.path_for(stack))
        } else {
            Err(ValidationError::new(format!("Invalid stack id '{stack}' for file state store")).into())
        }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, stack: &str) -> Result<StateMap, InfraflowError> {
        let path = self.checked_path(stack)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(stack = %stack, path = %path.display(), "No saved state");
                return Ok(StateMap::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, stack: &str, state: &StateMap) -> Result<(), InfraflowError> {
        let path = self.checked_path(stack)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(state)?;

        // Readers never observe a partially written file.
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(stack = %stack, nodes = state.len(), path = %path.display(), "Saved state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Attributes, LiveHandle, ResourceKind};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn sample_state() -> StateMap {
        let mut attrs = Attributes::new();
        attrs.insert("url".into(), serde_json::json!("ecr.example/java"));
        let mut state = StateMap::new();
        state.insert(
            "java-ecr".into(),
            LiveHandle::new("java-ecr", ResourceKind::Registry, attrs, "abc123"),
        );
        state
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryStateStore::new();
        let state = sample_state();
        assert!(store.load("dev").await.unwrap().is_empty());

        store.save("dev", &state).await.unwrap();

        assert_eq!(store.load("dev").await.unwrap(), state);
        assert!(store.load("prod").await.unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = FileStateStore::new(dir.path().join("state"));
        let state = sample_state();

        assert!(store.load("dev").await?.is_empty());

        store.save("dev", &state).await?;
        assert!(store.path_for("dev").exists());
        assert!(!store.path_for("dev").with_extension("json.tmp").exists());

        let reopened = FileStateStore::new(dir.path().join("state"));
        assert_eq!(reopened.load("dev").await?, state);
        Ok(())
    }

    #[tokio::test]
    async fn test_file_store_rejects_stack_ids_that_escape_the_directory() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("state"));

        for stack in ["../x", "a/b", "", "Dev"] {
            let err = store.save(stack, &sample_state()).await.unwrap_err();
            assert!(matches!(err, InfraflowError::Validation(_)), "{stack}");
            assert!(matches!(store.load(stack).await, Err(InfraflowError::Validation(_))));
        }
        assert!(!dir.path().join("x.state.json").exists());
        assert!(!dir.path().join("state").exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_state() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        std::fs::write(store.path_for("dev"), b"{not json").unwrap();

        let err = store.load("dev").await.unwrap_err();
        assert!(matches!(err, InfraflowError::Serialization(_)));
    }
}
