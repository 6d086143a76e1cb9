//! Persistence layer for the extension State Store

use crate::error::StorageError;
use crate::store::{ApplicationRecord, ExtensionRecord, StateStore};
use crate::types::{ApplicationId, ExtensionId, ExtensionNode};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use tracing::debug;

const EXTENSIONS_TREE: &str = "extensions";
const APPLICATIONS_TREE: &str = "applications";

/// Sled-based implementation of StateStore
///
/// Two trees: `extensions` (extension id -> bincode [`ExtensionRecord`]) and `applications`
/// (application id -> bincode [`ApplicationRecord`]).
pub struct SledStateStore {
    db: sled::Db,
    extensions: sled::Tree,
    applications: sled::Tree,
}

impl SledStateStore {
    /// Open (or create) the store at the given directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(to_storage_io)?;
        let extensions = db.open_tree(EXTENSIONS_TREE).map_err(to_storage_io)?;
        let applications = db.open_tree(APPLICATIONS_TREE).map_err(to_storage_io)?;
        Ok(Self {
            db,
            extensions,
            applications,
        })
    }

    /// Underlying database, shared with the run history.
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    pub fn application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, StorageError> {
        match self
            .applications
            .get(application_id.as_bytes())
            .map_err(to_storage_io)?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn record(&self, id: &ExtensionId) -> Result<Option<ExtensionRecord>, StorageError> {
        match self.extensions.get(id.as_bytes()).map_err(to_storage_io)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Ids of every record reachable from `root` in the stored tree, each once.
    fn stored_ids(&self, root: &ExtensionId) -> Result<Vec<ExtensionId>, StorageError> {
        let mut ids = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![*root];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(record) = self.record(&id)? {
                stack.extend(record.children.iter().copied());
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_io)?;
        Ok(())
    }
}

impl StateStore for SledStateStore {
    fn load(&self, application_id: &ApplicationId) -> Result<Option<ExtensionNode>, StorageError> {
        let Some(application) = self.application(application_id)? else {
            return Ok(None);
        };
        let mut records = HashMap::with_capacity(application.extension_count);
        let mut stack = vec![application.root];
        while let Some(id) = stack.pop() {
            if records.contains_key(&id) {
                return Err(StorageError::CorruptRecord(format!(
                    "extension {} is reachable twice from application {}",
                    id, application_id
                )));
            }
            let record = self
                .record(&id)?
                .ok_or(StorageError::ExtensionNotFound(id))?;
            stack.extend(record.children.iter().copied());
            records.insert(id, record);
        }
        let root = ExtensionRecord::assemble(&application.root, &records)?;
        debug!(application = %application_id, extensions = records.len(), "Loaded saved tree");
        Ok(Some(root))
    }

    fn save(&self, root: &ExtensionNode) -> Result<(), StorageError> {
        root.validate()
            .map_err(|e| StorageError::CorruptRecord(e.to_string()))?;

        let records = ExtensionRecord::flatten(root);
        let mut batch = sled::Batch::default();

        // Drop records of extensions that are no longer part of the tree.
        if self.application(&root.id)?.is_some() {
            let kept: HashSet<ExtensionId> =
                records.iter().map(|r| r.id).collect();
            for stale in self.stored_ids(&root.id)? {
                if !kept.contains(&stale) {
                    batch.remove(stale.as_bytes().to_vec());
                }
            }
        }
        for record in &records {
            batch.insert(record.id.as_bytes().to_vec(), encode(record)?);
        }
        self.extensions.apply_batch(batch).map_err(to_storage_io)?;

        let application = ApplicationRecord {
            application_id: root.id,
            root: root.id,
            extension_count: records.len(),
            saved_at: Utc::now(),
        };
        self.applications
            .insert(root.id.as_bytes(), encode(&application)?)
            .map_err(to_storage_io)?;
        self.flush()?;
        debug!(application = %root.id, extensions = records.len(), "Saved tree");
        Ok(())
    }

    fn remove(&self, application_id: &ApplicationId) -> Result<bool, StorageError> {
        if self.application(application_id)?.is_none() {
            return Ok(false);
        }
        let mut batch = sled::Batch::default();
        for id in self.stored_ids(application_id)? {
            batch.remove(id.as_bytes().to_vec());
        }
        self.extensions.apply_batch(batch).map_err(to_storage_io)?;
        self.applications
            .remove(application_id.as_bytes())
            .map_err(to_storage_io)?;
        self.flush()?;
        Ok(true)
    }

    fn applications(&self) -> Result<Vec<ApplicationRecord>, StorageError> {
        let mut found = Vec::new();
        for item in self.applications.iter() {
            let (_, value) = item.map_err(to_storage_io)?;
            found.push(decode::<ApplicationRecord>(&value)?);
        }
        found.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(found)
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(to_storage_data)
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::CorruptRecord(e.to_string()))
}

fn to_storage_io(err: sled::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::Other, err.to_string()))
}

fn to_storage_data(err: bincode::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Coordinate, LoadState};
    use tempfile::TempDir;

    fn sample_tree() -> ExtensionNode {
        let mut child = ExtensionNode::new(
            ExtensionId::new(),
            None,
            Coordinate::new("org.example", "billing", Some("2.1")),
        );
        child.load_state = LoadState::Error;
        child.messages = vec![
            "Artifact not found: org.example:billing:2.1".to_string(),
            "retried offline".to_string(),
        ];
        child.sealed = true;

        let mut root = ExtensionNode::new(
            ExtensionId::new(),
            None,
            Coordinate::new("org.example", "app", Some("1.0")),
        );
        root.load_state = LoadState::Running;
        root.with_child(child)
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = SledStateStore::new(temp_dir.path()).unwrap();
        let tree = sample_tree();

        store.save(&tree).unwrap();
        let loaded = store.load(&tree.id).unwrap().unwrap();

        assert_eq!(loaded.id, tree.id);
        assert_eq!(loaded.load_state, LoadState::Running);
        let child = &loaded.children[0];
        assert_eq!(child.parent_id, Some(tree.id));
        assert_eq!(child.coordinate, tree.children[0].coordinate);
        assert_eq!(child.load_state, LoadState::Error);
        assert_eq!(child.messages, tree.children[0].messages);
        assert!(child.sealed);
        assert_eq!(loaded, tree);
    }

    #[test]
    fn test_load_unknown_application() {
        let temp_dir = TempDir::new().unwrap();
        let store = SledStateStore::new(temp_dir.path()).unwrap();
        assert!(store.load(&ExtensionId::new()).unwrap().is_none());
    }

    #[test]
    fn test_resave_drops_removed_extensions() {
        let temp_dir = TempDir::new().unwrap();
        let store = SledStateStore::new(temp_dir.path()).unwrap();
        let mut tree = sample_tree();
        store.save(&tree).unwrap();

        let removed = tree.children.remove(0);
        store.save(&tree).unwrap();

        let loaded = store.load(&tree.id).unwrap().unwrap();
        assert!(loaded.children.is_empty());
        assert!(store.record(&removed.id).unwrap().is_none());
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let tree = sample_tree();
        {
            let store = SledStateStore::new(temp_dir.path()).unwrap();
            store.save(&tree).unwrap();
        }
        let store = SledStateStore::new(temp_dir.path()).unwrap();
        assert_eq!(store.load(&tree.id).unwrap().unwrap(), tree);
        assert_eq!(store.applications().unwrap().len(), 1);
    }

    #[test]
    fn test_cyclic_records_are_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let store = SledStateStore::new(temp_dir.path()).unwrap();
        let tree = sample_tree();
        store.save(&tree).unwrap();

        // The child claims the root as its own child.
        let child_id = tree.children[0].id;
        let mut child = store.record(&child_id).unwrap().unwrap();
        child.children.push(tree.id);
        store
            .extensions
            .insert(child_id.as_bytes(), encode(&child).unwrap())
            .unwrap();

        assert!(matches!(
            store.load(&tree.id),
            Err(StorageError::CorruptRecord(_))
        ));
        // Saving a sound tree over the cycle repairs it.
        store.save(&tree).unwrap();
        assert_eq!(store.load(&tree.id).unwrap().unwrap(), tree);
    }

    #[test]
    fn test_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = SledStateStore::new(temp_dir.path()).unwrap();
        let tree = sample_tree();
        store.save(&tree).unwrap();

        assert!(store.remove(&tree.id).unwrap());
        assert!(!store.remove(&tree.id).unwrap());
        assert!(store.load(&tree.id).unwrap().is_none());
    }
}
