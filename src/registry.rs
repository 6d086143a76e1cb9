//! Registry Client
//!
//! Fetches the expected extension tree of an application from its source of truth. A missing
//! application is `Ok(None)`; only transport or document failures are errors.

use crate::error::RegistryError;
use crate::types::{ApplicationId, RegistryNode};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub trait RegistryClient: Send + Sync {
    fn compute_expected_tree(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<RegistryNode>, RegistryError>;
}

/// Parses a registry document. TOML when `path` ends in `.toml`, JSON otherwise.
pub fn parse_document(bytes: &[u8], path: &Path) -> Result<RegistryNode, RegistryError> {
    let invalid = |reason: String| {
        RegistryError::InvalidDocument(format!("{}: {}", path.display(), reason))
    };
    let tree: RegistryNode = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            let text = std::str::from_utf8(bytes).map_err(|e| invalid(e.to_string()))?;
            toml::from_str(text).map_err(|e| invalid(e.to_string()))?
        }
        _ => serde_json::from_slice(bytes).map_err(|e| invalid(e.to_string()))?,
    };
    tree.validate().map_err(|e| invalid(e.to_string()))?;
    Ok(tree)
}

/// Registry backed by a directory of `<application-id>.json` / `<application-id>.toml` documents.
pub struct FileRegistryClient {
    root: PathBuf,
}

impl FileRegistryClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn document_path(&self, application_id: &ApplicationId) -> Option<PathBuf> {
        ["json", "toml"]
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", application_id, ext)))
            .find(|path| path.is_file())
    }

    /// Writes `tree` as the JSON document of `application_id`.
    pub fn publish(
        &self,
        application_id: &ApplicationId,
        tree: &RegistryNode,
    ) -> Result<PathBuf, RegistryError> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join(format!("{}.json", application_id));
        let bytes = serde_json::to_vec_pretty(tree)
            .map_err(|e| RegistryError::InvalidDocument(e.to_string()))?;
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

impl RegistryClient for FileRegistryClient {
    fn compute_expected_tree(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<RegistryNode>, RegistryError> {
        if !self.root.is_dir() {
            return Err(RegistryError::Unreachable(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        let Some(path) = self.document_path(application_id) else {
            debug!(application = %application_id, "No registry document");
            return Ok(None);
        };
        let bytes = std::fs::read(&path)?;
        parse_document(&bytes, &path).map(Some)
    }
}

/// Registry served over HTTP: `GET {base}/applications/{id}/tree` returns the JSON document.
pub struct HttpRegistryClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpRegistryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RegistryError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn tree_url(&self, application_id: &ApplicationId) -> String {
        format!("{}/applications/{}/tree", self.base_url, application_id)
    }
}

impl RegistryClient for HttpRegistryClient {
    fn compute_expected_tree(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<RegistryNode>, RegistryError> {
        let url = self.tree_url(application_id);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(RegistryError::Unreachable(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;
        parse_document(&bytes, Path::new("tree.json")).map(Some)
    }
}

/// In-memory registry, for embedding and tests.
#[derive(Default)]
pub struct StaticRegistryClient {
    trees: RwLock<HashMap<ApplicationId, RegistryNode>>,
}

impl StaticRegistryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(self, tree: RegistryNode) -> Self {
        self.set(tree);
        self
    }

    /// Replaces the expected tree of the application rooted at `tree.id`.
    pub fn set(&self, tree: RegistryNode) {
        self.trees.write().insert(tree.id, tree);
    }

    pub fn clear(&self, application_id: &ApplicationId) {
        self.trees.write().remove(application_id);
    }
}

impl RegistryClient for StaticRegistryClient {
    fn compute_expected_tree(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<RegistryNode>, RegistryError> {
        Ok(self.trees.read().get(application_id).cloned())
    }
}
