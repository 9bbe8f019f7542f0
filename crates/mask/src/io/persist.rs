use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MaskError, Result};

/// Where a persisted collection can be retrieved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersistedLocation {
    Url { url: String },
    Path { path: PathBuf },
    /// Base64 of the compact GeoJSON text
    Inline { base64: String },
}

/// Storage collaborator; the segmentation pipeline never calls one itself.
pub trait FeatureCollectionSink: Send + Sync {
    fn persist(&self, collection: &FeatureCollection, id: &str) -> Result<PersistedLocation>;
}

/// Writes `<root>/<id>.geojson`.
///
/// With a URL prefix the returned location is `<prefix>/<id>.geojson`,
/// otherwise the file path.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
    url_prefix: Option<String>,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), url_prefix: None }
    }

    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = Some(prefix.into().trim_end_matches('/').to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FeatureCollectionSink for DirectorySink {
    fn persist(&self, collection: &FeatureCollection, id: &str) -> Result<PersistedLocation> {
        validate_id(id)?;
        std::fs::create_dir_all(&self.root)?;
        let file_name = format!("{id}.geojson");
        let path = self.root.join(&file_name);
        std::fs::write(&path, serde_json::to_string(collection)?)?;
        info!(path = %path.display(), features = collection.features.len(), "Persisted feature collection");

        Ok(match &self.url_prefix {
            Some(prefix) => PersistedLocation::Url { url: format!("{prefix}/{file_name}") },
            None => PersistedLocation::Path { path },
        })
    }
}

/// Returns the collection inline as base64-encoded compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineSink;

impl InlineSink {
    pub fn encode(collection: &FeatureCollection) -> Result<String> {
        Ok(STANDARD.encode(serde_json::to_string(collection)?))
    }

    pub fn decode(encoded: &str) -> Result<FeatureCollection> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| MaskError::InvalidConfig(format!("invalid base64 payload: {e}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl FeatureCollectionSink for InlineSink {
    fn persist(&self, collection: &FeatureCollection, _id: &str) -> Result<PersistedLocation> {
        Ok(PersistedLocation::Inline { base64: Self::encode(collection)? })
    }
}

fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !id.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(MaskError::InvalidConfig(format!("unsafe destination id: {id:?}")))
    }
}
