//! JSON type manifests.
//!
//! ```json
//! {
//!   "types": [
//!     { "name": "org.example.Concept", "abstract": true },
//!     { "name": "org.example.Drug", "extends": ["org.example.Concept"], "capability": "retirable" }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::def::TypeDef;
use super::registry::TypeSource;
use crate::error::ScanError;

#[derive(Debug, Deserialize)]
struct Manifest {
    types: Vec<TypeDef>,
}

/// Type source backed by a manifest file on disk.
///
/// The file is re-read on every scan, so a new resolution session picks up
/// edits made since the previous one.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    path: PathBuf,
}

impl ManifestSource {
    /// Create a source reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Manifest location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse manifest contents.
    pub fn parse(contents: &str) -> Result<Vec<TypeDef>, ScanError> {
        let manifest: Manifest =
            serde_json::from_str(contents).map_err(|e| ScanError::Manifest(e.to_string()))?;
        Ok(manifest.types)
    }
}

impl TypeSource for ManifestSource {
    fn scan(&self) -> Result<Vec<TypeDef>, ScanError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|source| ScanError::Io {
            path: self.path.clone(),
            source,
        })?;

        let types = Self::parse(&contents)?;
        tracing::debug!(path = %self.path.display(), types = types.len(), "type manifest scanned");
        Ok(types)
    }
}
