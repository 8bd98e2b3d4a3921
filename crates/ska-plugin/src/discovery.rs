//! Plugin archive discovery.
//!
//! A plugin directory holds one sub-directory per plugin, each with a
//! `plugin.toml` manifest:
//!
//! ```toml
//! id = "activity"
//! version = "1.0.0"
//! description = "Rejects activity requests after the campaign expires"
//! entry = "activity"
//! dependencies = []
//!
//! [properties]
//! expire_time = "2030-12-31 23:59:59"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::descriptor::{ArchiveRef, PluginManifest};
use crate::error::LoadError;
use crate::registry::validate_plugin_id;

/// Manifest file name inside a plugin directory.
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Where the manager finds plugin archives.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Lists the available archives, dependencies before dependents.
    async fn discover(&self) -> Result<Vec<ArchiveRef>, LoadError>;
}

/// Reads and validates a manifest file.
pub fn read_manifest(path: &Path) -> Result<PluginManifest, LoadError> {
    let malformed = |reason: String| LoadError::MalformedArchive {
        archive: path.display().to_string(),
        reason,
    };

    let manifest: PluginManifest = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Toml))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| malformed(e.to_string()))?;

    if validate_plugin_id(&manifest.id).is_err() {
        return Err(LoadError::InvalidPluginId(manifest.id));
    }
    if manifest.version.trim().is_empty() {
        return Err(malformed("version must not be empty".to_string()));
    }
    if manifest.entry.trim().is_empty() {
        return Err(malformed("entry must not be empty".to_string()));
    }
    Ok(manifest)
}

/// Orders archives so that every archive comes after the archives it
/// depends on. Ties and anything caught in a cycle or depending on an
/// unknown plugin keep plugin-id order.
pub fn order_by_dependencies(archives: Vec<ArchiveRef>) -> Vec<ArchiveRef> {
    let mut pending: BTreeMap<String, ArchiveRef> = archives
        .into_iter()
        .map(|a| (a.manifest.id.clone(), a))
        .collect();
    let mut placed: BTreeSet<String> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(pending.len());

    loop {
        let ready: Vec<String> = pending
            .values()
            .filter(|a| {
                a.manifest
                    .dependencies
                    .iter()
                    .all(|dep| placed.contains(dep))
            })
            .map(|a| a.manifest.id.clone())
            .collect();
        if ready.is_empty() {
            break;
        }
        for id in ready {
            if let Some(archive) = pending.remove(&id) {
                placed.insert(id);
                ordered.push(archive);
            }
        }
    }

    ordered.extend(pending.into_values());
    ordered
}

/// Archive source backed by a plugin directory.
#[derive(Debug, Clone)]
pub struct DirectoryArchiveSource {
    root: PathBuf,
}

impl DirectoryArchiveSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scan(root: &Path) -> Result<Vec<ArchiveRef>, LoadError> {
        if !root.exists() {
            warn!(directory = %root.display(), "Plugin directory does not exist");
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(root).map_err(|e| LoadError::MalformedArchive {
            archive: root.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut archives = Vec::new();
        for entry in entries.flatten() {
            let location = entry.path();
            let manifest_path = location.join(MANIFEST_FILE);
            if !manifest_path.is_file() {
                debug!(path = %location.display(), "Skipping entry without manifest");
                continue;
            }
            match read_manifest(&manifest_path) {
                Ok(manifest) => archives.push(ArchiveRef::new(location, manifest)),
                Err(e) => warn!(
                    path = %manifest_path.display(),
                    error = %e,
                    "Skipping malformed plugin archive"
                ),
            }
        }
        Ok(order_by_dependencies(archives))
    }
}

#[async_trait]
impl ArchiveSource for DirectoryArchiveSource {
    async fn discover(&self) -> Result<Vec<ArchiveRef>, LoadError> {
        let root = self.root.clone();
        let archives = tokio::task::spawn_blocking(move || Self::scan(&root))
            .await
            .map_err(|e| LoadError::MalformedArchive {
                archive: self.root.display().to_string(),
                reason: e.to_string(),
            })??;

        info!(
            directory = %self.root.display(),
            count = archives.len(),
            "Plugin archives discovered"
        );
        Ok(archives)
    }
}

/// Archive source over a fixed list, for embedded and test setups.
#[derive(Debug, Clone, Default)]
pub struct StaticArchiveSource {
    archives: Vec<ArchiveRef>,
}

impl StaticArchiveSource {
    pub fn new(archives: Vec<ArchiveRef>) -> Self {
        Self { archives }
    }
}

#[async_trait]
impl ArchiveSource for StaticArchiveSource {
    async fn discover(&self) -> Result<Vec<ArchiveRef>, LoadError> {
        Ok(order_by_dependencies(self.archives.clone()))
    }
}
