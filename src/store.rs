//! Object storage: containers of named byte blobs with overwrite writes.
//!
//! The pipeline only needs three things from storage: overwrite a key, read
//! a key (with a distinguishable "not found"), and produce a URL a client can
//! follow to an artifact. [`ObjectStore`] is exactly that, with a filesystem
//! implementation for real use and an in-memory one for tests.
//!
//! ## Artifact naming
//!
//! Artifact keys are derived from the document name by replacing its last
//! extension with a fixed suffix (`form.pdf` → `form_report.json`). A
//! status-polling client reconstructs the same key from the name it uploaded,
//! so [`report_key`] and friends are part of the external contract.

use crate::config::OverlayFormat;
use crate::error::TamperError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// The fixed set of containers the system writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    /// Uploaded source documents.
    Documents,
    /// One JSON report per document.
    Reports,
    /// One JSON metadata record per document.
    Metadata,
    /// Rendered overlay images.
    OverlayImages,
}

impl Container {
    pub fn as_str(&self) -> &'static str {
        match self {
            Container::Documents => "documents",
            Container::Reports => "reports",
            Container::Metadata => "metadata",
            Container::OverlayImages => "overlay-images",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key-value byte store with overwrite semantics.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` under `key`, replacing any previous content.
    async fn put(&self, container: Container, key: &str, bytes: Vec<u8>) -> Result<(), TamperError>;

    /// Read `key`. Absent keys fail with [`TamperError::NotFound`].
    async fn get(&self, container: Container, key: &str) -> Result<Vec<u8>, TamperError>;

    /// Public location of `key`, recorded in reports.
    fn url(&self, container: Container, key: &str) -> String;
}

// ── Key derivation ───────────────────────────────────────────────────────

/// Replace the last extension of `name` with `suffix`.
///
/// Only the final path segment is considered, and a leading dot is not an
/// extension: `a.b/c` → `a.b/c{suffix}`, `scan.v2.pdf` → `scan.v2{suffix}`.
pub fn artifact_key(name: &str, suffix: &str) -> String {
    let segment_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    let stem_end = match name[segment_start..].rfind('.') {
        Some(0) | None => name.len(),
        Some(i) => segment_start + i,
    };
    format!("{}{}", &name[..stem_end], suffix)
}

pub fn report_key(name: &str) -> String {
    artifact_key(name, "_report.json")
}

pub fn metadata_key(name: &str) -> String {
    artifact_key(name, "_metadata.json")
}

pub fn overlay_key(name: &str, format: OverlayFormat) -> String {
    artifact_key(name, &format!("_overlay.{}", format.extension()))
}

// ── Filesystem store ─────────────────────────────────────────────────────

/// Stores each container as a directory under `root`.
///
/// Writes go to a uniquely named temp file that is then renamed over the
/// target, so a reader never sees a half-written object and concurrent
/// writers of the same key leave one complete version behind.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_base_url: None,
        }
    }

    /// Report URLs as `{base}/{container}/{key}` instead of `file://` paths.
    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` inside `container`, refusing keys that escape it.
    fn path_for(&self, container: Container, key: &str) -> Result<PathBuf, TamperError> {
        let rel = Path::new(key);
        let valid = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(TamperError::Store {
                container: container.to_string(),
                key: key.to_string(),
                reason: "key must be a relative path without '..'".into(),
            });
        }
        Ok(self.root.join(container.as_str()).join(rel))
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn put(&self, container: Container, key: &str, bytes: Vec<u8>) -> Result<(), TamperError> {
        let path = self.path_for(container, key)?;
        let store_err = |e: std::io::Error| TamperError::Store {
            container: container.to_string(),
            key: key.to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(store_err)?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let len = bytes.len();
        let written = async {
            tokio::fs::write(&tmp_path, bytes).await?;
            tokio::fs::rename(&tmp_path, &path).await
        }
        .await;
        if let Err(e) = written {
            // A partial temp file may exist whichever step failed.
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(store_err(e));
        }

        info!("Saved {} bytes to {}/{}", len, container, key);
        Ok(())
    }

    async fn get(&self, container: Container, key: &str) -> Result<Vec<u8>, TamperError> {
        let path = self.path_for(container, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!("Read {} bytes from {}/{}", bytes.len(), container, key);
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TamperError::NotFound {
                container: container.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(TamperError::Store {
                container: container.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn url(&self, container: Container, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}/{}", base, container, key),
            None => {
                let path = self.root.join(container.as_str()).join(key);
                let abs = std::path::absolute(&path).unwrap_or(path);
                format!("file://{}", abs.display())
            }
        }
    }
}

// ── In-memory store ──────────────────────────────────────────────────────

/// Process-local store, mainly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(Container, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently held in `container`, sorted.
    pub fn keys(&self, container: Container) -> Vec<String> {
        let objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|(c, _)| *c == container)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, container: Container, key: &str, bytes: Vec<u8>) -> Result<(), TamperError> {
        let mut objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        objects.insert((container, key.to_string()), bytes);
        Ok(())
    }

    async fn get(&self, container: Container, key: &str) -> Result<Vec<u8>, TamperError> {
        let objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        objects
            .get(&(container, key.to_string()))
            .cloned()
            .ok_or_else(|| TamperError::NotFound {
                container: container.to_string(),
                key: key.to_string(),
            })
    }

    fn url(&self, container: Container, key: &str) -> String {
        format!("memory://{}/{}", container, key)
    }
}
