use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::languages::registry;
use crate::scanner::uri_to_path;

/// A workspace file whose content is read on first use and kept until invalidated.
#[derive(Debug)]
pub struct WorkspaceFile {
    path: PathBuf,
    language_id: &'static str,
    content: RwLock<Option<Arc<str>>>,
}

impl WorkspaceFile {
    fn new(path: PathBuf, language_id: &'static str) -> Self {
        Self {
            path,
            language_id,
            content: RwLock::new(None),
        }
    }

    pub fn language_id(&self) -> &'static str {
        self.language_id
    }

    pub fn cached(&self) -> Option<Arc<str>> {
        read(&self.content).as_ref().cloned()
    }

    /// Drop the cached text; the next load reads the disk again.
    pub fn invalidate(&self) {
        *write(&self.content) = None;
    }

    /// Cached content or a synchronous disk read. `Ok(None)` for binary files.
    pub fn load_blocking(&self) -> Result<Option<Arc<str>>> {
        if let Some(text) = self.cached() {
            return Ok(Some(text));
        }
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        Ok(self.store(bytes))
    }

    /// Cached content or an async disk read. `Ok(None)` for binary files.
    pub async fn load(&self) -> Result<Option<Arc<str>>> {
        if let Some(text) = self.cached() {
            return Ok(Some(text));
        }
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        Ok(self.store(bytes))
    }

    fn store(&self, bytes: Vec<u8>) -> Option<Arc<str>> {
        // Binary detection: null bytes → never indexed.
        if bytes.contains(&0u8) {
            return None;
        }
        let text: Arc<str> = Arc::from(String::from_utf8_lossy(&bytes).into_owned());
        *write(&self.content) = Some(text.clone());
        Some(text)
    }
}

/// Lazily populated map of workspace files keyed by URI.
#[derive(Debug, Default)]
pub struct FileCache {
    files: RwLock<HashMap<String, Arc<WorkspaceFile>>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Option<Arc<WorkspaceFile>> {
        read(&self.files).get(uri).cloned()
    }

    /// Existing entry, or a new unloaded one. Fails for non-`file` URIs and
    /// unsupported languages.
    pub fn get_or_insert(&self, uri: &str) -> Result<Arc<WorkspaceFile>> {
        if let Some(f) = self.get(uri) {
            return Ok(f);
        }
        let path = uri_to_path(uri).ok_or_else(|| anyhow!("Not a file URI: {uri}"))?;
        let language_id = registry()
            .language_id_for_path(&path)
            .ok_or_else(|| anyhow!("Unsupported file type: {}", path.display()))?;

        let mut files = write(&self.files);
        let entry = files
            .entry(uri.to_string())
            .or_insert_with(|| Arc::new(WorkspaceFile::new(path, language_id)));
        Ok(entry.clone())
    }

    /// File changed on disk: keep the entry, forget its content.
    pub fn invalidate(&self, uri: &str) {
        if let Some(f) = self.get(uri) {
            f.invalidate();
        }
    }

    /// File deleted: forget the entry entirely.
    pub fn remove(&self, uri: &str) {
        write(&self.files).remove(uri);
    }

    pub fn len(&self) -> usize {
        read(&self.files).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
