//! Keyed, idempotent store for compiled circuit artifacts.
//!
//! Compilation is expensive and its output immutable, so programs look
//! their artifact up by id before building, and store it right after.
//! Durability is the backend's business; the two implementations here
//! cover a process-local store and a plain directory of files.

use anyhow::{anyhow, Context, Result};
use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::Mutex,
};

pub trait ArtifactCache {
    /// Returns the artifact stored under `program_id`, if any.
    fn get(&self, program_id: &str) -> Result<Option<Vec<u8>>>;
    /// Stores `artifact` under `program_id`, replacing any previous
    /// entry.
    fn put(&self, program_id: &str, artifact: &[u8]) -> Result<()>;
}

impl<T: ArtifactCache + ?Sized> ArtifactCache for &T {
    fn get(&self, program_id: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(program_id)
    }

    fn put(&self, program_id: &str, artifact: &[u8]) -> Result<()> {
        (**self).put(program_id, artifact)
    }
}

/// In-memory cache; artifacts live as long as the cache does.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactCache for MemoryCache {
    fn get(&self, program_id: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("poisoned cache lock"))?;
        Ok(entries.get(program_id).cloned())
    }

    fn put(&self, program_id: &str, artifact: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("poisoned cache lock"))?;
        entries.insert(program_id.to_owned(), artifact.to_vec());
        Ok(())
    }
}

/// One file per program id under a directory.
#[derive(Debug)]
pub struct FileSystemCache {
    dir: PathBuf,
}

impl FileSystemCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating cache directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path(&self, program_id: &str) -> PathBuf {
        self.dir.join(format!("{program_id}.bin"))
    }
}

impl ArtifactCache for FileSystemCache {
    fn get(&self, program_id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(program_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes =
            fs::read(&path).with_context(|| format!("reading artifact {}", path.display()))?;
        Ok(Some(bytes))
    }

    fn put(&self, program_id: &str, artifact: &[u8]) -> Result<()> {
        let path = self.path(program_id);
        fs::write(&path, artifact)
            .with_context(|| format!("writing artifact {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_cache_round_trips_and_replaces() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("p").unwrap(), None);

        cache.put("p", b"one").unwrap();
        assert_eq!(cache.get("p").unwrap().as_deref(), Some(b"one".as_slice()));

        cache.put("p", b"two").unwrap();
        assert_eq!(cache.get("p").unwrap().as_deref(), Some(b"two".as_slice()));
    }

    #[test]
    fn filesystem_cache_round_trips() {
        let dir = std::env::temp_dir().join(format!("imap-cache-{}", std::process::id()));
        let cache = FileSystemCache::new(&dir).unwrap();

        assert_eq!(cache.get("p").unwrap(), None);
        cache.put("p", b"artifact").unwrap();
        assert_eq!(
            cache.get("p").unwrap().as_deref(),
            Some(b"artifact".as_slice())
        );

        fs::remove_dir_all(&dir).unwrap();
    }
}
