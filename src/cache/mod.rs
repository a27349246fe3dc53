use anyhow::Result;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk cache of raw query responses, keyed by a hash of the request
#[derive(Debug, Clone)]
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    /// Create a new cache manager with the specified cache directory
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    /// Get the cache path for a given request key
    pub fn get_cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.jsonl", Self::hash_key(key)))
    }

    /// Check if a response for this key is already on disk
    pub fn is_cached(&self, key: &str) -> bool {
        self.get_cache_path(key).exists()
    }

    /// Hash a request key into a file name
    fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Read a cached response body
    pub fn read_cached(&self, key: &str) -> Result<String> {
        Ok(fs::read_to_string(self.get_cache_path(key))?)
    }

    /// Write a response body to the cache
    pub fn write_cached(&self, key: &str, body: &str) -> Result<()> {
        fs::write(self.get_cache_path(key), body)?;
        Ok(())
    }

    /// Get the cache directory path
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}
