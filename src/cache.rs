use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::display::RatatuiImage;

pub const CACHE_DIR: &str = ".cache/tracklist";
const CACHE_EXPIRY_DAYS: u64 = 30;

#[derive(Serialize, Deserialize)]
pub struct CachedImage {
    pub cover: RatatuiImage,
    pub cached_at: u64, // Unix timestamp
}

#[derive(Debug, Clone)]
pub struct ImageCache {
    pub cache_dir: PathBuf,
}

/// `~/.cache/tracklist`, created on demand. Also holds the log file.
pub fn cache_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")?;
    let dir = Path::new(&home).join(CACHE_DIR);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

impl ImageCache {
    pub fn new() -> Result<Self> {
        let cache_dir = cache_dir()?.join("covers");
        fs::create_dir_all(&cache_dir)?;

        Ok(Self { cache_dir })
    }

    pub fn get(&self, url: &str) -> Option<RatatuiImage> {
        let cache_path = self.path_for(url);

        if !cache_path.exists() {
            return None;
        }

        let contents = match fs::read_to_string(&cache_path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read cache file: {e}");
                return None;
            }
        };

        match serde_json::from_str::<CachedImage>(&contents) {
            Ok(cached) if self.is_expired(cached.cached_at) => {
                let _ = fs::remove_file(&cache_path);
                None
            }
            Ok(cached) => Some(cached.cover),
            Err(e) => {
                warn!("Failed to deserialize cache: {e}");
                // Delete invalid cache file
                let _ = fs::remove_file(&cache_path);
                None
            }
        }
    }

    pub fn set(&self, url: &str, cover: &RatatuiImage) -> Result<()> {
        let cached = CachedImage {
            cover: cover.clone(),
            cached_at: SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs(),
        };

        let json = serde_json::to_string(&cached)?;
        fs::write(self.path_for(url), json)?;

        Ok(())
    }

    fn path_for(&self, url: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.json", self.generate_cache_key(url)))
    }

    fn generate_cache_key(&self, url: &str) -> String {
        // Use SHA256 hash of URL as cache key
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn is_expired(&self, cached_at: u64) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        // Handle future timestamps (should not be expired)
        if cached_at > now {
            return false;
        }

        let age_days = (now - cached_at) / (60 * 60 * 24);
        age_days > CACHE_EXPIRY_DAYS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache(name: &str) -> ImageCache {
        let dir = std::env::temp_dir().join(format!("tracklist-test-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        ImageCache { cache_dir: dir }
    }

    #[test]
    fn test_generate_cache_key() {
        let cache = temp_cache("key");

        let key1 = cache.generate_cache_key("https://i.scdn.co/image/ab67616d0000b273");
        let key2 = cache.generate_cache_key("https://i.scdn.co/image/ab67616d0000b273");
        assert_eq!(key1, key2);

        let key3 = cache.generate_cache_key("https://i.scdn.co/image/other");
        assert_ne!(key1, key3);

        // SHA256 hex
        assert_eq!(key1.len(), 64);
        assert!(key1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_is_expired() {
        let cache = temp_cache("expiry");
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        assert!(!cache.is_expired(now));
        assert!(!cache.is_expired(now - 60 * 60 * 24 * 30));
        assert!(cache.is_expired(now - 60 * 60 * 24 * 31));
        assert!(cache.is_expired(0));

        // Future timestamps are kept
        assert!(!cache.is_expired(now + 3600));
    }

    #[test]
    fn test_set_then_get() {
        let cache = temp_cache("roundtrip");
        let url = "https://i.scdn.co/image/cover-roundtrip";
        let cover = RatatuiImage {
            pixels: vec![vec![(1, 2, 3), (4, 5, 6)]],
        };

        assert!(cache.get(url).is_none());
        cache.set(url, &cover).unwrap();
        assert_eq!(cache.get(url), Some(cover));

        let _ = fs::remove_dir_all(&cache.cache_dir);
    }

    #[test]
    fn test_corrupt_entry_is_dropped() {
        let cache = temp_cache("corrupt");
        let url = "https://i.scdn.co/image/corrupt";
        fs::write(cache.path_for(url), "{not json").unwrap();

        assert!(cache.get(url).is_none());
        assert!(!cache.path_for(url).exists());

        let _ = fs::remove_dir_all(&cache.cache_dir);
    }
}
