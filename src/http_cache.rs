use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};

use crate::bounded_cache::{BoundedCache, DEFAULT_CAPACITY};

const CACHE_VERSION: u32 = 2;
const CACHE_DIR: &str = "kingshot_atlas";
const CACHE_FILE: &str = "http_cache.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct HttpCacheFile {
    version: u32,
    entries: Vec<(String, CacheEntry)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub body: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub fetched_at: u64,
}

/// Conditional-GET cache for REST reads, persisted as JSON under the app
/// cache dir. Owned by the caller rather than living in a global.
#[derive(Debug)]
pub struct HttpCache {
    path: Option<PathBuf>,
    entries: BoundedCache<String, CacheEntry>,
}

impl HttpCache {
    /// A cache that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: BoundedCache::new(DEFAULT_CAPACITY),
        }
    }

    pub fn open_default() -> Self {
        Self::open(app_cache_dir().map(|dir| dir.join(CACHE_FILE)))
    }

    pub fn open(path: Option<PathBuf>) -> Self {
        let mut entries = BoundedCache::new(DEFAULT_CAPACITY);
        if let Some(file) = path.as_ref().and_then(|p| load_cache_file(p)) {
            for (key, entry) in file.entries {
                entries.insert(key, entry);
            }
        }
        Self { path, entries }
    }

    pub fn get(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(&url.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn store(&mut self, url: &str, entry: CacheEntry) -> Result<()> {
        self.entries.insert(url.to_string(), entry);
        self.save()
    }

    fn save(&self) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).ok();
        }
        let file = HttpCacheFile {
            version: CACHE_VERSION,
            entries: self
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(&file).context("serialize http cache")?;
        fs::write(&tmp, json).context("write http cache")?;
        fs::rename(&tmp, path).context("swap http cache")?;
        Ok(())
    }

    pub fn fetch_json(&mut self, client: &Client, url: &str) -> Result<String> {
        let cached = self.get(url).cloned();

        let mut req = client.get(url);
        if let Some(entry) = cached.as_ref() {
            if let Some(etag) = entry.etag.as_ref() {
                req = req.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = entry.last_modified.as_ref() {
                req = req.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let resp = req.send().with_context(|| format!("request failed: {url}"))?;
        let status = resp.status();
        let headers = resp.headers().clone();
        if status == StatusCode::NOT_MODIFIED {
            let Some(mut entry) = cached else {
                return Err(anyhow!("received 304 without cache body"));
            };
            entry.fetched_at = now_secs();
            let body = entry.body.clone();
            self.store(url, entry)?;
            return Ok(body);
        }

        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {}: {}", status, body));
        }

        let header_string = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        let entry = CacheEntry {
            body: body.clone(),
            etag: header_string(ETAG),
            last_modified: header_string(LAST_MODIFIED),
            fetched_at: now_secs(),
        };
        self.store(url, entry)?;
        Ok(body)
    }
}

fn load_cache_file(path: &Path) -> Option<HttpCacheFile> {
    let raw = fs::read_to_string(path).ok()?;
    let cache = serde_json::from_str::<HttpCacheFile>(&raw).ok()?;
    (cache.version == CACHE_VERSION).then_some(cache)
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
