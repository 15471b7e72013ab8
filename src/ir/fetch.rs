//! Byte-fetch capability
//!
//! Maps a URL to raw bytes. Local paths and `file://` URLs are read with
//! `tokio::fs`; `http(s)://` URLs need the `http` feature.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;

use crate::error::{FxError, Result};

/// Boxed future returned by [`ByteFetcher::fetch`]
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;

/// URL-to-bytes capability
pub trait ByteFetcher: Send + Sync {
    /// Fetch the full body at `url`
    ///
    /// Failures are reported as [`FxError::Fetch`].
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

fn fetch_error(url: &str, reason: impl ToString) -> FxError {
    FxError::Fetch {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// Local files
// ============================================================================

/// Reads local paths, resolving relative ones against a base directory
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    base_dir: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    /// Filesystem path for `url`
    pub fn resolve(&self, url: &str) -> PathBuf {
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ByteFetcher for FileFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let path = self.resolve(url);
            tokio::fs::read(&path)
                .await
                .map_err(|e| fetch_error(url, format!("{}: {}", path.display(), e)))
        })
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Fetches over http(s)
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| fetch_error("<client>", e))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
impl ByteFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| fetch_error(url, e))?;
            if !response.status().is_success() {
                return Err(fetch_error(url, format!("server returned {}", response.status())));
            }
            let body = response.bytes().await.map_err(|e| fetch_error(url, e))?;
            Ok(body.to_vec())
        })
    }
}

// ============================================================================
// Scheme dispatch
// ============================================================================

/// Dispatches on URL scheme: http(s) to the HTTP fetcher, anything else to files
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    files: FileFetcher,
    #[cfg(feature = "http")]
    http: Option<HttpFetcher>,
}

impl DefaultFetcher {
    pub fn new(files: FileFetcher) -> Self {
        Self {
            files,
            #[cfg(feature = "http")]
            http: HttpFetcher::new(std::time::Duration::from_secs(30)).ok(),
        }
    }

    fn is_remote(url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new(FileFetcher::new())
    }
}

impl ByteFetcher for DefaultFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        if !Self::is_remote(url) {
            return self.files.fetch(url);
        }

        #[cfg(feature = "http")]
        if let Some(http) = &self.http {
            return http.fetch(url);
        }

        Box::pin(async move {
            Err(fetch_error(
                url,
                "remote URLs need the `http` feature",
            ))
        })
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Serves bytes registered up front, e.g. an embedded impulse response
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(url, bytes);
        self
    }

    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(url.into(), bytes);
        }
    }

    pub fn remove(&self, url: &str) -> Option<Vec<u8>> {
        self.entries.lock().ok()?.remove(url)
    }
}

impl ByteFetcher for MemoryFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        let found = self
            .entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(url).cloned());
        Box::pin(async move { found.ok_or_else(|| fetch_error(url, "not found")) })
    }
}
