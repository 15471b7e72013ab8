//! Impulse response cache
//!
//! Memoizes raw impulse-response bytes per URL. Concurrent requests for a URL
//! share one in-flight fetch: the first caller fetches and publishes the
//! outcome on a watch channel, later callers wait on it. Successes are kept
//! for the lifetime of the cache; failures are handed to every waiter and
//! then forgotten, so the next request retries.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::fetch::ByteFetcher;
use crate::engine::io::{resample_to, AudioDecoder};
use crate::engine::AudioBuffer;
use crate::error::{FxError, Result};

/// Raw impulse-response bytes and their digest
pub struct ImpulseResponse {
    url: String,
    bytes: Vec<u8>,
    digest: String,
}

impl ImpulseResponse {
    pub fn new(url: impl Into<String>, bytes: Vec<u8>) -> Self {
        let digest = format!("{:x}", Sha256::digest(&bytes));
        Self {
            url: url.into(),
            bytes,
            digest,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex SHA-256 of the bytes
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Decode and resample to the render's sample rate
    ///
    /// Never cached: each render decodes against its own rate.
    pub fn decode_for(&self, decoder: &dyn AudioDecoder, sample_rate: u32) -> Result<AudioBuffer> {
        let decoded = decoder.decode(&self.bytes)?;
        resample_to(&decoded, sample_rate)
    }
}

impl fmt::Debug for ImpulseResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpulseResponse")
            .field("url", &self.url)
            .field("len", &self.bytes.len())
            .field("digest", &self.digest)
            .finish()
    }
}

/// Fetch failure shared with every waiter
#[derive(Debug, Clone)]
struct SharedFailure {
    url: String,
    reason: Arc<str>,
}

impl From<SharedFailure> for FxError {
    fn from(failure: SharedFailure) -> Self {
        FxError::Fetch {
            url: failure.url,
            reason: failure.reason.to_string(),
        }
    }
}

type Outcome = std::result::Result<Arc<ImpulseResponse>, SharedFailure>;

enum Slot {
    Ready(Arc<ImpulseResponse>),
    Pending(watch::Receiver<Option<Outcome>>),
}

enum Role {
    Leader(watch::Sender<Option<Outcome>>),
    Follower(watch::Receiver<Option<Outcome>>),
}

pub struct ImpulseResponseCache {
    fetcher: Arc<dyn ByteFetcher>,
    slots: Mutex<HashMap<String, Slot>>,
    fetches: AtomicUsize,
}

impl ImpulseResponseCache {
    pub fn new(fetcher: Arc<dyn ByteFetcher>) -> Self {
        Self {
            fetcher,
            slots: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Raw bytes for `url`, fetching at most once at a time per URL
    pub async fn get_raw_bytes(&self, url: &str) -> Result<Arc<ImpulseResponse>> {
        loop {
            let role = {
                let mut slots = self.slots.lock().await;
                match slots.get(url) {
                    Some(Slot::Ready(ir)) => return Ok(ir.clone()),
                    // A closed channel means the fetching task was dropped
                    Some(Slot::Pending(rx)) if rx.has_changed().is_ok() => {
                        Role::Follower(rx.clone())
                    }
                    _ => {
                        let (tx, rx) = watch::channel(None);
                        slots.insert(url.to_string(), Slot::Pending(rx));
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => return self.lead(url, tx).await,
                Role::Follower(mut rx) => {
                    debug!(url, "Joining in-flight impulse response fetch");
                    let outcome = match rx.wait_for(Option::is_some).await {
                        Ok(value) => value.clone(),
                        Err(_) => continue,
                    };
                    match outcome {
                        Some(Ok(ir)) => return Ok(ir),
                        Some(Err(failure)) => return Err(failure.into()),
                        None => continue,
                    }
                }
            }
        }
    }

    async fn lead(&self, url: &str, tx: watch::Sender<Option<Outcome>>) -> Result<Arc<ImpulseResponse>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(url, "Fetching impulse response");

        let outcome: Outcome = match self.fetcher.fetch(url).await {
            Ok(bytes) => {
                let ir = Arc::new(ImpulseResponse::new(url, bytes));
                info!(url, bytes = ir.bytes().len(), digest = %ir.digest(), "Impulse response cached");
                Ok(ir)
            }
            Err(err) => {
                warn!(url, error = %err, "Impulse response fetch failed");
                Err(SharedFailure {
                    url: url.to_string(),
                    reason: Arc::from(fetch_reason(err)),
                })
            }
        };

        {
            let mut slots = self.slots.lock().await;
            match &outcome {
                Ok(ir) => {
                    slots.insert(url.to_string(), Slot::Ready(ir.clone()));
                }
                Err(_) => {
                    slots.remove(url);
                }
            }
        }
        // Followers may all have gone away
        let _ = tx.send(Some(outcome.clone()));

        outcome.map_err(FxError::from)
    }

    /// Whether `url` has been fetched successfully
    pub async fn is_cached(&self, url: &str) -> bool {
        matches!(self.slots.lock().await.get(url), Some(Slot::Ready(_)))
    }

    /// Number of fetches issued so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

fn fetch_reason(err: FxError) -> String {
    match err {
        FxError::Fetch { reason, .. } => reason,
        other => other.to_string(),
    }
}
