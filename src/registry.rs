//! Community Registry
//!
//! Read-through cache over the dpyc-community repository files.
//! JSON and text resources live in separate caches, each entry expiring
//! `cache_ttl` after it was fetched. The JSON cache keeps the raw decoded
//! document, so member lookups re-scan the cached list on every call.
//! Lookups match on the raw `npub` and `role` fields; one entry that does
//! not fit `MemberRecord` never hides the rest of the list.

use crate::member::{MemberEntry, MemberRecord, NetworkStatus, Role};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Per-request timeout for registry reads
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const MEMBERS_PATH: &str = "members.json";
pub const NETWORK_STATUS_PATH: &str = "network-status.json";
pub const README_PATH: &str = "README.md";
pub const GOVERNANCE_PATH: &str = "GOVERNANCE.md";
pub const ADVISORY_PATH: &str = "ADVISORY.md";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
    #[error("Failed to fetch {url}: {reason}")]
    Http { url: String, reason: String },
    #[error("Failed to fetch {url}: server returned {status}")]
    Status { url: String, status: u16 },
    #[error("Failed to parse {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("{path} is malformed: {reason}")]
    Format { path: String, reason: String },
}

/// Read interface over the community registry.
///
/// Lookups have default implementations scanning `get_member_entries`, so an
/// implementor only supplies the raw fetches.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Every entry of `members.json`, in file order, as stored
    async fn get_member_entries(&self) -> Result<Vec<MemberEntry>, RegistryError>;

    async fn get_text(&self, path: &str) -> Result<String, RegistryError>;

    async fn get_network_status(&self) -> Result<NetworkStatus, RegistryError>;

    /// Drop every cached resource so the next read goes to the network
    fn invalidate_cache(&self);

    /// Typed member records. Entries that fail to decode are logged and skipped.
    async fn get_members(&self) -> Result<Vec<MemberRecord>, RegistryError> {
        let entries = self.get_member_entries().await?;
        Ok(entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match entry.decode() {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(
                        "Skipping members.json entry {} ({}): {}",
                        index,
                        entry.npub().unwrap_or("no npub"),
                        e
                    );
                    None
                }
            })
            .collect())
    }

    async fn lookup_member(&self, npub: &str) -> Result<Option<MemberEntry>, RegistryError> {
        let entries = self.get_member_entries().await?;
        Ok(entries.into_iter().find(|m| m.npub() == Some(npub)))
    }

    /// The Prime Authority. If the registry lists several, the first wins.
    async fn get_first_curator(&self) -> Result<Option<MemberEntry>, RegistryError> {
        let entries = self.get_member_entries().await?;
        Ok(entries
            .into_iter()
            .find(|m| m.has_role(Role::PrimeAuthority)))
    }
}

#[derive(Debug, Clone)]
struct CachedEntry<T> {
    value: T,
    fetched_at: Instant,
}

impl<T> CachedEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Cached HTTP client for the dpyc-community repository
pub struct CommunityRegistry {
    base_url: String,
    ttl: Duration,
    client: reqwest::Client,
    json_cache: RwLock<HashMap<String, CachedEntry<Value>>>,
    text_cache: RwLock<HashMap<String, CachedEntry<String>>>,
}

impl CommunityRegistry {
    pub fn new(base_url: &str, ttl: Duration) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RegistryError::Client(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ttl,
            client,
            json_cache: RwLock::new(HashMap::new()),
            text_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn fetch(&self, path: &str) -> Result<reqwest::Response, RegistryError> {
        let url = self.url_for(path);
        debug!("Fetching registry resource {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RegistryError::Http {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(RegistryError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        Ok(response)
    }

    async fn fetch_json(&self, path: &str) -> Result<Value, RegistryError> {
        let cached = self
            .json_cache
            .read()
            .get(path)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.value.clone());
        if let Some(value) = cached {
            return Ok(value);
        }

        let response = self.fetch(path).await?;
        let url = response.url().to_string();
        let value: Value = response
            .json()
            .await
            .map_err(|e| RegistryError::Decode {
                url,
                reason: e.to_string(),
            })?;

        self.json_cache
            .write()
            .insert(path.to_string(), CachedEntry::new(value.clone()));
        debug!("Cached registry resource {}", path);
        Ok(value)
    }

    async fn fetch_text(&self, path: &str) -> Result<String, RegistryError> {
        let cached = self
            .text_cache
            .read()
            .get(path)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.value.clone());
        if let Some(value) = cached {
            return Ok(value);
        }

        let response = self.fetch(path).await?;
        let url = response.url().to_string();
        let text = response.text().await.map_err(|e| RegistryError::Http {
            url,
            reason: e.to_string(),
        })?;

        self.text_cache
            .write()
            .insert(path.to_string(), CachedEntry::new(text.clone()));
        debug!("Cached registry resource {}", path);
        Ok(text)
    }
}

#[async_trait]
impl Registry for CommunityRegistry {
    async fn get_member_entries(&self) -> Result<Vec<MemberEntry>, RegistryError> {
        let data = self.fetch_json(MEMBERS_PATH).await?;
        let members = data.get("members").ok_or_else(|| RegistryError::Format {
            path: MEMBERS_PATH.to_string(),
            reason: "missing 'members' key".to_string(),
        })?;
        let list = members.as_array().ok_or_else(|| RegistryError::Format {
            path: MEMBERS_PATH.to_string(),
            reason: "'members' is not a list".to_string(),
        })?;

        Ok(list.iter().cloned().map(MemberEntry::new).collect())
    }

    async fn get_text(&self, path: &str) -> Result<String, RegistryError> {
        self.fetch_text(path).await
    }

    async fn get_network_status(&self) -> Result<NetworkStatus, RegistryError> {
        let data = self.fetch_json(NETWORK_STATUS_PATH).await?;
        serde_json::from_value(data).map_err(|e| RegistryError::Format {
            path: NETWORK_STATUS_PATH.to_string(),
            reason: e.to_string(),
        })
    }

    fn invalidate_cache(&self) {
        self.json_cache.write().clear();
        self.text_cache.write().clear();
        debug!("Registry cache invalidated");
    }
}
