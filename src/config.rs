//! Oracle Configuration
//!
//! Defines where the oracle reads community data from and how it writes
//! new citizens back:
//! - Raw content base URL and cache TTL (reads)
//! - GitHub API URL, repository, branch and token (writes)
//! - Citizenship challenge lifetime

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default raw content root of the dpyc-community repository
pub const DEFAULT_BASE_URL: &str = "https://raw.githubusercontent.com/lonniev/dpyc-community/main";

/// Default registry cache TTL (5 minutes)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default repository receiving membership commits
pub const DEFAULT_COMMUNITY_REPO: &str = "lonniev/dpyc-community";

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

pub const DEFAULT_BRANCH: &str = "main";

/// Default citizenship challenge lifetime (10 minutes)
pub const DEFAULT_CHALLENGE_TTL_SECS: u64 = 600;

/// Complete oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Raw content root, e.g. `https://raw.githubusercontent.com/<repo>/main`
    pub community_base_url: String,
    /// Registry cache TTL in seconds
    pub cache_ttl_secs: u64,
    /// GitHub token for membership commits; writes fail without it
    #[serde(skip_serializing)]
    pub github_token: Option<String>,
    /// `owner/name` of the repository holding `members.json`
    pub community_repo: String,
    pub github_api_url: String,
    /// Branch membership commits land on
    pub branch: String,
    /// Lifetime of an issued citizenship challenge in seconds
    pub challenge_ttl_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            community_base_url: DEFAULT_BASE_URL.to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            github_token: None,
            community_repo: DEFAULT_COMMUNITY_REPO.to_string(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            challenge_ttl_secs: DEFAULT_CHALLENGE_TTL_SECS,
        }
    }
}

impl OracleConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            community_base_url: std::env::var("DPYC_COMMUNITY_BASE_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.community_base_url),
            cache_ttl_secs: std::env::var("CACHE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_ttl_secs),
            github_token: std::env::var("GITHUB_TOKEN")
                .ok()
                .filter(|v| !v.is_empty()),
            community_repo: std::env::var("DPYC_COMMUNITY_REPO")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.community_repo),
            github_api_url: std::env::var("GITHUB_API_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.github_api_url),
            branch: std::env::var("DPYC_COMMUNITY_BRANCH")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.branch),
            challenge_ttl_secs: std::env::var("CHALLENGE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.challenge_ttl_secs),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge_ttl_secs)
    }
}
