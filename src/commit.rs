//! Membership Commits
//!
//! Appends a new member to `members.json` through the GitHub contents API.
//!
//! The write is optimistic: the file is read together with its blob `sha`,
//! the record is appended, and the PUT carries that `sha` as precondition.
//! If someone else changed the file in between, GitHub answers 409 and the
//! commit fails with `PreconditionFailed` instead of overwriting their edit.
//! The freshly read file is also checked for the npub, so a duplicate is
//! never written even when the application-level checks raced.

use crate::config::OracleConfig;
use crate::member::MemberRecord;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Per-request timeout for commit reads and writes
pub const COMMIT_TIMEOUT: Duration = Duration::from_secs(30);

pub const MEMBERS_FILE: &str = "members.json";

const USER_AGENT: &str = concat!("dpyc-oracle/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("GitHub token not configured. Set GITHUB_TOKEN to enable automated membership commits.")]
    NotConfigured,
    #[error("{0} is already listed in members.json")]
    AlreadyMember(String),
    #[error("members.json changed while committing (precondition failed)")]
    PreconditionFailed,
    #[error("GitHub request failed: {0}")]
    Http(String),
    #[error("GitHub returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Unexpected members.json content: {0}")]
    Decode(String),
}

/// Durable store for new member records
#[async_trait]
pub trait MembershipCommitter: Send + Sync {
    /// Append `record` and return a link to the resulting commit/file
    async fn append_member(&self, record: &MemberRecord) -> Result<String, CommitError>;
}

#[derive(Debug, Deserialize)]
struct ContentsFile {
    sha: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: PutContentsFile,
}

#[derive(Debug, Deserialize)]
struct PutContentsFile {
    html_url: String,
}

/// Commits to `members.json` through the GitHub REST API
pub struct GitHubCommitter {
    client: Client,
    api_url: String,
    repo: String,
    branch: String,
    token: Option<String>,
}

impl GitHubCommitter {
    pub fn new(
        api_url: &str,
        repo: &str,
        branch: &str,
        token: Option<String>,
    ) -> Result<Self, CommitError> {
        let client = Client::builder()
            .timeout(COMMIT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CommitError::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            token,
        })
    }

    pub fn from_config(config: &OracleConfig) -> Result<Self, CommitError> {
        Self::new(
            &config.github_api_url,
            &config.community_repo,
            &config.branch,
            config.github_token.clone(),
        )
    }

    fn contents_url(&self) -> String {
        format!("{}/repos/{}/contents/{}", self.api_url, self.repo, MEMBERS_FILE)
    }

    fn token(&self) -> Result<&str, CommitError> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(CommitError::NotConfigured)
    }

    async fn read_members(&self, token: &str) -> Result<(String, Value), CommitError> {
        let response = self
            .client
            .get(self.contents_url())
            .query(&[("ref", self.branch.as_str())])
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| CommitError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let file: ContentsFile = response
            .json()
            .await
            .map_err(|e| CommitError::Decode(e.to_string()))?;

        // GitHub wraps base64 content at 60 columns
        let encoded: String = file.content.split_whitespace().collect();
        let raw = BASE64
            .decode(encoded)
            .map_err(|e| CommitError::Decode(e.to_string()))?;
        let document: Value =
            serde_json::from_slice(&raw).map_err(|e| CommitError::Decode(e.to_string()))?;

        Ok((file.sha, document))
    }
}

#[async_trait]
impl MembershipCommitter for GitHubCommitter {
    async fn append_member(&self, record: &MemberRecord) -> Result<String, CommitError> {
        let token = self.token()?;

        let (sha, mut document) = self.read_members(token).await?;
        debug!("Read members.json at sha {}", sha);

        let members = document
            .get_mut("members")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| CommitError::Decode("missing 'members' list".to_string()))?;

        if members
            .iter()
            .any(|m| m.get("npub").and_then(Value::as_str) == Some(record.npub.as_str()))
        {
            return Err(CommitError::AlreadyMember(record.npub.clone()));
        }

        members.push(
            serde_json::to_value(record).map_err(|e| CommitError::Decode(e.to_string()))?,
        );

        let mut updated = serde_json::to_string_pretty(&document)
            .map_err(|e| CommitError::Decode(e.to_string()))?;
        updated.push('\n');

        let npub_short = &record.npub[..16.min(record.npub.len())];
        let body = json!({
            "message": format!("[Citizenship] Add {} ({})", record.display_name, npub_short),
            "content": BASE64.encode(updated.as_bytes()),
            "sha": sha,
            "branch": self.branch,
        });

        let response = self
            .client
            .put(self.contents_url())
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CommitError::Http(e.to_string()))?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                return Err(CommitError::PreconditionFailed);
            }
            _ => return Err(status_error(response).await),
        }

        let put: PutContentsResponse = response
            .json()
            .await
            .map_err(|e| CommitError::Decode(e.to_string()))?;

        info!(
            "Committed citizen {} ({}) to {}",
            record.display_name, npub_short, self.repo
        );
        Ok(put.content.html_url)
    }
}

async fn status_error(response: reqwest::Response) -> CommitError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    CommitError::Status {
        status,
        body: body.chars().take(200).collect(),
    }
}
