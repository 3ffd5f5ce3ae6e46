//! In-memory collaborators for unit tests

use crate::commit::{CommitError, MembershipCommitter};
use crate::member::{MemberEntry, MemberRecord, NetworkStatus, Role};
use crate::registry::{Registry, RegistryError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const CURATOR_NPUB: &str = "npub1curatorxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx";

pub fn member(npub: &str, role: Role, display_name: &str) -> MemberRecord {
    MemberRecord {
        npub: npub.to_string(),
        role,
        status: "active".to_string(),
        member_since: None,
        display_name: display_name.to_string(),
        services: Vec::new(),
        upstream_authority_npub: None,
        notes: String::new(),
        extra: Map::new(),
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    members: Mutex<Vec<MemberEntry>>,
    texts: Mutex<HashMap<String, String>>,
    network_status: Mutex<Option<NetworkStatus>>,
    failing: AtomicBool,
    invalidations: AtomicUsize,
}

impl FakeRegistry {
    /// Registry holding only the Prime Authority
    pub fn with_curator() -> Arc<Self> {
        let registry = Self::default();
        registry.add_member(member(CURATOR_NPUB, Role::PrimeAuthority, "The Curator"));
        Arc::new(registry)
    }

    pub fn add_member(&self, record: MemberRecord) {
        let value = serde_json::to_value(&record).unwrap();
        self.add_entry(value);
    }

    /// Store an entry verbatim, whether or not it decodes as a `MemberRecord`
    pub fn add_entry(&self, value: Value) {
        self.members.lock().push(MemberEntry::new(value));
    }

    pub fn set_text(&self, path: &str, text: &str) {
        self.texts.lock().insert(path.to_string(), text.to_string());
    }

    pub fn set_network_status(&self, status: NetworkStatus) {
        *self.network_status.lock() = Some(status);
    }

    /// Make every fetch fail until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    fn check(&self, path: &str) -> Result<(), RegistryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RegistryError::Status {
                url: format!("fake://{}", path),
                status: 503,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn get_member_entries(&self) -> Result<Vec<MemberEntry>, RegistryError> {
        self.check("members.json")?;
        Ok(self.members.lock().clone())
    }

    async fn get_text(&self, path: &str) -> Result<String, RegistryError> {
        self.check(path)?;
        self.texts
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| RegistryError::Status {
                url: format!("fake://{}", path),
                status: 404,
            })
    }

    async fn get_network_status(&self) -> Result<NetworkStatus, RegistryError> {
        self.check("network-status.json")?;
        self.network_status
            .lock()
            .clone()
            .ok_or_else(|| RegistryError::Status {
                url: "fake://network-status.json".to_string(),
                status: 404,
            })
    }

    fn invalidate_cache(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

/// How the next commits should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFailure {
    NotConfigured,
    AlreadyMember,
    PreconditionFailed,
    ServerError,
}

/// Records appended members and optionally mirrors them into a registry
#[derive(Default)]
pub struct RecordingCommitter {
    committed: Mutex<Vec<MemberRecord>>,
    failure: Mutex<Option<CommitFailure>>,
    attempts: AtomicUsize,
    registry: Option<Arc<FakeRegistry>>,
}

impl RecordingCommitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn backed_by(registry: Arc<FakeRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry: Some(registry),
            ..Default::default()
        })
    }

    pub fn fail_with(&self, failure: Option<CommitFailure>) {
        *self.failure.lock() = failure;
    }

    pub fn committed(&self) -> Vec<MemberRecord> {
        self.committed.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MembershipCommitter for RecordingCommitter {
    async fn append_member(&self, record: &MemberRecord) -> Result<String, CommitError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let failure = *self.failure.lock();
        match failure {
            Some(CommitFailure::NotConfigured) => return Err(CommitError::NotConfigured),
            Some(CommitFailure::AlreadyMember) => {
                return Err(CommitError::AlreadyMember(record.npub.clone()))
            }
            Some(CommitFailure::PreconditionFailed) => return Err(CommitError::PreconditionFailed),
            Some(CommitFailure::ServerError) => {
                return Err(CommitError::Status {
                    status: 502,
                    body: "bad gateway".to_string(),
                })
            }
            None => {}
        }

        self.committed.lock().push(record.clone());
        if let Some(registry) = &self.registry {
            registry.add_member(record.clone());
        }
        Ok(format!(
            "https://github.com/lonniev/dpyc-community/commit/{}",
            self.committed.lock().len()
        ))
    }
}
