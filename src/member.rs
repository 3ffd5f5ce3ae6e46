//! Member Records
//!
//! Types mirrored from the dpyc-community registry files:
//! - `members.json` -> `{ "members": [MemberRecord, ...] }`
//! - `network-status.json` -> `NetworkStatus`
//!
//! Lookups hand back `MemberEntry`, the entry exactly as stored, so a record
//! this crate cannot fully type still answers by `npub` and `role`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Membership tier in the Honor Chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Citizen,
    Operator,
    Authority,
    /// The First Curator, root of the chain
    PrimeAuthority,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Operator => "operator",
            Role::Authority => "authority",
            Role::PrimeAuthority => "prime_authority",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry of `members.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Nostr public key (bech32 `npub1...`), unique per member
    pub npub: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_since: Option<NaiveDate>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub upstream_authority_npub: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
    /// Fields this version does not model, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MemberRecord {
    pub const ADMISSION_NOTE: &'static str =
        "Admitted via Nostr signature-based citizenship onboarding";

    /// Record appended for a newly admitted citizen
    pub fn new_citizen(
        npub: &str,
        display_name: &str,
        member_since: NaiveDate,
        upstream_authority_npub: Option<String>,
    ) -> Self {
        Self {
            npub: npub.to_string(),
            role: Role::Citizen,
            status: "active".to_string(),
            member_since: Some(member_since),
            display_name: display_name.to_string(),
            services: Vec::new(),
            upstream_authority_npub,
            notes: Self::ADMISSION_NOTE.to_string(),
            extra: Map::new(),
        }
    }
}

/// A `members.json` entry as the registry holds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberEntry(Value);

impl MemberEntry {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn npub(&self) -> Option<&str> {
        self.0.get("npub").and_then(Value::as_str)
    }

    /// Role name as written, which may be one this version does not know
    pub fn role(&self) -> Option<&str> {
        self.0.get("role").and_then(Value::as_str)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role() == Some(role.as_str())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn decode(&self) -> Result<MemberRecord, serde_json::Error> {
        MemberRecord::deserialize(&self.0)
    }
}

/// Recommended version range of one Tollbooth component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentVersion {
    pub current: String,
    pub minimum: String,
}

/// Contents of `network-status.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatus {
    #[serde(default)]
    pub components: BTreeMap<String, ComponentVersion>,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub advisory: String,
    /// Fields this version does not model, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
