//! Oracle Tools
//!
//! The concierge's public operations. Every tool is independently callable
//! and catches its own failures: read tools surface `ToolError::Registry`,
//! citizenship tools answer `{success: false, error}`.

use crate::commit::{CommitError, GitHubCommitter, MembershipCommitter};
use crate::config::OracleConfig;
use crate::member::{MemberEntry, NetworkStatus};
use crate::registration::RegistrationWorkflow;
use crate::registry::{
    CommunityRegistry, Registry, RegistryError, ADVISORY_PATH, GOVERNANCE_PATH, README_PATH,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

pub const INSTRUCTIONS: &str = "\
DPYC Oracle: community concierge for the DPYC Honor Chain.

DPYC (\"Don't Pester Your Customer\") is a philosophy and protocol for API \
monetization via Bitcoin Lightning micropayments. Users pre-fund a satoshi \
balance and consume API calls without KYC, stablecoins, or mid-session \
payment popups. Identity is a Nostr keypair (npub), not an email or \
username. Tollbooth monetizes complete business information at the tool \
layer using pre-funded Lightning balances that eliminate per-request \
payment ceremonies.

The Honor Chain is a voluntary community of Operators and Authorities who \
agree to transparent, auditable economic rules. Operators run services \
and collect Lightning fares via Tollbooths. Authorities certify Operators \
and collect a small tax on every purchase order. The First Curator (Prime \
Authority) sits at the root of the chain and mints the initial cert-sat \
supply. Membership tiers: Citizen -> Operator -> Authority -> First Curator.

This Oracle is a free, unauthenticated concierge that answers questions \
about membership, governance, onboarding, and tax rates by reading the \
dpyc-community registry on GitHub. It does not require payment or \
credentials.

Related repos:
- dpyc-community: https://github.com/lonniev/dpyc-community (registry + governance)
- tollbooth-dpyc: https://github.com/lonniev/tollbooth-dpyc (Tollbooth monetization SDK)
- tollbooth-authority: https://github.com/lonniev/tollbooth-authority (Authority service)
- thebrain-mcp: https://github.com/lonniev/thebrain-mcp (Personal Brain service)
";

pub const HOW_TO_JOIN: &str = "\
# How to Join the DPYC Honor Chain

## Step 1: Generate a Nostr Identity

Every member needs a Nostr keypair. Your `npub` is your public identity.

```bash
# Option A: Use a Nostr client like Primal (https://primal.net)
# Create an account, your npub is shown in your profile

# Option B: CLI with nak (https://github.com/fiatjaf/nak)
nak key generate    # prints nsec (private) and npub (public)

# Option C: the dpyc CLI shipped with this oracle
dpyc keygen
```

**Keep your nsec private key safe.** You only share your npub.

## Step 2: Choose Your Tier

### Citizen (Observer)
- No sponsorship required
- Read governance docs, follow community discussions
- Self-register with `request_citizenship` and `confirm_citizenship`

### Operator (Run Services)
- Find a sponsoring Authority willing to vouch for you
- The Authority submits a PR to `dpyc-community/members.json` adding your record
- Install `tollbooth-dpyc` in your server for Lightning fare collection
- Configure your BTCPay Server instance for payment processing

### Authority (Certify Operators)
- Must already be an active Operator in good standing
- Requires sponsorship from an existing Authority or the First Curator
- Deploy `tollbooth-authority` to issue EdDSA-signed purchase certificates
- Fund your tax balance with the upstream Authority via Lightning

### First Curator (Prime Authority)
- There is exactly one First Curator at the root of the Honor Chain
- This role is not open for application; it is a governance position

## Step 3: Get Sponsored

1. Introduce yourself in the community (GitHub Issues on dpyc-community)
2. An Authority reviews your intent and submits a PR with your member record
3. CI validates the record format; community reviews the PR
4. Once merged, you are an official member of the Honor Chain

## Useful Links

- Registry: https://github.com/lonniev/dpyc-community
- Tollbooth SDK: https://github.com/lonniev/tollbooth-dpyc
- Authority Service: https://github.com/lonniev/tollbooth-authority
- Primal (Nostr client): https://primal.net
- BTCPay Server: https://btcpayserver.org
";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Error)]
pub enum OracleInitError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Commit(#[from] CommitError),
}

// ============================================================================
// RESULT TYPES
// ============================================================================

/// The registry entry as stored, or a human-readable explanation of why there is none
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Lookup {
    Found(MemberEntry),
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRate {
    pub rate_percent: u32,
    pub min_sats: u64,
    pub note: String,
}

impl TaxRate {
    pub fn current() -> Self {
        Self {
            rate_percent: 2,
            min_sats: 10,
            note: "Tax per certification = max(10, ceil(amount_sats * 2 / 100)). \
                   Configurable per-Authority in a future release."
                .to_string(),
        }
    }

    /// Tax owed on a certified purchase of `amount_sats`
    pub fn tax_for(&self, amount_sats: u64) -> u64 {
        let proportional =
            (u128::from(amount_sats) * u128::from(self.rate_percent)).div_ceil(100);
        u64::try_from(proportional)
            .unwrap_or(u64::MAX)
            .max(self.min_sats)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestCitizenshipResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmCitizenshipResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a tool that exists in the catalog but has no behavior yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StubOutcome {
    Unsupported { tool: String, message: String },
}

impl StubOutcome {
    fn unsupported(tool: &str, planned: &str) -> Self {
        StubOutcome::Unsupported {
            tool: tool.to_string(),
            message: format!("{} is not yet implemented. {}", tool, planned),
        }
    }
}

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [&'static str],
}

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "about",
        description: "Extended narration about DPYC, the Honor Chain, and the Oracle.",
        params: &[],
    },
    ToolSpec {
        name: "lookup_member",
        description: "Look up a member by their Nostr npub.",
        params: &["npub"],
    },
    ToolSpec {
        name: "get_tax_rate",
        description: "Get the current Tollbooth tax rate.",
        params: &[],
    },
    ToolSpec {
        name: "get_rulebook",
        description: "Fetch the DPYC Honor Chain governance document.",
        params: &[],
    },
    ToolSpec {
        name: "how_to_join",
        description: "Tier-specific onboarding guide for joining the DPYC Honor Chain.",
        params: &[],
    },
    ToolSpec {
        name: "who_is_first_curator",
        description: "Identify the First Curator (Prime Authority) of the Honor Chain.",
        params: &[],
    },
    ToolSpec {
        name: "network_versions",
        description: "Get current recommended versions of all Tollbooth components.",
        params: &[],
    },
    ToolSpec {
        name: "network_advisory",
        description: "Get the current network deployment advisory.",
        params: &[],
    },
    ToolSpec {
        name: "request_citizenship",
        description: "Begin the citizenship application by requesting a signing challenge.",
        params: &["npub", "display_name"],
    },
    ToolSpec {
        name: "confirm_citizenship",
        description: "Complete the citizenship application with a signed Nostr event.",
        params: &["npub", "challenge_id", "signed_event_json"],
    },
    ToolSpec {
        name: "renounce_membership",
        description: "Citizen self-removal from the Honor Chain (not yet implemented).",
        params: &["npub"],
    },
    ToolSpec {
        name: "initiate_ban_election",
        description: "Initiate a community ban election against a member (not yet implemented).",
        params: &["target_npub", "reason"],
    },
    ToolSpec {
        name: "cast_ban_vote",
        description: "Cast a Lightning-funded vote in an active ban election (not yet implemented).",
        params: &["election_id", "vote", "npub"],
    },
];

// ============================================================================
// ORACLE
// ============================================================================

/// Shared context behind every tool call
pub struct Oracle {
    registry: Arc<dyn Registry>,
    workflow: RegistrationWorkflow,
}

impl Oracle {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleInitError> {
        let registry = CommunityRegistry::new(&config.community_base_url, config.cache_ttl())?;
        let committer = GitHubCommitter::from_config(config)?;
        Ok(Self::with_parts(
            Arc::new(registry),
            Arc::new(committer),
            config.challenge_ttl(),
        ))
    }

    pub fn with_parts(
        registry: Arc<dyn Registry>,
        committer: Arc<dyn MembershipCommitter>,
        challenge_ttl: Duration,
    ) -> Self {
        let workflow = RegistrationWorkflow::new(Arc::clone(&registry), committer, challenge_ttl);
        Self { registry, workflow }
    }

    pub fn workflow(&self) -> &RegistrationWorkflow {
        &self.workflow
    }

    pub async fn about(&self) -> Result<String, ToolError> {
        let readme = self.registry.get_text(README_PATH).await?;
        let governance = self.registry.get_text(GOVERNANCE_PATH).await?;
        Ok(format!(
            "# About the DPYC Honor Chain\n\n{}\n\n---\n\n# Governance\n\n{}",
            readme, governance
        ))
    }

    pub async fn lookup_member(&self, npub: &str) -> Result<Lookup, ToolError> {
        Ok(match self.registry.lookup_member(npub).await? {
            Some(member) => Lookup::Found(member),
            None => Lookup::NotFound(format!("No member found with npub: {}", npub)),
        })
    }

    pub fn get_tax_rate(&self) -> TaxRate {
        TaxRate::current()
    }

    pub async fn get_rulebook(&self) -> Result<String, ToolError> {
        Ok(self.registry.get_text(GOVERNANCE_PATH).await?)
    }

    pub fn how_to_join(&self) -> &'static str {
        HOW_TO_JOIN
    }

    pub async fn who_is_first_curator(&self) -> Result<Lookup, ToolError> {
        Ok(match self.registry.get_first_curator().await? {
            Some(curator) => Lookup::Found(curator),
            None => Lookup::NotFound("No Prime Authority found in the registry.".to_string()),
        })
    }

    pub async fn network_versions(&self) -> Result<NetworkStatus, ToolError> {
        Ok(self.registry.get_network_status().await?)
    }

    pub async fn network_advisory(&self) -> Result<String, ToolError> {
        Ok(self.registry.get_text(ADVISORY_PATH).await?)
    }

    pub async fn request_citizenship(
        &self,
        npub: &str,
        display_name: &str,
    ) -> RequestCitizenshipResponse {
        match self.workflow.request_citizenship(npub, display_name).await {
            Ok(issued) => RequestCitizenshipResponse {
                success: true,
                challenge_id: Some(issued.challenge_id.to_string()),
                nonce: Some(issued.nonce),
                expires_in_seconds: Some(issued.expires_in_seconds),
                instructions: Some(issued.instructions),
                error: None,
            },
            Err(e) => RequestCitizenshipResponse {
                success: false,
                challenge_id: None,
                nonce: None,
                expires_in_seconds: None,
                instructions: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub async fn confirm_citizenship(
        &self,
        npub: &str,
        challenge_id: &str,
        signed_event_json: &str,
    ) -> ConfirmCitizenshipResponse {
        match self
            .workflow
            .confirm_citizenship(npub, challenge_id, signed_event_json)
            .await
        {
            Ok(admission) => ConfirmCitizenshipResponse {
                success: true,
                status: Some(admission.status),
                commit_url: Some(admission.commit_url),
                message: Some(admission.message),
                error: None,
            },
            Err(e) => ConfirmCitizenshipResponse {
                success: false,
                status: None,
                commit_url: None,
                message: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn renounce_membership(&self, _npub: &str) -> StubOutcome {
        StubOutcome::unsupported(
            "renounce_membership",
            "Self-removal from members.json will be automated in a future release.",
        )
    }

    pub fn initiate_ban_election(&self, _target_npub: &str, _reason: &str) -> StubOutcome {
        StubOutcome::unsupported(
            "initiate_ban_election",
            "Ban elections will open a GitHub Issue with a 72-hour discussion period and Lightning-funded voting.",
        )
    }

    pub fn cast_ban_vote(&self, _election_id: &str, _vote: &str, _npub: &str) -> StubOutcome {
        StubOutcome::unsupported(
            "cast_ban_vote",
            "Votes will be recorded with a Lightning payment proof once ban elections exist.",
        )
    }

    /// Invoke a tool by name with a JSON object of arguments
    pub async fn dispatch(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        debug!("Dispatching tool {}", name);
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };

        let result = self.invoke(name, args).await;
        if let Err(ToolError::Registry(e)) = &result {
            error!("Tool {} failed: {}", name, e);
        }
        result
    }

    async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        match name {
            "about" => to_json(self.about().await?),
            "lookup_member" => {
                let a: NpubArgs = parse_args(name, args)?;
                to_json(self.lookup_member(&a.npub).await?)
            }
            "get_tax_rate" => to_json(self.get_tax_rate()),
            "get_rulebook" => to_json(self.get_rulebook().await?),
            "how_to_join" => to_json(self.how_to_join()),
            "who_is_first_curator" => to_json(self.who_is_first_curator().await?),
            "network_versions" => to_json(self.network_versions().await?),
            "network_advisory" => to_json(self.network_advisory().await?),
            "request_citizenship" => {
                let a: RequestCitizenshipArgs = parse_args(name, args)?;
                to_json(self.request_citizenship(&a.npub, &a.display_name).await)
            }
            "confirm_citizenship" => {
                let a: ConfirmCitizenshipArgs = parse_args(name, args)?;
                to_json(
                    self.confirm_citizenship(&a.npub, &a.challenge_id, &a.signed_event_json)
                        .await,
                )
            }
            "renounce_membership" => {
                let a: NpubArgs = parse_args(name, args)?;
                to_json(self.renounce_membership(&a.npub))
            }
            "initiate_ban_election" => {
                let a: BanElectionArgs = parse_args(name, args)?;
                to_json(self.initiate_ban_election(&a.target_npub, &a.reason))
            }
            "cast_ban_vote" => {
                let a: BanVoteArgs = parse_args(name, args)?;
                to_json(self.cast_ban_vote(&a.election_id, &a.vote, &a.npub))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

// ============================================================================
// ARGUMENTS
// ============================================================================

#[derive(Debug, Deserialize)]
struct NpubArgs {
    npub: String,
}

#[derive(Debug, Deserialize)]
struct RequestCitizenshipArgs {
    npub: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmCitizenshipArgs {
    npub: String,
    challenge_id: String,
    /// Accepts either the event JSON as a string or the event object itself
    #[serde(deserialize_with = "string_or_json")]
    signed_event_json: String,
}

#[derive(Debug, Deserialize)]
struct BanElectionArgs {
    target_npub: String,
    reason: String,
}

#[derive(Debug, Deserialize)]
struct BanVoteArgs {
    election_id: String,
    vote: String,
    npub: String,
}

fn string_or_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

fn to_json<T: Serialize>(value: T) -> Result<Value, ToolError> {
    // Only fails for maps with non-string keys, which no tool returns
    Ok(serde_json::to_value(value).unwrap_or(Value::Null))
}
