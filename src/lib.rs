//! DPYC Oracle
//!
//! Community concierge for the DPYC Honor Chain. Answers questions about
//! membership, governance and onboarding by reading the dpyc-community
//! registry, and admits new Citizens who prove ownership of a Nostr key.
//!
//! ## Module Structure
//!
//! - `config`: environment-driven settings
//! - `member`: registry record types
//! - `registry`: read-through cached client for the community registry
//! - `identity`: npub parsing and signed-event verification
//! - `challenge`: in-memory store of pending citizenship challenges
//! - `commit`: durable membership writes via the GitHub contents API
//! - `registration`: the citizenship request/confirm workflow
//! - `tools`: the public tool surface and dispatch
//! - `server`: HTTP transport for the tools

pub mod challenge;
pub mod commit;
pub mod config;
pub mod identity;
pub mod member;
pub mod registration;
pub mod registry;
pub mod server;
pub mod tools;

#[cfg(test)]
mod testing;

pub use challenge::{Challenge, ChallengeStore};
pub use commit::{CommitError, GitHubCommitter, MembershipCommitter};
pub use config::OracleConfig;
pub use identity::{AssertionError, IdentityError, Keys, SignedEvent};
pub use member::{MemberEntry, MemberRecord, NetworkStatus, Role};
pub use registration::{Admission, IssuedChallenge, RegistrationError, RegistrationWorkflow};
pub use registry::{CommunityRegistry, Registry, RegistryError};
pub use server::run_server;
pub use tools::{Oracle, ToolError};
