//! Citizenship Registration
//!
//! Two-step proof-of-key onboarding:
//!
//! 1. `request_citizenship` issues a nonce bound to the applicant's npub
//! 2. `confirm_citizenship` checks a Nostr event signed over that nonce and
//!    appends the applicant to `members.json`
//!
//! Challenge lifecycle: `NoChallenge -> Pending -> {Confirmed, Expired,
//! Superseded}`. A failed commit leaves the challenge pending so the same
//! signed event can be resubmitted.

use crate::challenge::{Challenge, ChallengeStore};
use crate::commit::{CommitError, MembershipCommitter};
use crate::identity::{self, challenge_marker, AssertionError, IdentityError};
use crate::member::{MemberEntry, MemberRecord};
use crate::registry::{Registry, RegistryError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    InvalidIdentity(#[from] IdentityError),
    #[error(transparent)]
    Assertion(#[from] AssertionError),
    #[error("Already a member with role '{role}'.")]
    AlreadyMember { role: String },
    #[error("A pending challenge already exists for this npub. Complete or wait for it to expire ({minutes} minutes).")]
    PendingChallengeExists { minutes: u64 },
    #[error("Challenge not found or expired. Call request_citizenship again.")]
    ChallengeNotFound,
    #[error("npub does not match the challenge.")]
    ChallengeNpubMismatch,
    #[error("This npub was registered while your challenge was pending.")]
    RegisteredWhilePending,
    #[error("Signature verified but membership commit failed: {0}")]
    CommitFailed(String),
    #[error("Community registry unavailable: {0}")]
    Registry(#[from] RegistryError),
}

/// Returned by `request_citizenship`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedChallenge {
    pub challenge_id: Uuid,
    pub nonce: String,
    pub expires_in_seconds: u64,
    pub instructions: String,
}

/// Returned by a successful `confirm_citizenship`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admission {
    pub status: String,
    pub commit_url: String,
    pub message: String,
}

pub struct RegistrationWorkflow {
    registry: Arc<dyn Registry>,
    committer: Arc<dyn MembershipCommitter>,
    challenges: ChallengeStore,
    challenge_ttl: Duration,
}

impl RegistrationWorkflow {
    pub fn new(
        registry: Arc<dyn Registry>,
        committer: Arc<dyn MembershipCommitter>,
        challenge_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            committer,
            challenges: ChallengeStore::new(),
            challenge_ttl,
        }
    }

    pub fn challenges(&self) -> &ChallengeStore {
        &self.challenges
    }

    /// Issue a signing challenge for `npub`
    pub async fn request_citizenship(
        &self,
        npub: &str,
        display_name: &str,
    ) -> Result<IssuedChallenge, RegistrationError> {
        identity::parse_npub(npub)?;

        // Best-effort only; confirm_citizenship re-checks without the cache
        if let Some(existing) = self.lookup(npub).await? {
            return Err(RegistrationError::AlreadyMember {
                role: existing.role().unwrap_or("unknown").to_string(),
            });
        }

        let now = Utc::now();
        self.challenges.prune(now);

        let challenge = Challenge::issue(npub, display_name, self.challenge_ttl);
        let issued = IssuedChallenge {
            challenge_id: challenge.challenge_id,
            nonce: challenge.nonce.clone(),
            expires_in_seconds: challenge.expires_in_seconds(challenge.created_at),
            instructions: signing_instructions(&challenge.nonce),
        };

        if self.challenges.issue_if_absent(challenge).is_err() {
            return Err(RegistrationError::PendingChallengeExists {
                minutes: self.challenge_ttl.as_secs() / 60,
            });
        }

        info!(
            "Issued citizenship challenge {} for {} ({})",
            issued.challenge_id,
            display_name,
            short(npub)
        );
        Ok(issued)
    }

    /// Verify the signed event for a pending challenge and admit the applicant
    pub async fn confirm_citizenship(
        &self,
        npub: &str,
        challenge_id: &str,
        signed_event_json: &str,
    ) -> Result<Admission, RegistrationError> {
        self.challenges.prune(Utc::now());

        let challenge_id =
            Uuid::parse_str(challenge_id.trim()).map_err(|_| RegistrationError::ChallengeNotFound)?;
        let challenge = self
            .challenges
            .get(&challenge_id)
            .ok_or(RegistrationError::ChallengeNotFound)?;

        if challenge.npub != npub {
            warn!("Challenge {} presented for a different npub", challenge_id);
            return Err(RegistrationError::ChallengeNpubMismatch);
        }

        let public_key = identity::parse_npub(npub)?;
        if let Err(e) = identity::verify_assertion(signed_event_json, &public_key, &challenge.nonce)
        {
            warn!("Rejected assertion for challenge {}: {}", challenge_id, e);
            return Err(e.into());
        }

        // Race guard: bypass the cache so a member added elsewhere is seen
        self.registry.invalidate_cache();
        if self.lookup(npub).await?.is_some() {
            self.challenges.remove(&challenge_id);
            return Err(RegistrationError::RegisteredWhilePending);
        }

        let upstream = match self.registry.get_first_curator().await {
            Ok(curator) => curator.and_then(|c| c.npub().map(str::to_string)),
            Err(e) => {
                error!("Failed to resolve Prime Authority: {}", e);
                return Err(RegistrationError::CommitFailed(e.to_string()));
            }
        };

        let record = MemberRecord::new_citizen(
            npub,
            &challenge.display_name,
            Utc::now().date_naive(),
            upstream,
        );

        let commit_url = match self.committer.append_member(&record).await {
            Ok(url) => url,
            Err(CommitError::AlreadyMember(_)) | Err(CommitError::PreconditionFailed) => {
                warn!(
                    "members.json changed under challenge {}; treating as registered",
                    challenge_id
                );
                self.challenges.remove(&challenge_id);
                self.registry.invalidate_cache();
                return Err(RegistrationError::RegisteredWhilePending);
            }
            Err(e) => {
                error!("Failed to commit membership: {}", e);
                return Err(RegistrationError::CommitFailed(e.to_string()));
            }
        };

        self.challenges.remove(&challenge_id);
        self.registry.invalidate_cache();
        info!(
            "Admitted citizen {} ({}) at {}",
            challenge.display_name,
            short(npub),
            commit_url
        );

        Ok(Admission {
            status: "admitted".to_string(),
            commit_url,
            message: format!(
                "Welcome to the DPYC Honor Chain, {}! Your membership has been registered. You are now a Citizen.",
                challenge.display_name
            ),
        })
    }

    async fn lookup(&self, npub: &str) -> Result<Option<MemberEntry>, RegistrationError> {
        self.registry.lookup_member(npub).await.map_err(|e| {
            error!("Registry lookup failed for {}: {}", short(npub), e);
            RegistrationError::Registry(e)
        })
    }
}

fn short(npub: &str) -> &str {
    &npub[..16.min(npub.len())]
}

fn signing_instructions(nonce: &str) -> String {
    let marker = challenge_marker(nonce);
    format!(
        "Sign a Nostr event with the content shown below, then call \
         confirm_citizenship with the signed event JSON.\n\n\
         Required event content: {marker}\n\n\
         Example using the dpyc CLI:\n\
         ```bash\n\
         dpyc sign --nsec nsec1YOUR_SECRET_KEY --nonce {nonce}\n\
         ```\n\n\
         Any Nostr client that can sign a kind-1 text note works, e.g. nak:\n\
         ```bash\n\
         nak event --sec nsec1YOUR_SECRET_KEY -c '{marker}'\n\
         ```"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keys;
    use crate::member::Role;
    use crate::testing::{member, CommitFailure, FakeRegistry, RecordingCommitter, CURATOR_NPUB};
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(600);

    struct Harness {
        registry: Arc<FakeRegistry>,
        committer: Arc<RecordingCommitter>,
        workflow: RegistrationWorkflow,
    }

    fn harness() -> Harness {
        let registry = FakeRegistry::with_curator();
        let committer = RecordingCommitter::backed_by(Arc::clone(&registry));
        let workflow = RegistrationWorkflow::new(
            registry.clone() as Arc<dyn Registry>,
            committer.clone() as Arc<dyn MembershipCommitter>,
            TTL,
        );
        Harness {
            registry,
            committer,
            workflow,
        }
    }

    fn signed(keys: &Keys, nonce: &str) -> String {
        keys.sign_text_note(&challenge_marker(nonce)).to_json()
    }

    #[tokio::test]
    async fn test_request_issues_challenge() {
        let h = harness();
        let keys = Keys::generate();

        let issued = h
            .workflow
            .request_citizenship(&keys.npub(), "Test")
            .await
            .unwrap();

        assert_eq!(issued.nonce.len(), 64);
        assert_eq!(issued.expires_in_seconds, 600);
        assert!(issued
            .instructions
            .contains(&format!("DPYC-CITIZENSHIP:{}", issued.nonce)));
        assert!(h.workflow.challenges().get(&issued.challenge_id).is_some());
    }

    #[tokio::test]
    async fn test_request_rejects_invalid_npub() {
        let h = harness();
        let result = h.workflow.request_citizenship("not-an-npub", "Test").await;
        assert!(matches!(result, Err(RegistrationError::InvalidIdentity(_))));
        assert!(h.workflow.challenges().is_empty());
    }

    #[tokio::test]
    async fn test_request_rejects_existing_member() {
        let h = harness();
        let keys = Keys::generate();
        h.registry
            .add_member(member(&keys.npub(), Role::Operator, "Olive"));

        let err = h
            .workflow
            .request_citizenship(&keys.npub(), "Olive")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::AlreadyMember { ref role } if role == "operator"
        ));
        assert_eq!(err.to_string(), "Already a member with role 'operator'.");
    }

    #[tokio::test]
    async fn test_second_request_while_pending() {
        let h = harness();
        let npub = Keys::generate().npub();

        let first = h.workflow.request_citizenship(&npub, "Test").await.unwrap();
        let err = h
            .workflow
            .request_citizenship(&npub, "Test")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::PendingChallengeExists { .. }));
        assert!(err.to_string().contains("(10 minutes)"));

        h.workflow.challenges().force_expire(&first.challenge_id);
        let second = h.workflow.request_citizenship(&npub, "Test").await.unwrap();
        assert_ne!(first.challenge_id, second.challenge_id);
        assert_eq!(h.workflow.challenges().len(), 1);
    }

    #[tokio::test]
    async fn test_request_registry_failure() {
        let h = harness();
        h.registry.set_failing(true);
        let result = h
            .workflow
            .request_citizenship(&Keys::generate().npub(), "Test")
            .await;
        assert!(matches!(result, Err(RegistrationError::Registry(_))));
        assert!(h.workflow.challenges().is_empty());
    }

    #[tokio::test]
    async fn test_confirmation_gate_ordering() {
        let h = harness();
        let keys = Keys::generate();
        let npub = keys.npub();
        let issued = h.workflow.request_citizenship(&npub, "Test").await.unwrap();
        let id = issued.challenge_id.to_string();

        // (a) different identity string
        let other = Keys::generate();
        let err = h
            .workflow
            .confirm_citizenship(&other.npub(), &id, &signed(&keys, &issued.nonce))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::ChallengeNpubMismatch));

        // (b) not JSON
        let err = h
            .workflow
            .confirm_citizenship(&npub, &id, "this is {not json")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::Assertion(AssertionError::Malformed(_))
        ));

        // (c) valid signature from the wrong key
        let err = h
            .workflow
            .confirm_citizenship(&npub, &id, &signed(&other, &issued.nonce))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::Assertion(AssertionError::IdentityMismatch)
        ));

        // (d) right key, wrong nonce
        let err = h
            .workflow
            .confirm_citizenship(&npub, &id, &signed(&keys, "deadbeef"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::Assertion(AssertionError::NonceMismatch { .. })
        ));
        assert_eq!(h.committer.attempts(), 0);

        // (e) correct marker
        let admission = h
            .workflow
            .confirm_citizenship(&npub, &id, &signed(&keys, &issued.nonce))
            .await
            .unwrap();
        assert_eq!(admission.status, "admitted");
        assert!(admission.message.contains("Welcome to the DPYC Honor Chain, Test!"));
        assert!(h.workflow.challenges().is_empty());

        let err = h
            .workflow
            .confirm_citizenship(&npub, &id, &signed(&keys, &issued.nonce))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::ChallengeNotFound));
    }

    #[tokio::test]
    async fn test_admitted_record_contents() {
        let h = harness();
        let keys = Keys::generate();
        let issued = h
            .workflow
            .request_citizenship(&keys.npub(), "Dana")
            .await
            .unwrap();

        h.workflow
            .confirm_citizenship(
                &keys.npub(),
                &issued.challenge_id.to_string(),
                &signed(&keys, &issued.nonce),
            )
            .await
            .unwrap();

        let committed = h.committer.committed();
        assert_eq!(committed.len(), 1);
        let record = &committed[0];
        assert_eq!(record.npub, keys.npub());
        assert_eq!(record.role, Role::Citizen);
        assert_eq!(record.status, "active");
        assert_eq!(record.display_name, "Dana");
        assert_eq!(record.member_since, Some(Utc::now().date_naive()));
        assert_eq!(record.upstream_authority_npub.as_deref(), Some(CURATOR_NPUB));
        assert_eq!(record.notes, MemberRecord::ADMISSION_NOTE);

        // Now a member, so a new request is refused
        let err = h
            .workflow
            .request_citizenship(&keys.npub(), "Dana")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::AlreadyMember { .. }));
    }

    #[tokio::test]
    async fn test_unknown_and_garbage_challenge_ids() {
        let h = harness();
        let npub = Keys::generate().npub();

        for id in [Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
            let err = h
                .workflow
                .confirm_citizenship(&npub, &id, "{}")
                .await
                .unwrap_err();
            assert!(matches!(err, RegistrationError::ChallengeNotFound));
        }
    }

    #[tokio::test]
    async fn test_expired_challenge_not_found() {
        let h = harness();
        let keys = Keys::generate();
        let issued = h
            .workflow
            .request_citizenship(&keys.npub(), "Test")
            .await
            .unwrap();
        h.workflow.challenges().force_expire(&issued.challenge_id);

        let err = h
            .workflow
            .confirm_citizenship(
                &keys.npub(),
                &issued.challenge_id.to_string(),
                &signed(&keys, &issued.nonce),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::ChallengeNotFound));
        assert!(h.workflow.challenges().is_empty());
    }

    #[tokio::test]
    async fn test_verification_failure_keeps_challenge() {
        let h = harness();
        let keys = Keys::generate();
        let issued = h
            .workflow
            .request_citizenship(&keys.npub(), "Test")
            .await
            .unwrap();

        let mut event = keys.sign_text_note(&challenge_marker(&issued.nonce));
        event.content.push_str(" tampered");
        let err = h
            .workflow
            .confirm_citizenship(
                &keys.npub(),
                &issued.challenge_id.to_string(),
                &event.to_json(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::Assertion(AssertionError::SignatureInvalid(_))
        ));
        assert!(h.workflow.challenges().get(&issued.challenge_id).is_some());
    }

    #[tokio::test]
    async fn test_registered_while_pending() {
        let h = harness();
        let keys = Keys::generate();
        let issued = h
            .workflow
            .request_citizenship(&keys.npub(), "Test")
            .await
            .unwrap();

        h.registry
            .add_member(member(&keys.npub(), Role::Citizen, "Test"));
        let before = h.registry.invalidations();

        let err = h
            .workflow
            .confirm_citizenship(
                &keys.npub(),
                &issued.challenge_id.to_string(),
                &signed(&keys, &issued.nonce),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::RegisteredWhilePending));
        assert!(h.registry.invalidations() > before);
        assert!(h.workflow.challenges().is_empty());
        assert_eq!(h.committer.attempts(), 0);
    }

    #[tokio::test]
    async fn test_untyped_entries_still_count_as_members() {
        let h = harness();
        let keys = Keys::generate();
        // Unparseable date and a role this version does not know
        h.registry.add_entry(json!({
            "npub": "npub1bob",
            "role": "citizen",
            "member_since": "Feb 2026"
        }));
        h.registry
            .add_entry(json!({"npub": keys.npub(), "role": "ambassador"}));

        let err = h
            .workflow
            .request_citizenship(&keys.npub(), "Test")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Already a member with role 'ambassador'.");

        let newcomer = Keys::generate();
        let issued = h
            .workflow
            .request_citizenship(&newcomer.npub(), "New")
            .await
            .unwrap();
        h.registry
            .add_entry(json!({"npub": newcomer.npub(), "member_since": "soon"}));

        let err = h
            .workflow
            .confirm_citizenship(
                &newcomer.npub(),
                &issued.challenge_id.to_string(),
                &signed(&newcomer, &issued.nonce),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::RegisteredWhilePending));
        assert_eq!(h.committer.attempts(), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_then_retry() {
        let h = harness();
        let keys = Keys::generate();
        let issued = h
            .workflow
            .request_citizenship(&keys.npub(), "Test")
            .await
            .unwrap();
        let id = issued.challenge_id.to_string();
        let event = signed(&keys, &issued.nonce);

        h.committer.fail_with(Some(CommitFailure::ServerError));
        let err = h
            .workflow
            .confirm_citizenship(&keys.npub(), &id, &event)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::CommitFailed(_)));
        assert!(err
            .to_string()
            .starts_with("Signature verified but membership commit failed:"));
        assert!(h.workflow.challenges().get(&issued.challenge_id).is_some());

        h.committer.fail_with(None);
        let admission = h
            .workflow
            .confirm_citizenship(&keys.npub(), &id, &event)
            .await
            .unwrap();
        assert_eq!(admission.status, "admitted");
        assert_eq!(h.committer.attempts(), 2);
        assert_eq!(h.committer.committed().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_token_is_commit_failure() {
        let h = harness();
        let keys = Keys::generate();
        let issued = h
            .workflow
            .request_citizenship(&keys.npub(), "Test")
            .await
            .unwrap();

        h.committer.fail_with(Some(CommitFailure::NotConfigured));
        let err = h
            .workflow
            .confirm_citizenship(
                &keys.npub(),
                &issued.challenge_id.to_string(),
                &signed(&keys, &issued.nonce),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("GITHUB_TOKEN"));
        assert_eq!(h.workflow.challenges().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_conflicts_count_as_registered() {
        for failure in [CommitFailure::AlreadyMember, CommitFailure::PreconditionFailed] {
            let h = harness();
            let keys = Keys::generate();
            let issued = h
                .workflow
                .request_citizenship(&keys.npub(), "Test")
                .await
                .unwrap();

            h.committer.fail_with(Some(failure));
            let err = h
                .workflow
                .confirm_citizenship(
                    &keys.npub(),
                    &issued.challenge_id.to_string(),
                    &signed(&keys, &issued.nonce),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, RegistrationError::RegisteredWhilePending));
            assert!(h.workflow.challenges().is_empty());
        }
    }

    #[tokio::test]
    async fn test_registry_failure_during_confirm_keeps_challenge() {
        let h = harness();
        let keys = Keys::generate();
        let issued = h
            .workflow
            .request_citizenship(&keys.npub(), "Test")
            .await
            .unwrap();

        h.registry.set_failing(true);
        let err = h
            .workflow
            .confirm_citizenship(
                &keys.npub(),
                &issued.challenge_id.to_string(),
                &signed(&keys, &issued.nonce),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Registry(_)));
        assert_eq!(h.workflow.challenges().len(), 1);
        assert_eq!(h.committer.attempts(), 0);
    }

    #[tokio::test]
    async fn test_no_curator_leaves_upstream_empty() {
        let registry = Arc::new(FakeRegistry::default());
        let committer = RecordingCommitter::new();
        let workflow = RegistrationWorkflow::new(
            registry.clone() as Arc<dyn Registry>,
            committer.clone() as Arc<dyn MembershipCommitter>,
            TTL,
        );
        let keys = Keys::generate();
        let issued = workflow
            .request_citizenship(&keys.npub(), "Test")
            .await
            .unwrap();

        workflow
            .confirm_citizenship(
                &keys.npub(),
                &issued.challenge_id.to_string(),
                &signed(&keys, &issued.nonce),
            )
            .await
            .unwrap();
        assert!(committer.committed()[0].upstream_authority_npub.is_none());
    }
}
