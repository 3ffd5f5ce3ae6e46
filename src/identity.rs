//! Nostr Identity Verification
//!
//! Provides:
//! - npub / nsec (bech32) parsing and encoding
//! - NIP-01 event id computation
//! - BIP-340 Schnorr verification of signed events
//! - The four-gate citizenship assertion check
//! - Key generation and text-note signing for clients

use bech32::{Bech32, Hrp};
use secp256k1::{schnorr, Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Marker prefix the signed event content must carry before the nonce
pub const CHALLENGE_PREFIX: &str = "DPYC-CITIZENSHIP:";

/// Nostr kind for a short text note
pub const TEXT_NOTE_KIND: u16 = 1;

const NPUB_HRP: Hrp = Hrp::parse_unchecked("npub");
const NSEC_HRP: Hrp = Hrp::parse_unchecked("nsec");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Invalid npub format: {0}")]
    InvalidIdentity(String),
    #[error("Invalid nsec format: {0}")]
    InvalidSecret(String),
}

/// Why a signed citizenship assertion was rejected.
///
/// Variants are ordered as the gates run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssertionError {
    #[error("Failed to parse signed event JSON: {0}")]
    Malformed(String),
    #[error("Schnorr signature verification failed: {0}")]
    SignatureInvalid(String),
    #[error("Event pubkey does not match the claimed npub.")]
    IdentityMismatch,
    #[error("Event content must contain '{expected}'. Got: '{got}'")]
    NonceMismatch { expected: String, got: String },
}

// ============================================================================
// NPUB / NSEC
// ============================================================================

/// Parse and validate an `npub1...` identity
pub fn parse_npub(npub: &str) -> Result<XOnlyPublicKey, IdentityError> {
    if !npub.starts_with("npub1") {
        return Err(IdentityError::InvalidIdentity(format!(
            "must start with 'npub1': {}",
            npub
        )));
    }

    let (hrp, data) =
        bech32::decode(npub).map_err(|e| IdentityError::InvalidIdentity(e.to_string()))?;
    if hrp != NPUB_HRP {
        return Err(IdentityError::InvalidIdentity(format!(
            "unexpected prefix '{}'",
            hrp
        )));
    }
    if data.len() != 32 {
        return Err(IdentityError::InvalidIdentity(format!(
            "expected 32 key bytes, got {}",
            data.len()
        )));
    }

    XOnlyPublicKey::from_slice(&data).map_err(|e| IdentityError::InvalidIdentity(e.to_string()))
}

pub fn encode_npub(public_key: &XOnlyPublicKey) -> String {
    encode_bech32(NPUB_HRP, &public_key.serialize())
}

pub fn parse_nsec(nsec: &str) -> Result<SecretKey, IdentityError> {
    let (hrp, data) =
        bech32::decode(nsec).map_err(|e| IdentityError::InvalidSecret(e.to_string()))?;
    if hrp != NSEC_HRP {
        return Err(IdentityError::InvalidSecret(format!(
            "unexpected prefix '{}'",
            hrp
        )));
    }
    SecretKey::from_slice(&data).map_err(|e| IdentityError::InvalidSecret(e.to_string()))
}

pub fn encode_nsec(secret_key: &SecretKey) -> String {
    encode_bech32(NSEC_HRP, &secret_key.secret_bytes())
}

fn encode_bech32(hrp: Hrp, data: &[u8]) -> String {
    // Only fails past the 1023-character code length limit
    bech32::encode::<Bech32>(hrp, data).unwrap_or_default()
}

// ============================================================================
// SIGNED EVENTS
// ============================================================================

/// A NIP-01 Nostr event as submitted by the applicant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedEvent {
    /// Lowercase hex SHA-256 of the serialized event
    pub id: String,
    /// Lowercase hex x-only public key
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u16,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    pub content: String,
    /// Lowercase hex Schnorr signature over `id`
    pub sig: String,
}

impl SignedEvent {
    pub fn from_json(json: &str) -> Result<Self, AssertionError> {
        serde_json::from_str(json).map_err(|e| AssertionError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Recompute the event id from its contents
    pub fn compute_id(&self) -> [u8; 32] {
        event_id(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content)
    }

    /// Embedded author key
    pub fn author(&self) -> Result<XOnlyPublicKey, AssertionError> {
        let bytes = decode_hex_array::<32>("pubkey", &self.pubkey)?;
        XOnlyPublicKey::from_slice(&bytes)
            .map_err(|e| AssertionError::Malformed(format!("invalid pubkey: {}", e)))
    }

    /// Check the id matches the contents and the signature matches the id
    pub fn verify(&self) -> Result<(), AssertionError> {
        let author = self.author()?;
        let claimed_id = decode_hex_array::<32>("id", &self.id)?;
        let sig_bytes = decode_hex_array::<64>("sig", &self.sig)?;
        let signature = schnorr::Signature::from_slice(&sig_bytes)
            .map_err(|e| AssertionError::Malformed(format!("invalid sig: {}", e)))?;

        if self.compute_id() != claimed_id {
            return Err(AssertionError::SignatureInvalid(
                "event id does not match event contents".to_string(),
            ));
        }

        let message = Message::from_digest(claimed_id);
        Secp256k1::verification_only()
            .verify_schnorr(&signature, &message, &author)
            .map_err(|e| AssertionError::SignatureInvalid(e.to_string()))
    }
}

/// NIP-01 id: sha256 of `[0, pubkey, created_at, kind, tags, content]`
pub fn event_id(
    pubkey_hex: &str,
    created_at: i64,
    kind: u16,
    tags: &[Vec<String>],
    content: &str,
) -> [u8; 32] {
    let serialized = json!([0, pubkey_hex, created_at, kind, tags, content]).to_string();
    Sha256::digest(serialized.as_bytes()).into()
}

fn decode_hex_array<const N: usize>(field: &str, value: &str) -> Result<[u8; N], AssertionError> {
    let bytes = hex::decode(value)
        .map_err(|e| AssertionError::Malformed(format!("invalid {} hex: {}", field, e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        AssertionError::Malformed(format!(
            "invalid {} length: {} (expected {})",
            field,
            b.len(),
            N
        ))
    })
}

// ============================================================================
// CITIZENSHIP ASSERTION
// ============================================================================

/// Content the applicant must sign for a given nonce
pub fn challenge_marker(nonce: &str) -> String {
    format!("{}{}", CHALLENGE_PREFIX, nonce)
}

/// Run the assertion gates in order: parse, signature, identity, nonce.
pub fn verify_assertion(
    signed_event_json: &str,
    expected_pubkey: &XOnlyPublicKey,
    expected_nonce: &str,
) -> Result<SignedEvent, AssertionError> {
    let event = SignedEvent::from_json(signed_event_json)?;
    // Shape errors inside hex fields also count as malformed
    event.author()?;

    event.verify()?;

    if event.author()? != *expected_pubkey {
        debug!(
            "Assertion signed by {} instead of expected key",
            &event.pubkey[..16.min(event.pubkey.len())]
        );
        return Err(AssertionError::IdentityMismatch);
    }

    let expected = challenge_marker(expected_nonce);
    if !event.content.contains(&expected) {
        return Err(AssertionError::NonceMismatch {
            expected,
            got: event.content.chars().take(100).collect(),
        });
    }

    Ok(event)
}

// ============================================================================
// CLIENT SIDE
// ============================================================================

/// A Nostr keypair
#[derive(Clone)]
pub struct Keys {
    keypair: Keypair,
}

impl Keys {
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::new(&secp, &mut secp256k1::rand::thread_rng());
        Self { keypair }
    }

    pub fn from_secret_key(secret_key: &SecretKey) -> Self {
        let secp = Secp256k1::new();
        Self {
            keypair: Keypair::from_secret_key(&secp, secret_key),
        }
    }

    pub fn parse_nsec(nsec: &str) -> Result<Self, IdentityError> {
        parse_nsec(nsec).map(|sk| Self::from_secret_key(&sk))
    }

    pub fn public_key(&self) -> XOnlyPublicKey {
        self.keypair.x_only_public_key().0
    }

    pub fn npub(&self) -> String {
        encode_npub(&self.public_key())
    }

    pub fn nsec(&self) -> String {
        encode_nsec(&self.keypair.secret_key())
    }

    /// Build and sign an event with explicit fields
    pub fn sign_event(
        &self,
        created_at: i64,
        kind: u16,
        tags: Vec<Vec<String>>,
        content: &str,
    ) -> SignedEvent {
        let pubkey = hex::encode(self.public_key().serialize());
        let id = event_id(&pubkey, created_at, kind, &tags, content);
        let signature = Secp256k1::new().sign_schnorr(&Message::from_digest(id), &self.keypair);

        SignedEvent {
            id: hex::encode(id),
            pubkey,
            created_at,
            kind,
            tags,
            content: content.to_string(),
            sig: hex::encode(signature.serialize()),
        }
    }

    /// Sign a kind-1 text note stamped with the current time
    pub fn sign_text_note(&self, content: &str) -> SignedEvent {
        self.sign_event(
            chrono::Utc::now().timestamp(),
            TEXT_NOTE_KIND,
            Vec::new(),
            content,
        )
    }
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys").field("npub", &self.npub()).finish()
    }
}
