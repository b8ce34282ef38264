use beacon_crypto::{canonical_json, verify_base64, CryptoError, SIGNATURE_FIELDS};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::keypair::KeyPair;
use crate::nonce::NonceStore;
use crate::trust::{TrustStatus, TrustedKeyRegistry};

/// Rejection reasons for an inbound signed request. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid encoding for {0}")]
    InvalidEncoding(&'static str),

    #[error("failed to canonicalize request: {0}")]
    Canonicalization(String),

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("timestamp rejected: {0}")]
    TimestampInvalid(String),

    #[error("replay detected: nonce already used")]
    ReplayDetected,

    #[error("public key not trusted: {0}")]
    UntrustedKey(TrustStatus),
}

impl AuthError {
    /// Stable machine-readable code returned to API callers.
    pub fn code(&self) -> String {
        match self {
            AuthError::MissingField(field) => format!("missing_field:{}", field),
            AuthError::InvalidEncoding(field) => format!("invalid_encoding:{}", field),
            AuthError::Canonicalization(_) => "canonicalization_error".to_string(),
            AuthError::SignatureInvalid => "signature_mismatch".to_string(),
            AuthError::TimestampInvalid(_) => "timestamp_invalid".to_string(),
            AuthError::ReplayDetected => "replay_detected".to_string(),
            AuthError::UntrustedKey(status) => format!("trust_violation:{}", status),
        }
    }
}

impl From<CryptoError> for AuthError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Serialization(e) => AuthError::Canonicalization(e.to_string()),
            CryptoError::Base64 { field } => AuthError::InvalidEncoding(field),
            CryptoError::InvalidKeyLength(_) | CryptoError::InvalidPublicKey(_) => {
                AuthError::InvalidEncoding("public_key")
            }
            CryptoError::InvalidSignatureLength(_) => AuthError::InvalidEncoding("signature"),
            CryptoError::VerificationFailed => AuthError::SignatureInvalid,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Reject keys that are not `trusted` in the allowlist.
    pub trust_enforce: bool,
    /// How far in the future a request timestamp may be.
    pub max_skew: std::time::Duration,
    /// How old a request timestamp may be.
    pub max_age: std::time::Duration,
    pub replay_protection: bool,
    /// Development-only: accept every request without checks.
    pub bypass: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            trust_enforce: false,
            max_skew: std::time::Duration::from_secs(300),
            max_age: std::time::Duration::from_secs(600),
            replay_protection: true,
            bypass: false,
        }
    }
}

/// Facts established about a request that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRequest {
    pub public_key: String,
    pub kid: Option<String>,
    pub nonce: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub bypassed: bool,
}

/// Gatekeeper for job submission: signature, freshness, replay and trust checks.
#[derive(Debug, Clone)]
pub struct RequestAuthenticator {
    config: AuthConfig,
    trust: Arc<TrustedKeyRegistry>,
    nonces: Arc<NonceStore>,
}

impl RequestAuthenticator {
    pub fn new(config: AuthConfig, trust: Arc<TrustedKeyRegistry>, nonces: Arc<NonceStore>) -> Self {
        if config.bypass {
            tracing::error!(
                "AUTH BYPASS ENABLED: job signatures, timestamps, nonces and trust are NOT checked. Never run this in production."
            );
        }
        Self { config, trust, nonces }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn trust(&self) -> &Arc<TrustedKeyRegistry> {
        &self.trust
    }

    pub fn verify(&self, request: &Value) -> Result<VerifiedRequest, AuthError> {
        self.verify_at(request, Utc::now())
    }

    /// Verifies `request` as of `now`. The nonce is recorded only after the
    /// signature checks out, so a forged request cannot burn a real nonce.
    pub fn verify_at(&self, request: &Value, now: DateTime<Utc>) -> Result<VerifiedRequest, AuthError> {
        let public_key = str_field(request, "public_key");
        let nonce = request
            .get("metadata")
            .and_then(|m| m.get("nonce"))
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        if self.config.bypass {
            tracing::warn!("Auth bypass active: accepting request without verification");
            return Ok(VerifiedRequest {
                public_key: public_key.unwrap_or_default().to_string(),
                kid: None,
                nonce,
                timestamp: None,
                bypassed: true,
            });
        }

        let public_key = public_key.ok_or(AuthError::MissingField("public_key"))?;
        let signature = str_field(request, "signature").ok_or(AuthError::MissingField("signature"))?;

        let mut kid = None;
        if self.config.trust_enforce {
            let snapshot = self.trust.snapshot();
            let status = snapshot.evaluate(public_key, now);
            if status != TrustStatus::Trusted {
                tracing::warn!("Rejected job from untrusted key ({})", status);
                return Err(AuthError::UntrustedKey(status));
            }
            kid = snapshot.by_public_key(public_key).map(|k| k.kid.clone());
        }

        let timestamp = request_timestamp(request)?;
        self.check_timestamp(timestamp, now)?;

        let message = canonical_json(request, SIGNATURE_FIELDS)?;
        verify_base64(&message, signature, public_key).map_err(AuthError::from)?;

        if self.config.replay_protection {
            let nonce = nonce.as_deref().ok_or(AuthError::MissingField("nonce"))?;
            if !self.nonces.check_and_insert(public_key, nonce, now) {
                tracing::warn!("Replay detected for nonce {}", nonce);
                return Err(AuthError::ReplayDetected);
            }
        }

        Ok(VerifiedRequest {
            public_key: public_key.to_string(),
            kid,
            nonce,
            timestamp: Some(timestamp),
            bypassed: false,
        })
    }

    fn check_timestamp(&self, ts: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), AuthError> {
        let skew = Duration::from_std(self.config.max_skew).unwrap_or_else(|_| Duration::minutes(5));
        let age = Duration::from_std(self.config.max_age).unwrap_or_else(|_| Duration::minutes(10));
        if ts > now + skew {
            return Err(AuthError::TimestampInvalid(format!(
                "timestamp too far in future: {} > {}",
                ts.to_rfc3339(),
                (now + skew).to_rfc3339()
            )));
        }
        if ts < now - age {
            return Err(AuthError::TimestampInvalid(format!(
                "timestamp too old: {} < {}",
                ts.to_rfc3339(),
                (now - age).to_rfc3339()
            )));
        }
        Ok(())
    }
}

/// Client-side counterpart of [`RequestAuthenticator::verify`]: sets
/// `public_key` and `signature` on a JSON request object.
pub fn sign_request(request: &mut Value, keypair: &KeyPair) -> Result<(), CryptoError> {
    let message = canonical_json(request, SIGNATURE_FIELDS)?;
    let signature = keypair.sign_base64(&message);
    if let Value::Object(map) = request {
        map.insert("public_key".into(), Value::String(keypair.public_key_base64()));
        map.insert("signature".into(), Value::String(signature));
    }
    Ok(())
}

fn str_field<'a>(request: &'a Value, field: &str) -> Option<&'a str> {
    request
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// `metadata.timestamp`, falling back to `created_at`.
fn request_timestamp(request: &Value) -> Result<DateTime<Utc>, AuthError> {
    let raw = request
        .get("metadata")
        .and_then(|m| m.get("timestamp"))
        .and_then(Value::as_str)
        .or_else(|| str_field(request, "created_at"))
        .ok_or_else(|| AuthError::TimestampInvalid("missing timestamp".to_string()))?;
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| AuthError::TimestampInvalid(format!("unparsable timestamp {:?}", raw)))
}
