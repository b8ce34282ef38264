use beacon_crypto::{canonicalize, sha256_hex, canonical_json, verify_base64, CryptoError, SIGNATURE_FIELDS};
use beacon_identity::KeyPair;
use beacon_types::Receipt;
use thiserror::Error;

/// Errors that can occur during receipt signing operations
#[derive(Debug, Error)]
pub enum SignError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Signature is missing from the receipt")]
    MissingSignature,

    #[error("Output hash does not match receipt data")]
    OutputHashMismatch,

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
}

impl From<CryptoError> for SignError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Serialization(e) => SignError::Serialization(e.to_string()),
            other => SignError::InvalidSignature(other.to_string()),
        }
    }
}

/// Sign a Receipt to prove authenticity
///
/// The signature covers the canonical JSON of the receipt without its
/// `signature` and `public_key` fields.
pub fn sign_receipt(receipt: &mut Receipt, kp: &KeyPair) -> Result<(), SignError> {
    let bytes = canonicalize(&*receipt, SIGNATURE_FIELDS)?;
    receipt.signature = kp.sign_base64(&bytes);
    receipt.public_key = kp.public_key_base64();
    Ok(())
}

/// Verify the signature and output hash of a Receipt
///
/// Returns `Ok(false)` when the signature does not match, and an error when
/// the receipt cannot be checked at all.
pub fn verify_receipt(receipt: &Receipt) -> Result<bool, SignError> {
    if receipt.signature.is_empty() || receipt.public_key.is_empty() {
        return Err(SignError::MissingSignature);
    }
    let data_hash = sha256_hex(&canonical_json(&receipt.output.data, &[])?);
    if data_hash != receipt.output.hash {
        return Err(SignError::OutputHashMismatch);
    }
    let bytes = canonicalize(receipt, SIGNATURE_FIELDS)?;
    match verify_base64(&bytes, &receipt.signature, &receipt.public_key) {
        Ok(()) => Ok(true),
        Err(CryptoError::VerificationFailed) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_receipt, ReceiptDraft};
    use chrono::Utc;
    use serde_json::{json, Map};

    fn draft() -> ReceiptDraft {
        let now = Utc::now();
        ReceiptDraft {
            job_id: "job-1".into(),
            unit_id: "unit-1".into(),
            provider_id: "modal-us-east".into(),
            region: "US".into(),
            model_id: "llama3.2-1b".into(),
            question_id: "q0".into(),
            started_at: now,
            completed_at: now,
            output: json!({ "response": "An answer." }),
            benchmark_hash: "sha256:abc".into(),
            execution_env: Map::new(),
        }
    }

    #[test]
    fn test_sign_and_verify_receipt() {
        let kp = KeyPair::generate();
        let mut receipt = build_receipt(draft()).unwrap();
        sign_receipt(&mut receipt, &kp).unwrap();
        assert!(verify_receipt(&receipt).unwrap(), "Signature verification should succeed");

        // Signed by someone else but claiming our key
        let other = KeyPair::generate();
        let mut forged = receipt.clone();
        sign_receipt(&mut forged, &other).unwrap();
        forged.public_key = kp.public_key_base64();
        assert!(!verify_receipt(&forged).unwrap(), "Verification with wrong signature should fail");
    }

    #[test]
    fn mutation_after_signing_fails() {
        let kp = KeyPair::generate();
        let mut receipt = build_receipt(draft()).unwrap();
        sign_receipt(&mut receipt, &kp).unwrap();

        let mut moved = receipt.clone();
        moved.execution_details.region = "EU".into();
        assert!(!verify_receipt(&moved).unwrap());

        let mut rewritten = receipt.clone();
        rewritten.output.data = json!({ "response": "Different." });
        assert!(matches!(verify_receipt(&rewritten), Err(SignError::OutputHashMismatch)));
    }

    #[test]
    fn unsigned_receipt_is_rejected() {
        let receipt = build_receipt(draft()).unwrap();
        assert!(matches!(verify_receipt(&receipt), Err(SignError::MissingSignature)));
    }
}
