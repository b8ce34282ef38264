use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};
use ed25519_dalek::{Signature, SignatureError as Ed25519SignatureError, Signer, SigningKey, VerifyingKey};
use signature::Verifier;
use thiserror::Error;

/// Error types for signing and verification
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Failed to serialize value for signing: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid base64 in {field}")]
    Base64 { field: &'static str },

    #[error("Invalid key length: expected 32 bytes, found {0} bytes")]
    InvalidKeyLength(usize),

    #[error("Invalid signature length: expected 64 bytes, found {0} bytes")]
    InvalidSignatureLength(usize),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(Ed25519SignatureError),

    #[error("signature verification failed")]
    VerificationFailed,
}

/// Decodes base64 in any of the common alphabets, padded or not.
fn decode_any(input: &str, field: &'static str) -> Result<Vec<u8>, CryptoError> {
    let input = input.trim();
    STANDARD
        .decode(input)
        .or_else(|_| STANDARD_NO_PAD.decode(input))
        .or_else(|_| URL_SAFE.decode(input))
        .or_else(|_| URL_SAFE_NO_PAD.decode(input))
        .map_err(|_| CryptoError::Base64 { field })
}

pub fn decode_public_key(b64: &str) -> Result<VerifyingKey, CryptoError> {
    let bytes = decode_any(b64, "public_key")?;
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength(bytes.len()))?;
    VerifyingKey::from_bytes(&arr).map_err(CryptoError::InvalidPublicKey)
}

pub fn decode_signature(b64: &str) -> Result<Signature, CryptoError> {
    let bytes = decode_any(b64, "signature")?;
    let arr: [u8; 64] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidSignatureLength(bytes.len()))?;
    Ok(Signature::from_bytes(&arr))
}

pub fn encode_public_key(key: &VerifyingKey) -> String {
    STANDARD.encode(key.to_bytes())
}

/// Signs `msg`, returning a standard base64 signature.
pub fn sign_base64(key: &SigningKey, msg: &[u8]) -> String {
    STANDARD.encode(key.sign(msg).to_bytes())
}

/// Verifies a base64 signature over `msg` with a base64 public key.
pub fn verify_base64(msg: &[u8], signature_b64: &str, public_key_b64: &str) -> Result<(), CryptoError> {
    let key = decode_public_key(public_key_b64)?;
    let sig = decode_signature(signature_b64)?;
    key.verify(msg, &sig)
        .map_err(|_| CryptoError::VerificationFailed)
}
