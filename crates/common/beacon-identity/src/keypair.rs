use anyhow::{Context, Result};
use beacon_crypto::{encode_public_key, sign_base64};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fs;
use std::path::Path;

/// Ed25519 keypair the runner uses to sign receipts.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub pk: VerifyingKey,
    sk: SigningKey,
}

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let sk = SigningKey::generate(&mut OsRng);
        let pk = sk.verifying_key();
        Self { pk, sk }
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        let sk = SigningKey::from_bytes(bytes);
        let pk = sk.verifying_key();
        Self { pk, sk }
    }

    /// Sign arbitrary bytes, returning an Ed25519 signature.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        self.sk.sign(msg)
    }

    /// Sign arbitrary bytes, returning a base64 signature.
    pub fn sign_base64(&self, msg: &[u8]) -> String {
        sign_base64(&self.sk, msg)
    }

    /// Verify a signature against `msg`.
    pub fn verify(&self, msg: &[u8], sig: &Signature) -> bool {
        self.pk.verify(msg, sig).is_ok()
    }

    pub fn public_key_base64(&self) -> String {
        encode_public_key(&self.pk)
    }

    /// Return the bytes of the signing key
    pub fn to_bytes(&self) -> [u8; 32] {
        self.sk.to_bytes()
    }
}

/// Loads a raw 32-byte secret key from `path`, or generates and writes one when
/// the file is missing. A present but malformed file is an error.
pub fn load_or_generate_keypair(path: Option<&Path>) -> Result<KeyPair> {
    let Some(path) = path else {
        tracing::warn!("No runner key path configured; using an ephemeral keypair");
        return Ok(KeyPair::generate());
    };

    if path.exists() {
        let bytes = fs::read(path).with_context(|| format!("Failed to read key file {:?}", path))?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("Key file {:?} must hold exactly 32 bytes, found {}", path, bytes.len()))?;
        tracing::info!("Loaded runner keypair from {:?}", path);
        return Ok(KeyPair::from_secret_bytes(&secret));
    }

    let keypair = KeyPair::generate();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }
    fs::write(path, keypair.to_bytes()).with_context(|| format!("Failed to write key file {:?}", path))?;
    tracing::info!("Generated new runner keypair at {:?}", path);
    Ok(keypair)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_or_generate_persists_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys/runner.key");
        let first = load_or_generate_keypair(Some(&path)).unwrap();
        let second = load_or_generate_keypair(Some(&path)).unwrap();
        assert_eq!(first.public_key_base64(), second.public_key_base64());
    }

    #[test]
    fn malformed_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.key");
        fs::write(&path, b"short").unwrap();
        assert!(load_or_generate_keypair(Some(&path)).is_err());
    }

    #[test]
    fn sign_verify() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"hello");
        assert!(kp.verify(b"hello", &sig));
        assert!(!kp.verify(b"bye", &sig));
    }
}
