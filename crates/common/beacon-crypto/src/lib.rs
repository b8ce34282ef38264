pub mod canonical;
pub mod signing;

pub use canonical::{canonical_json, canonicalize, sha256_hex, SIGNATURE_FIELDS};
pub use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
pub use signing::{
    decode_public_key, decode_signature, encode_public_key, sign_base64, verify_base64,
    CryptoError,
};
