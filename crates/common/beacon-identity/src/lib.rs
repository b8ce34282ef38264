pub mod authenticator;
pub mod keypair;
pub mod nonce;
pub mod trust;

pub use authenticator::{sign_request, AuthConfig, AuthError, RequestAuthenticator, VerifiedRequest};
pub use keypair::{load_or_generate_keypair, KeyPair};
pub use nonce::NonceStore;
pub use trust::{TrustRegistryError, TrustSnapshot, TrustStatus, TrustedKey, TrustedKeyRegistry};

pub type Signature = ed25519_dalek::Signature;
