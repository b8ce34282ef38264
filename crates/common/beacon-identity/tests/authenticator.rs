use beacon_identity::{
    sign_request, AuthConfig, AuthError, KeyPair, NonceStore, RequestAuthenticator, TrustSnapshot,
    TrustStatus, TrustedKey, TrustedKeyRegistry,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

fn job_request(nonce: &str) -> Value {
    json!({
        "version": "v1",
        "benchmark": {
            "name": "bias-detection",
            "container": { "image": "beacon/runner" },
            "input": { "hash": "sha256:abc" }
        },
        "constraints": { "regions": ["US", "EU", "ASIA"], "min_regions": 2 },
        "metadata": {
            "timestamp": Utc::now().to_rfc3339(),
            "nonce": nonce,
            "models": ["llama3.2-1b"]
        },
        "questions": ["What happened at Tiananmen Square in 1989?"]
    })
}

fn authenticator(config: AuthConfig, trust: TrustedKeyRegistry) -> RequestAuthenticator {
    RequestAuthenticator::new(
        config,
        Arc::new(trust),
        Arc::new(NonceStore::new(std::time::Duration::from_secs(900))),
    )
}

#[test]
fn valid_signature_is_accepted() {
    let kp = KeyPair::generate();
    let mut req = job_request("n-1");
    sign_request(&mut req, &kp).unwrap();

    let auth = authenticator(AuthConfig::default(), TrustedKeyRegistry::empty());
    let verified = auth.verify(&req).unwrap();
    assert_eq!(verified.public_key, kp.public_key_base64());
    assert_eq!(verified.nonce.as_deref(), Some("n-1"));
    assert!(!verified.bypassed);
}

#[test]
fn any_field_mutation_breaks_the_signature() {
    let kp = KeyPair::generate();
    let mut signed = job_request("n-2");
    sign_request(&mut signed, &kp).unwrap();

    let mutations: Vec<Box<dyn Fn(&mut Value)>> = vec![
        Box::new(|v| v["version"] = json!("v2")),
        Box::new(|v| v["benchmark"]["name"] = json!("other")),
        Box::new(|v| v["constraints"]["regions"] = json!(["US"])),
        Box::new(|v| v["questions"][0] = json!("Something else?")),
        Box::new(|v| v["metadata"]["models"] = json!(["gpt-x"])),
        Box::new(|v| v["extra"] = json!(true)),
    ];

    for (i, mutate) in mutations.iter().enumerate() {
        let mut req = signed.clone();
        mutate(&mut req);
        let auth = authenticator(AuthConfig::default(), TrustedKeyRegistry::empty());
        assert_eq!(auth.verify(&req), Err(AuthError::SignatureInvalid), "mutation {}", i);
    }
}

#[test]
fn replayed_nonce_is_rejected_even_with_other_changes() {
    let kp = KeyPair::generate();
    let auth = authenticator(AuthConfig::default(), TrustedKeyRegistry::empty());

    let mut first = job_request("same-nonce");
    sign_request(&mut first, &kp).unwrap();
    auth.verify(&first).unwrap();

    let mut second = job_request("same-nonce");
    second["questions"] = json!(["A different question?"]);
    sign_request(&mut second, &kp).unwrap();
    assert_eq!(auth.verify(&second), Err(AuthError::ReplayDetected));
}

#[test]
fn forged_request_does_not_burn_nonce() {
    let kp = KeyPair::generate();
    let auth = authenticator(AuthConfig::default(), TrustedKeyRegistry::empty());

    let mut req = job_request("fresh");
    sign_request(&mut req, &kp).unwrap();
    let mut forged = req.clone();
    forged["version"] = json!("tampered");
    assert_eq!(auth.verify(&forged), Err(AuthError::SignatureInvalid));
    assert!(auth.verify(&req).is_ok());
}

#[test]
fn stale_and_future_timestamps_are_rejected() {
    let kp = KeyPair::generate();
    let auth = authenticator(AuthConfig::default(), TrustedKeyRegistry::empty());

    let mut old = job_request("old");
    old["metadata"]["timestamp"] = json!((Utc::now() - Duration::hours(1)).to_rfc3339());
    sign_request(&mut old, &kp).unwrap();
    assert!(matches!(auth.verify(&old), Err(AuthError::TimestampInvalid(_))));

    let mut future = job_request("future");
    future["metadata"]["timestamp"] = json!((Utc::now() + Duration::hours(1)).to_rfc3339());
    sign_request(&mut future, &kp).unwrap();
    assert!(matches!(auth.verify(&future), Err(AuthError::TimestampInvalid(_))));

    let mut missing = job_request("missing");
    missing["metadata"].as_object_mut().unwrap().remove("timestamp");
    sign_request(&mut missing, &kp).unwrap();
    assert!(matches!(auth.verify(&missing), Err(AuthError::TimestampInvalid(_))));
}

#[test]
fn trust_enforcement_uses_allowlist() {
    let trusted = KeyPair::generate();
    let revoked = KeyPair::generate();
    let stranger = KeyPair::generate();
    let snapshot = TrustSnapshot::from_entries(vec![
        TrustedKey {
            kid: "main".into(),
            public_key: trusted.public_key_base64(),
            status: "active".into(),
            not_before: None,
            not_after: None,
        },
        TrustedKey {
            kid: "old".into(),
            public_key: revoked.public_key_base64(),
            status: "revoked".into(),
            not_before: None,
            not_after: None,
        },
    ])
    .unwrap();
    let config = AuthConfig { trust_enforce: true, ..AuthConfig::default() };
    let auth = authenticator(config, TrustedKeyRegistry::from_snapshot(snapshot));

    let mut ok = job_request("t-1");
    sign_request(&mut ok, &trusted).unwrap();
    assert_eq!(auth.verify(&ok).unwrap().kid.as_deref(), Some("main"));

    let mut bad = job_request("t-2");
    sign_request(&mut bad, &revoked).unwrap();
    let err = auth.verify(&bad).unwrap_err();
    assert_eq!(err, AuthError::UntrustedKey(TrustStatus::Revoked));
    assert_eq!(err.code(), "trust_violation:revoked");

    let mut unknown = job_request("t-3");
    sign_request(&mut unknown, &stranger).unwrap();
    assert_eq!(auth.verify(&unknown), Err(AuthError::UntrustedKey(TrustStatus::Unknown)));
}

#[test]
fn missing_envelope_fields_are_reported() {
    let auth = authenticator(AuthConfig::default(), TrustedKeyRegistry::empty());
    let req = job_request("x");
    assert_eq!(auth.verify(&req), Err(AuthError::MissingField("public_key")));

    let kp = KeyPair::generate();
    let mut no_nonce = job_request("x");
    no_nonce["metadata"].as_object_mut().unwrap().remove("nonce");
    sign_request(&mut no_nonce, &kp).unwrap();
    assert_eq!(auth.verify(&no_nonce), Err(AuthError::MissingField("nonce")));
}

#[test]
fn bypass_accepts_unsigned_requests() {
    let config = AuthConfig { bypass: true, ..AuthConfig::default() };
    let auth = authenticator(config, TrustedKeyRegistry::empty());
    let verified = auth.verify(&job_request("b")).unwrap();
    assert!(verified.bypassed);
}

#[tokio::test]
async fn concurrent_submissions_with_one_nonce_admit_one() {
    let kp = KeyPair::generate();
    let auth = Arc::new(authenticator(AuthConfig::default(), TrustedKeyRegistry::empty()));
    let mut req = job_request("racy");
    sign_request(&mut req, &kp).unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let auth = Arc::clone(&auth);
        let req = req.clone();
        tasks.push(tokio::spawn(async move { auth.verify(&req).is_ok() }));
    }
    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
}
