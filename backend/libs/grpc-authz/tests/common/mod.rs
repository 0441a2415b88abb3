//! Shared helpers for the integration tests

#![allow(dead_code)]

use chrono::Utc;
use grpc_authz::AuthContext;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

// Test keys - FOR TESTING ONLY
pub const HS_KEY: &[u8] = b"Hello123$(ASM@_ASJ@@#)WR)SADJ@#T(Q#$";
pub const RSA_PRIVATE_KEY: &str = include_str!("../fixtures/rsa_private.pem");
pub const RSA_PUBLIC_KEY: &str = include_str!("../fixtures/rsa_public.pem");
pub const FOREIGN_RSA_PRIVATE_KEY: &str = include_str!("../fixtures/foreign_rsa_private.pem");

pub const AUDIENCE: &str = "admin";

/// Route policy logs to the test output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("grpc_authz=debug")
        .with_test_writer()
        .try_init();
}

/// Claims valid right now for `audience` carrying `scopes`
pub fn claims(scopes: &[&str], audience: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "sub": "svc-client",
        "aud": [audience],
        "jti": "random-unique-string",
        "iat": now,
        "nbf": now - 60,
        "exp": now + 3600,
        "scopes": scopes,
    })
}

pub fn sign_hs(alg: Algorithm, key: &[u8], claims: &Value) -> String {
    encode(&Header::new(alg), claims, &EncodingKey::from_secret(key))
        .expect("Failed to sign HS token")
}

pub fn sign_rs(alg: Algorithm, private_key_pem: &str, claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
        .expect("Failed to parse RSA private key");
    encode(&Header::new(alg), claims, &key).expect("Failed to sign RS token")
}

pub fn hs256_token(scopes: &[&str]) -> String {
    sign_hs(Algorithm::HS256, HS_KEY, &claims(scopes, AUDIENCE))
}

/// Call context that counts metadata reads
pub struct CountingContext {
    method: String,
    metadata: HashMap<String, String>,
    reads: AtomicUsize,
}

impl CountingContext {
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            metadata: HashMap::new(),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_metadata("authorization", &format!("bearer {token}"))
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl AuthContext for CountingContext {
    fn full_method(&self) -> &str {
        &self.method
    }

    fn metadata(&self, key: &str) -> Option<&str> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.metadata.get(key).map(String::as_str)
    }
}
