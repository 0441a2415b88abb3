//! Token signature verification
//!
//! A `SignatureVerifier` is built once from the policy's algorithm and key
//! material. Key/algorithm mismatches are rejected at construction so that a
//! misconfigured service fails at startup instead of on every call.

use crate::algorithm::{AlgorithmFamily, SigningAlgorithm};
use crate::error::{AuthzError, TokenDefect};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use bytes::Bytes;
use jsonwebtoken::DecodingKey;
use std::fmt;
use tracing::debug;

/// Key material the policy verifies tokens with
#[derive(Clone)]
pub enum KeyMaterial {
    /// Shared secret for HS256/HS384/HS512
    Secret(Vec<u8>),
    /// PEM-encoded RSA public key for RS256/RS384/RS512
    RsaPublicKeyPem(String),
}

impl KeyMaterial {
    pub fn secret(secret: impl Into<Vec<u8>>) -> Self {
        Self::Secret(secret.into())
    }

    pub fn rsa_public_key_pem(pem: impl Into<String>) -> Self {
        Self::RsaPublicKeyPem(pem.into())
    }

    fn family(&self) -> AlgorithmFamily {
        match self {
            Self::Secret(_) => AlgorithmFamily::Hmac,
            Self::RsaPublicKeyPem(_) => AlgorithmFamily::Rsa,
        }
    }
}

// Never print key bytes.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret(secret) => f
                .debug_struct("Secret")
                .field("len", &secret.len())
                .finish(),
            Self::RsaPublicKeyPem(_) => f.write_str("RsaPublicKeyPem(..)"),
        }
    }
}

/// Verifies compact-serialized JWS tokens for one algorithm and key
#[derive(Clone)]
pub enum SignatureVerifier {
    Hmac {
        algorithm: SigningAlgorithm,
        key: DecodingKey,
    },
    Rsa {
        algorithm: SigningAlgorithm,
        key: DecodingKey,
    },
}

/// A token whose signature has been checked
///
/// Holds the decoded payload exactly as it was signed, so application
/// specific claims can be read by the scope validator.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    raw_claims: Bytes,
}

impl VerifiedToken {
    pub fn raw_claims(&self) -> &[u8] {
        &self.raw_claims
    }

    pub fn into_raw_claims(self) -> Bytes {
        self.raw_claims
    }
}

impl SignatureVerifier {
    /// Build a verifier for `algorithm` keyed by `key`
    ///
    /// ## Errors
    ///
    /// Returns `AuthzError::InvalidKey` if:
    /// - The key family does not match the algorithm family
    /// - The shared secret is empty
    /// - The RSA public key PEM cannot be parsed
    pub fn new(algorithm: SigningAlgorithm, key: &KeyMaterial) -> Result<Self, AuthzError> {
        if algorithm.family() != key.family() {
            return Err(AuthzError::InvalidKey(format!(
                "{algorithm} cannot be used with {:?} key material",
                key.family()
            )));
        }

        match key {
            KeyMaterial::Secret(secret) => {
                if secret.is_empty() {
                    return Err(AuthzError::InvalidKey("HMAC secret is empty".to_string()));
                }
                Ok(Self::Hmac {
                    algorithm,
                    key: DecodingKey::from_secret(secret),
                })
            }
            KeyMaterial::RsaPublicKeyPem(pem) => {
                let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                    AuthzError::InvalidKey(format!("failed to parse RSA public key: {e}"))
                })?;
                Ok(Self::Rsa { algorithm, key })
            }
        }
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        match self {
            Self::Hmac { algorithm, .. } | Self::Rsa { algorithm, .. } => *algorithm,
        }
    }

    fn decoding_key(&self) -> &DecodingKey {
        match self {
            Self::Hmac { key, .. } | Self::Rsa { key, .. } => key,
        }
    }

    /// Verify the token signature and return the signed payload
    ///
    /// Only the signature and the header algorithm are checked here. Time and
    /// audience claims are the `ClaimsValidator`'s job.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, AuthzError> {
        let mut segments = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            debug!("Token is not a three-segment compact JWS");
            return Err(AuthzError::InvalidToken(TokenDefect::Malformed));
        };

        let expected = jsonwebtoken::Algorithm::from(self.algorithm());

        let decoded_header = jsonwebtoken::decode_header(token).map_err(|e| {
            debug!(error = %e, "Failed to decode token header");
            AuthzError::InvalidToken(TokenDefect::Malformed)
        })?;

        if decoded_header.alg != expected {
            debug!(
                expected = %self.algorithm(),
                found = ?decoded_header.alg,
                "Token signed with unexpected algorithm"
            );
            return Err(AuthzError::InvalidToken(TokenDefect::AlgorithmMismatch));
        }

        let message = &token[..header.len() + 1 + payload.len()];
        let valid = jsonwebtoken::crypto::verify(
            signature,
            message.as_bytes(),
            self.decoding_key(),
            expected,
        )
        .map_err(|e| {
            debug!(error = %e, "Signature check errored");
            AuthzError::InvalidToken(TokenDefect::BadSignature)
        })?;

        if !valid {
            return Err(AuthzError::InvalidToken(TokenDefect::BadSignature));
        }

        let raw_claims = URL_SAFE_NO_PAD.decode(payload).map_err(|e| {
            debug!(error = %e, "Token payload is not base64url");
            AuthzError::InvalidToken(TokenDefect::Malformed)
        })?;

        Ok(VerifiedToken {
            raw_claims: Bytes::from(raw_claims),
        })
    }
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            Self::Hmac { .. } => "Hmac",
            Self::Rsa { .. } => "Rsa",
        };
        f.debug_struct(variant)
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &[u8] = b"Hello123$(ASM@_ASJ@@#)WR)SADJ@#T(Q#$";

    fn sign_hs(alg: jsonwebtoken::Algorithm, secret: &[u8], claims: &serde_json::Value) -> String {
        encode(&Header::new(alg), claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[test]
    fn test_verify_returns_signed_payload() {
        let verifier =
            SignatureVerifier::new(SigningAlgorithm::HS256, &KeyMaterial::secret(SECRET)).unwrap();
        let claims = json!({"sub": "svc-a", "scopes": ["read"]});
        let token = sign_hs(jsonwebtoken::Algorithm::HS256, SECRET, &claims);

        let verified = verifier.verify(&token).unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(verified.raw_claims()).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let verifier =
            SignatureVerifier::new(SigningAlgorithm::HS256, &KeyMaterial::secret(SECRET)).unwrap();
        let token = sign_hs(jsonwebtoken::Algorithm::HS256, b"another-secret", &json!({}));

        let err = verifier.verify(&token).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidToken(TokenDefect::BadSignature)));
    }

    #[test]
    fn test_verify_rejects_algorithm_mismatch() {
        let verifier =
            SignatureVerifier::new(SigningAlgorithm::HS256, &KeyMaterial::secret(SECRET)).unwrap();
        let token = sign_hs(jsonwebtoken::Algorithm::HS512, SECRET, &json!({}));

        let err = verifier.verify(&token).unwrap_err();
        assert!(matches!(
            err,
            AuthzError::InvalidToken(TokenDefect::AlgorithmMismatch)
        ));
    }

    #[test]
    fn test_verify_rejects_unsigned_token() {
        let verifier =
            SignatureVerifier::new(SigningAlgorithm::HS256, &KeyMaterial::secret(SECRET)).unwrap();
        // {"alg":"none","typ":"JWT"} . {"sub":"x"} . <empty>
        let token = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.eyJzdWIiOiJ4In0.";

        let err = verifier.verify(token).unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_verify_rejects_malformed_token() {
        let verifier =
            SignatureVerifier::new(SigningAlgorithm::HS384, &KeyMaterial::secret(SECRET)).unwrap();

        for token in ["", "invalid.jwt", "a.b.c.d", "invalid.jwt.token"] {
            let err = verifier.verify(token).unwrap_err();
            assert!(matches!(err, AuthzError::InvalidToken(_)), "token {token:?}");
        }
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let verifier =
            SignatureVerifier::new(SigningAlgorithm::HS256, &KeyMaterial::secret(SECRET)).unwrap();
        let token = sign_hs(
            jsonwebtoken::Algorithm::HS256,
            SECRET,
            &json!({"scopes": ["read"]}),
        );
        let forged_payload = URL_SAFE_NO_PAD.encode(br#"{"scopes":["admin"]}"#);
        let parts: Vec<&str> = token.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        let err = verifier.verify(&forged).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidToken(TokenDefect::BadSignature)));
    }

    #[test]
    fn test_new_rejects_empty_secret() {
        let err = SignatureVerifier::new(SigningAlgorithm::HS256, &KeyMaterial::secret(Vec::new()))
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::FailedPrecondition);
    }

    #[test]
    fn test_new_rejects_family_mismatch() {
        let err = SignatureVerifier::new(SigningAlgorithm::RS256, &KeyMaterial::secret(SECRET))
            .unwrap_err();
        assert!(matches!(err, AuthzError::InvalidKey(_)));

        let err = SignatureVerifier::new(
            SigningAlgorithm::HS256,
            &KeyMaterial::rsa_public_key_pem("-----BEGIN PUBLIC KEY-----"),
        )
        .unwrap_err();
        assert!(matches!(err, AuthzError::InvalidKey(_)));
    }

    #[test]
    fn test_new_rejects_garbage_pem() {
        let err = SignatureVerifier::new(
            SigningAlgorithm::RS256,
            &KeyMaterial::rsa_public_key_pem("not a pem"),
        )
        .unwrap_err();
        assert_eq!(err.code(), tonic::Code::FailedPrecondition);
    }

    #[test]
    fn test_key_material_debug_is_redacted() {
        let debug = format!("{:?}", KeyMaterial::secret(SECRET));
        assert!(!debug.contains("Hello123"));
        assert!(debug.contains("len"));
    }
}
