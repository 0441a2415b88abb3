//! Signing algorithm identifiers accepted by the access policy

use crate::error::AuthzError;
use std::fmt;
use std::str::FromStr;

/// JWS algorithms the policy can be configured with
///
/// Only the HMAC and RSA PKCS#1 v1.5 families are supported. The algorithm is
/// fixed at policy construction and every token must be signed with exactly
/// this algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum SigningAlgorithm {
    HS256,
    HS384,
    HS512,
    RS256,
    RS384,
    RS512,
}

/// Key family an algorithm belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmFamily {
    /// Shared-secret HMAC
    Hmac,
    /// RSA public key
    Rsa,
}

impl SigningAlgorithm {
    pub fn family(self) -> AlgorithmFamily {
        match self {
            Self::HS256 | Self::HS384 | Self::HS512 => AlgorithmFamily::Hmac,
            Self::RS256 | Self::RS384 | Self::RS512 => AlgorithmFamily::Rsa,
        }
    }

    /// JOSE `alg` header value
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
        }
    }
}

impl From<SigningAlgorithm> for jsonwebtoken::Algorithm {
    fn from(algorithm: SigningAlgorithm) -> Self {
        match algorithm {
            SigningAlgorithm::HS256 => jsonwebtoken::Algorithm::HS256,
            SigningAlgorithm::HS384 => jsonwebtoken::Algorithm::HS384,
            SigningAlgorithm::HS512 => jsonwebtoken::Algorithm::HS512,
            SigningAlgorithm::RS256 => jsonwebtoken::Algorithm::RS256,
            SigningAlgorithm::RS384 => jsonwebtoken::Algorithm::RS384,
            SigningAlgorithm::RS512 => jsonwebtoken::Algorithm::RS512,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            _ => Err(AuthzError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("hs384".parse::<SigningAlgorithm>().unwrap(), SigningAlgorithm::HS384);
        assert_eq!(" RS512 ".parse::<SigningAlgorithm>().unwrap(), SigningAlgorithm::RS512);
    }

    #[test]
    fn test_parse_unsupported_algorithm() {
        for alg in ["none", "ES256", "PS256", "EdDSA", ""] {
            let err = alg.parse::<SigningAlgorithm>().unwrap_err();
            assert!(matches!(err, AuthzError::UnsupportedAlgorithm(_)));
            assert_eq!(err.code(), tonic::Code::Unimplemented);
        }
    }

    #[test]
    fn test_family() {
        assert_eq!(SigningAlgorithm::HS512.family(), AlgorithmFamily::Hmac);
        assert_eq!(SigningAlgorithm::RS256.family(), AlgorithmFamily::Rsa);
    }

    #[test]
    fn test_display_matches_jose_name() {
        assert_eq!(SigningAlgorithm::RS384.to_string(), "RS384");
        assert_eq!(
            jsonwebtoken::Algorithm::from(SigningAlgorithm::HS256),
            jsonwebtoken::Algorithm::HS256
        );
    }
}
