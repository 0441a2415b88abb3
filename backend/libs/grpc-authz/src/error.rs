//! Authorization failures and their gRPC status classification

use crate::claims::ClaimsRejection;
use crate::scope::ScopeDenial;
use thiserror::Error;
use tonic::{Code, Status};

/// Why a presented token failed cryptographic verification
///
/// The categories are safe to return to callers. The underlying library
/// error is only ever logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenDefect {
    #[error("malformed token")]
    Malformed,
    #[error("unexpected signing algorithm")]
    AlgorithmMismatch,
    #[error("signature verification failed")]
    BadSignature,
    #[error("undecodable claims")]
    UndecodableClaims,
}

/// Errors produced while authorizing a call or building a policy
#[derive(Debug, Error)]
pub enum AuthzError {
    /// No `authorization` metadata on a protected call
    #[error("missing authorization metadata")]
    MissingCredential,

    /// `authorization` metadata present but not `bearer <token>`
    #[error("malformed authorization metadata")]
    MalformedCredential,

    #[error("access token is invalid: {0}")]
    InvalidToken(TokenDefect),

    #[error("access token is invalid: {0}")]
    InvalidClaims(#[from] ClaimsRejection),

    #[error("no permission to access this RPC: {0}")]
    PermissionDenied(#[from] ScopeDenial),

    /// Key material is malformed or does not match the algorithm family
    #[error("verifier error: {0}")]
    InvalidKey(String),

    /// Policy options are inconsistent (e.g. audience check without audience)
    #[error("invalid authorization policy: {0}")]
    InvalidConfiguration(String),

    #[error("algorithm is not supported: {0}")]
    UnsupportedAlgorithm(String),
}

impl AuthzError {
    /// gRPC status code for this failure
    pub fn code(&self) -> Code {
        match self {
            Self::MissingCredential
            | Self::MalformedCredential
            | Self::InvalidToken(_)
            | Self::InvalidClaims(_) => Code::Unauthenticated,
            Self::PermissionDenied(_) => Code::PermissionDenied,
            Self::InvalidKey(_) | Self::InvalidConfiguration(_) => Code::FailedPrecondition,
            Self::UnsupportedAlgorithm(_) => Code::Unimplemented,
        }
    }

    /// Whether the failure is an operator mistake rather than a caller mistake
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey(_) | Self::InvalidConfiguration(_) | Self::UnsupportedAlgorithm(_)
        )
    }
}

impl From<AuthzError> for Status {
    fn from(err: AuthzError) -> Self {
        Status::new(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_errors_are_unauthenticated() {
        assert_eq!(AuthzError::MissingCredential.code(), Code::Unauthenticated);
        assert_eq!(AuthzError::MalformedCredential.code(), Code::Unauthenticated);
        assert_eq!(
            AuthzError::InvalidToken(TokenDefect::BadSignature).code(),
            Code::Unauthenticated
        );
        assert_eq!(
            AuthzError::InvalidClaims(ClaimsRejection::Expired).code(),
            Code::Unauthenticated
        );
    }

    #[test]
    fn test_scope_denial_is_permission_denied() {
        let err = AuthzError::from(ScopeDenial::new("missing scope: write"));
        assert_eq!(err.code(), Code::PermissionDenied);

        let status = Status::from(err);
        assert_eq!(status.code(), Code::PermissionDenied);
        assert_eq!(
            status.message(),
            "no permission to access this RPC: missing scope: write"
        );
    }

    #[test]
    fn test_configuration_errors() {
        let key = AuthzError::InvalidKey("empty secret".into());
        assert_eq!(key.code(), Code::FailedPrecondition);
        assert!(key.is_configuration_error());

        let alg = AuthzError::UnsupportedAlgorithm("ES256".into());
        assert_eq!(alg.code(), Code::Unimplemented);
        assert!(alg.is_configuration_error());

        assert!(!AuthzError::MissingCredential.is_configuration_error());
    }

    #[test]
    fn test_token_message_is_generic() {
        let status = Status::from(AuthzError::InvalidToken(TokenDefect::BadSignature));
        assert_eq!(
            status.message(),
            "access token is invalid: signature verification failed"
        );
    }
}
