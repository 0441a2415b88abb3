//! Standard JWT claims and their validation

use crate::error::{AuthzError, TokenDefect};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Registered claims carried by every token
///
/// Application specific claims (scopes, roles, ...) are not decoded here;
/// they stay in the raw claims handed to the `ScopeValidator`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience set (`aud` may be a single string or an array on the wire)
    #[serde(default, deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,

    /// Unique token identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// NumericDate claims are seconds since the epoch and may carry a
    /// fractional part; integers decode into `f64` unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<f64>,

    /// Not before (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<f64>,

    /// Expiration (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<f64>,
}

impl StandardClaims {
    /// Decode the registered claims from a verified payload
    pub fn from_slice(raw_claims: &[u8]) -> Result<Self, AuthzError> {
        serde_json::from_slice(raw_claims).map_err(|e| {
            tracing::debug!(error = %e, "Failed to decode standard claims");
            AuthzError::InvalidToken(TokenDefect::UndecodableClaims)
        })
    }

    /// Exact membership of `audience` in the audience set
    pub fn is_for_audience(&self, audience: &str) -> bool {
        self.aud.iter().any(|aud| aud == audience)
    }
}

fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(aud)) => vec![aud],
        Some(OneOrMany::Many(aud)) => aud,
        None => Vec::new(),
    })
}

/// Why otherwise well-signed claims were rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClaimsRejection {
    #[error("issued in the future")]
    IssuedInFuture,
    #[error("missing not-before claim")]
    MissingNotBefore,
    #[error("not valid yet")]
    NotYetValid,
    #[error("missing expiry claim")]
    MissingExpiry,
    #[error("expired")]
    Expired,
    #[error("not for audience")]
    AudienceMismatch,
}

/// Audience policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudienceCheck {
    /// The token's `aud` must contain this exact value
    Required(String),
    /// Audience is not inspected at all
    Disabled,
}

/// Validates the time window and audience of decoded claims
#[derive(Debug, Clone)]
pub struct ClaimsValidator {
    audience: AudienceCheck,
    leeway: Duration,
}

impl ClaimsValidator {
    /// `leeway` widens both ends of the validity window; zero means exact
    pub fn new(audience: AudienceCheck, leeway: Duration) -> Self {
        Self { audience, leeway }
    }

    pub fn audience(&self) -> &AudienceCheck {
        &self.audience
    }

    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// Accept iff `nbf - leeway <= now < exp + leeway` and, when enabled,
    /// the configured audience is in `aud`
    ///
    /// `now` is seconds since the epoch with sub-second precision. Missing
    /// `nbf` or `exp` is a rejection. An `iat` is optional, but one later
    /// than `now + leeway` at whole-second precision is rejected.
    pub fn validate(&self, claims: &StandardClaims, now: f64) -> Result<(), ClaimsRejection> {
        let leeway = self.leeway.as_secs_f64();

        if let Some(iat) = claims.iat {
            if iat.trunc() > now + leeway {
                return Err(ClaimsRejection::IssuedInFuture);
            }
        }

        let nbf = claims.nbf.ok_or(ClaimsRejection::MissingNotBefore)?;
        if now < nbf - leeway {
            return Err(ClaimsRejection::NotYetValid);
        }

        let exp = claims.exp.ok_or(ClaimsRejection::MissingExpiry)?;
        if now >= exp + leeway {
            return Err(ClaimsRejection::Expired);
        }

        if let AudienceCheck::Required(audience) = &self.audience {
            if !claims.is_for_audience(audience) {
                return Err(ClaimsRejection::AudienceMismatch);
            }
        }

        Ok(())
    }
}
