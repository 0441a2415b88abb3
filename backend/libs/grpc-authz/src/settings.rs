//! Environment-driven policy settings

use crate::algorithm::SigningAlgorithm;
use crate::policy::AccessPolicyBuilder;
use crate::scope::ScopeMapping;
use crate::verifier::KeyMaterial;
use crate::AccessPolicy;
use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::time::Duration;
use tracing::info;

/// Deployment settings for an `AccessPolicy`
#[derive(Debug, Clone)]
pub struct AuthzSettings {
    pub algorithm: SigningAlgorithm,
    pub key: KeyMaterial,
    pub audience: Option<String>,
    pub disable_audience_validation: bool,
    pub scope_mapping: ScopeMapping,
    pub clock_skew: Duration,
}

impl AuthzSettings {
    /// Load settings from environment variables
    ///
    /// **Environment Variables**:
    /// - `AUTHZ_ALGORITHM`: HS256/384/512 or RS256/384/512 (REQUIRED)
    /// - `AUTHZ_HS_KEY`: Shared secret for HS algorithms
    /// - `AUTHZ_RSA_PUBLIC_KEY_PEM`: RSA public key PEM for RS algorithms
    /// - `AUTHZ_RSA_PUBLIC_KEY_PATH`: Path to the RSA public key PEM (alternative)
    /// - `AUTHZ_AUDIENCE`: Audience tokens must be issued for
    /// - `AUTHZ_DISABLE_AUDIENCE_VALIDATION`: Skip the audience check (default: false)
    /// - `AUTHZ_SCOPE_MAPPING`: JSON object of method name to scope list
    /// - `AUTHZ_SCOPE_MAPPING_PATH`: Path to a file with that JSON (alternative)
    /// - `AUTHZ_CLOCK_SKEW_SECS`: Tolerance for `iat`/`nbf`/`exp` (default: 0)
    ///
    /// Empty values are treated as unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let algorithm: SigningAlgorithm = get("AUTHZ_ALGORITHM")
            .context("AUTHZ_ALGORITHM not set")?
            .parse()
            .map_err(|e| anyhow!("AUTHZ_ALGORITHM: {e}"))?;

        let key = match algorithm.family() {
            crate::AlgorithmFamily::Hmac => {
                let secret = get("AUTHZ_HS_KEY")
                    .with_context(|| format!("AUTHZ_HS_KEY required for {algorithm}"))?;
                KeyMaterial::secret(secret)
            }
            crate::AlgorithmFamily::Rsa => {
                let inline = get("AUTHZ_RSA_PUBLIC_KEY_PEM");
                let pem = match (inline, get("AUTHZ_RSA_PUBLIC_KEY_PATH")) {
                    (Some(pem), _) => pem,
                    (None, Some(path)) => fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read RSA public key from {path}"))?,
                    (None, None) => {
                        bail!("AUTHZ_RSA_PUBLIC_KEY_PEM or _PATH required for {algorithm}")
                    }
                };
                KeyMaterial::rsa_public_key_pem(pem)
            }
        };

        let disable_audience_validation = match get("AUTHZ_DISABLE_AUDIENCE_VALIDATION") {
            Some(v) => v
                .parse::<bool>()
                .with_context(|| format!("AUTHZ_DISABLE_AUDIENCE_VALIDATION: invalid bool {v:?}"))?,
            None => false,
        };

        let scope_json = match (get("AUTHZ_SCOPE_MAPPING"), get("AUTHZ_SCOPE_MAPPING_PATH")) {
            (Some(json), _) => Some(json),
            (None, Some(path)) => Some(
                fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read scope mapping from {path}"))?,
            ),
            (None, None) => None,
        };
        let scope_mapping = match scope_json {
            Some(json) => ScopeMapping::from_json(&json).context("Invalid scope mapping JSON")?,
            None => ScopeMapping::default(),
        };

        let clock_skew = match get("AUTHZ_CLOCK_SKEW_SECS") {
            Some(v) => Duration::from_secs(
                v.parse::<u64>()
                    .with_context(|| format!("AUTHZ_CLOCK_SKEW_SECS: invalid number {v:?}"))?,
            ),
            None => Duration::ZERO,
        };

        let audience = get("AUTHZ_AUDIENCE");

        info!(
            algorithm = %algorithm,
            protected_methods = scope_mapping.len(),
            audience = audience.as_deref().unwrap_or("-"),
            disable_audience_validation,
            "Authorization settings loaded"
        );

        Ok(Self {
            algorithm,
            key,
            audience,
            disable_audience_validation,
            scope_mapping,
            clock_skew,
        })
    }

    /// Policy builder preloaded with these settings
    ///
    /// The scope validation strategy is left at its default; replace it on
    /// the returned builder if the deployment needs a custom one.
    pub fn into_policy_builder(self) -> AccessPolicyBuilder {
        let mut builder = AccessPolicy::builder(self.algorithm, self.key)
            .scope_mapping(self.scope_mapping)
            .disable_audience_validation(self.disable_audience_validation)
            .leeway(self.clock_skew);
        if let Some(audience) = self.audience {
            builder = builder.audience(audience);
        }
        builder
    }
}
