//! Access policy: the single entry point deciding whether a call may proceed
//!
//! The policy is built once at startup and shared by all calls as
//! `Arc<AccessPolicy>`. `authorize` never writes to it; the required scopes,
//! the credential and the decoded claims of a call are locals of that call.

use crate::algorithm::SigningAlgorithm;
use crate::claims::{AudienceCheck, ClaimsValidator, StandardClaims};
use crate::context::{extract_bearer, AuthContext};
use crate::error::AuthzError;
use crate::scope::{
    run_scope_validator, ClaimScopeValidator, ScopeMapping, ScopeSet, ScopeValidator,
};
use crate::verifier::{KeyMaterial, SignatureVerifier};
use bytes::Bytes;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Result of a successful authorization
#[derive(Debug, Clone)]
pub enum Authorization {
    /// The method has no scope requirement; no credential was read
    Unprotected,
    /// The caller presented a valid token with sufficient scopes
    Authenticated(AuthenticatedCaller),
}

impl Authorization {
    pub fn caller(&self) -> Option<&AuthenticatedCaller> {
        match self {
            Self::Unprotected => None,
            Self::Authenticated(caller) => Some(caller),
        }
    }
}

/// Identity attached to an authorized call for downstream handlers
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller {
    /// Method the caller was authorized for
    pub method: String,
    /// Registered claims of the verified token
    pub claims: StandardClaims,
    /// Verified payload, untouched
    pub raw_claims: Bytes,
    /// Scopes the method required and the token satisfied
    pub scopes: ScopeSet,
}

impl AuthenticatedCaller {
    pub fn subject(&self) -> Option<&str> {
        self.claims.sub.as_deref()
    }
}

/// Immutable scope-based access policy
pub struct AccessPolicy {
    verifier: SignatureVerifier,
    scopes: ScopeMapping,
    claims_validator: ClaimsValidator,
    scope_validator: Arc<dyn ScopeValidator>,
}

impl AccessPolicy {
    /// Start building a policy for a fixed algorithm and key
    pub fn builder(algorithm: SigningAlgorithm, key: KeyMaterial) -> AccessPolicyBuilder {
        AccessPolicyBuilder::new(algorithm, key)
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.verifier.algorithm()
    }

    pub fn scope_mapping(&self) -> &ScopeMapping {
        &self.scopes
    }

    /// Scopes required by `method`, or `None` when it is unprotected
    pub fn required_scopes(&self, method: &str) -> Option<&ScopeSet> {
        self.scopes.get(method)
    }

    /// Decide whether the call described by `ctx` may proceed
    ///
    /// Steps, all evaluated against call-local values:
    /// 1. Look up the method's required scopes; unmapped methods pass without
    ///    reading any metadata
    /// 2. Extract the bearer token
    /// 3. Verify signature and algorithm
    /// 4. Decode the registered claims
    /// 5. Check `iat`, the `nbf`/`exp` window and audience
    /// 6. Run the scope validator under the call deadline, measured from the
    ///    moment `authorize` was entered
    ///
    /// ## Errors
    ///
    /// - Steps 2-5 fail with `Unauthenticated`-class errors
    /// - Step 6 fails with `AuthzError::PermissionDenied`
    pub async fn authorize<C>(&self, ctx: &C) -> Result<Authorization, AuthzError>
    where
        C: AuthContext + ?Sized,
    {
        let received = Instant::now();
        let method = ctx.full_method();

        let Some(required) = self.scopes.get(method) else {
            debug!(method, "Method is unprotected");
            return Ok(Authorization::Unprotected);
        };

        let caller = self.authenticate(ctx, method, required, received).await.map_err(|e| {
            warn!(method, error = %e, code = ?e.code(), "Call rejected");
            e
        })?;

        debug!(
            method,
            subject = caller.subject().unwrap_or("-"),
            "Call authorized"
        );

        Ok(Authorization::Authenticated(caller))
    }

    async fn authenticate<C>(
        &self,
        ctx: &C,
        method: &str,
        required: &ScopeSet,
        received: Instant,
    ) -> Result<AuthenticatedCaller, AuthzError>
    where
        C: AuthContext + ?Sized,
    {
        let token = extract_bearer(ctx)?;
        let verified = self.verifier.verify(token)?;
        let claims = StandardClaims::from_slice(verified.raw_claims())?;

        let now = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        self.claims_validator.validate(&claims, now)?;

        let deadline = ctx.deadline().map(|budget| received + budget);
        run_scope_validator(
            self.scope_validator.as_ref(),
            verified.raw_claims(),
            required,
            deadline,
        )
        .await?;

        Ok(AuthenticatedCaller {
            method: method.to_string(),
            claims,
            raw_claims: verified.into_raw_claims(),
            scopes: required.clone(),
        })
    }
}

impl fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPolicy")
            .field("verifier", &self.verifier)
            .field("scopes", &self.scopes)
            .field("claims_validator", &self.claims_validator)
            .finish_non_exhaustive()
    }
}

/// Builder for `AccessPolicy`
///
/// Mirrors the options a deployment configures: scope mapping, audience,
/// audience check toggle, scope validation strategy and clock skew.
pub struct AccessPolicyBuilder {
    algorithm: SigningAlgorithm,
    key: KeyMaterial,
    scopes: ScopeMapping,
    audience: Option<String>,
    disable_audience_validation: bool,
    scope_validator: Arc<dyn ScopeValidator>,
    leeway: Duration,
}

impl AccessPolicyBuilder {
    fn new(algorithm: SigningAlgorithm, key: KeyMaterial) -> Self {
        Self {
            algorithm,
            key,
            scopes: ScopeMapping::default(),
            audience: None,
            disable_audience_validation: false,
            scope_validator: Arc::new(ClaimScopeValidator),
            leeway: Duration::ZERO,
        }
    }

    pub fn scope_mapping(mut self, scopes: ScopeMapping) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn disable_audience_validation(mut self, disable: bool) -> Self {
        self.disable_audience_validation = disable;
        self
    }

    /// Replace the default `ClaimScopeValidator`
    pub fn scope_validator(mut self, validator: impl ScopeValidator + 'static) -> Self {
        self.scope_validator = Arc::new(validator);
        self
    }

    pub fn shared_scope_validator(mut self, validator: Arc<dyn ScopeValidator>) -> Self {
        self.scope_validator = validator;
        self
    }

    /// Clock skew tolerance applied to `iat`, `nbf` and `exp` (default: none)
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Build the policy, constructing the signature verifier eagerly
    ///
    /// ## Errors
    ///
    /// - `AuthzError::InvalidKey` for malformed or mismatched key material
    /// - `AuthzError::InvalidConfiguration` if audience validation is enabled
    ///   without an audience
    pub fn build(self) -> Result<AccessPolicy, AuthzError> {
        let verifier = SignatureVerifier::new(self.algorithm, &self.key).map_err(|e| {
            error!(algorithm = %self.algorithm, error = %e, "Failed to build token verifier");
            e
        })?;

        let audience = if self.disable_audience_validation {
            AudienceCheck::Disabled
        } else {
            match self.audience {
                Some(audience) if !audience.is_empty() => AudienceCheck::Required(audience),
                _ => {
                    let err = AuthzError::InvalidConfiguration(
                        "audience is required unless audience validation is disabled".to_string(),
                    );
                    error!(error = %err, "Invalid authorization policy");
                    return Err(err);
                }
            }
        };

        info!(
            algorithm = %self.algorithm,
            protected_methods = self.scopes.len(),
            audience_check = !matches!(audience, AudienceCheck::Disabled),
            leeway_secs = self.leeway.as_secs(),
            "Access policy initialized"
        );

        Ok(AccessPolicy {
            verifier,
            scopes: self.scopes,
            claims_validator: ClaimsValidator::new(audience, self.leeway),
            scope_validator: self.scope_validator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"Hello123$(ASM@_ASJ@@#)WR)SADJ@#T(Q#$";

    #[test]
    fn test_build_requires_audience_when_enabled() {
        let err = AccessPolicy::builder(SigningAlgorithm::HS256, KeyMaterial::secret(SECRET))
            .build()
            .unwrap_err();
        assert!(matches!(err, AuthzError::InvalidConfiguration(_)));
        assert_eq!(err.code(), tonic::Code::FailedPrecondition);
    }

    #[test]
    fn test_build_without_audience_when_disabled() {
        let policy = AccessPolicy::builder(SigningAlgorithm::HS512, KeyMaterial::secret(SECRET))
            .disable_audience_validation(true)
            .build()
            .unwrap();
        assert_eq!(policy.algorithm(), SigningAlgorithm::HS512);
    }

    #[test]
    fn test_build_rejects_bad_key_eagerly() {
        let err = AccessPolicy::builder(
            SigningAlgorithm::RS256,
            KeyMaterial::rsa_public_key_pem("garbage"),
        )
        .audience("admin")
        .build()
        .unwrap_err();
        assert_eq!(err.code(), tonic::Code::FailedPrecondition);
    }

    #[test]
    fn test_required_scopes_lookup() {
        let policy = AccessPolicy::builder(SigningAlgorithm::HS256, KeyMaterial::secret(SECRET))
            .audience("admin")
            .scope_mapping(ScopeMapping::new().protect("/svc/Get", ["read"]))
            .build()
            .unwrap();

        assert!(policy.required_scopes("/svc/Get").unwrap().contains("read"));
        assert!(policy.required_scopes("/svc/Other").is_none());
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let policy = AccessPolicy::builder(SigningAlgorithm::HS256, KeyMaterial::secret(SECRET))
            .audience("admin")
            .build()
            .unwrap();
        let debug = format!("{policy:?}");
        assert!(!debug.contains("Hello123"));
    }

    #[test]
    fn test_policy_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AccessPolicy>();
    }
}
