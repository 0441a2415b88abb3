//! Method scope requirements and the pluggable scope-validation strategy

use async_trait::async_trait;
use futures::FutureExt;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

/// Immutable set of scope names
///
/// Cheap to clone; shared between the policy and authenticated callers.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(Arc<BTreeSet<String>>);

impl ScopeSet {
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Arc::new(scopes.into_iter().map(Into::into).collect()))
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scopes in `self` that are not in `granted`
    pub fn missing_from<'a>(&'a self, granted: &BTreeSet<&str>) -> Vec<&'a str> {
        self.iter().filter(|scope| !granted.contains(scope)).collect()
    }
}

impl fmt::Debug for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Fully-qualified gRPC method name (`/package.Service/Method`) to required scopes
///
/// Methods absent from the mapping are unprotected.
#[derive(Debug, Clone, Default)]
pub struct ScopeMapping(HashMap<String, ScopeSet>);

impl ScopeMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, M, S, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (M, S)>,
        M: Into<String>,
        S: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(method, scopes)| (method.into(), ScopeSet::new(scopes)))
                .collect(),
        )
    }

    /// Parse `{"/pkg.Svc/Method": ["scope", ...], ...}`
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let table: HashMap<String, Vec<String>> = serde_json::from_str(json)?;
        Ok(Self::from_pairs(table))
    }

    /// Add or replace one method's requirement
    pub fn protect<I, T>(mut self, method: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.0.insert(method.into(), ScopeSet::new(scopes));
        self
    }

    pub fn get(&self, method: &str) -> Option<&ScopeSet> {
        self.0.get(method)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A scope validator's refusal, surfaced as `PermissionDenied`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ScopeDenial {
    reason: String,
}

impl ScopeDenial {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Decides whether a verified token grants the scopes a method requires
///
/// Receives the raw, signature-checked claims so implementations can decode
/// whatever claim shape their issuer uses. Implementations may be slow (for
/// example a remote policy lookup); the caller bounds them by the call deadline.
#[async_trait]
pub trait ScopeValidator: Send + Sync {
    async fn validate(&self, raw_claims: &[u8], required: &ScopeSet) -> Result<(), ScopeDenial>;
}

/// Default strategy: granted scopes must be a superset of the required ones
///
/// Granted scopes are read from a `scopes` array or, failing that, an OAuth2
/// style space-delimited `scope` string.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimScopeValidator;

#[derive(Deserialize)]
struct GrantedScopes {
    #[serde(default)]
    scopes: Option<Vec<String>>,
    #[serde(default)]
    scope: Option<String>,
}

impl ClaimScopeValidator {
    fn check(raw_claims: &[u8], required: &ScopeSet) -> Result<(), ScopeDenial> {
        let granted: GrantedScopes = serde_json::from_slice(raw_claims)
            .map_err(|_| ScopeDenial::new("token scopes are unreadable"))?;

        let granted_set: BTreeSet<&str> = match (&granted.scopes, &granted.scope) {
            (Some(scopes), _) => scopes.iter().map(String::as_str).collect(),
            (None, Some(scope)) => scope.split_whitespace().collect(),
            (None, None) => BTreeSet::new(),
        };

        let missing = required.missing_from(&granted_set);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ScopeDenial::new(format!(
                "missing scope(s): {}",
                missing.join(", ")
            )))
        }
    }
}

#[async_trait]
impl ScopeValidator for ClaimScopeValidator {
    async fn validate(&self, raw_claims: &[u8], required: &ScopeSet) -> Result<(), ScopeDenial> {
        Self::check(raw_claims, required)
    }
}

/// Accepts every authenticated caller regardless of scopes
///
/// Only for services whose mapping is used purely to mark methods as
/// requiring authentication.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl ScopeValidator for AllowAll {
    async fn validate(&self, _raw_claims: &[u8], _required: &ScopeSet) -> Result<(), ScopeDenial> {
        Ok(())
    }
}

/// Adapts a synchronous closure into a `ScopeValidator`
pub struct FnScopeValidator<F>(F);

impl<F> FnScopeValidator<F>
where
    F: Fn(&[u8], &ScopeSet) -> Result<(), ScopeDenial> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> ScopeValidator for FnScopeValidator<F>
where
    F: Fn(&[u8], &ScopeSet) -> Result<(), ScopeDenial> + Send + Sync,
{
    async fn validate(&self, raw_claims: &[u8], required: &ScopeSet) -> Result<(), ScopeDenial> {
        (self.0)(raw_claims, required)
    }
}

/// Run the strategy until the call deadline
///
/// A panic or an elapsed deadline counts as a denial, never as success.
pub(crate) async fn run_scope_validator(
    validator: &dyn ScopeValidator,
    raw_claims: &[u8],
    required: &ScopeSet,
    deadline: Option<Instant>,
) -> Result<(), ScopeDenial> {
    let check = AssertUnwindSafe(validator.validate(raw_claims, required)).catch_unwind();

    let outcome = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, check).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Scope validation exceeded call deadline");
                return Err(ScopeDenial::new(
                    "scope validation did not complete before the deadline",
                ));
            }
        },
        None => check.await,
    };

    outcome.unwrap_or_else(|_| {
        warn!("Scope validator panicked");
        Err(ScopeDenial::new("scope validation failed"))
    })
}
