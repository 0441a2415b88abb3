//! Read-only view of an incoming call used by the access policy

use crate::error::AuthzError;
use std::time::Duration;

/// Authorization scheme expected in the `authorization` metadata (case-insensitive)
pub const AUTHORIZATION_SCHEME: &str = "bearer";

const AUTHORIZATION_KEY: &str = "authorization";
const GRPC_TIMEOUT_KEY: &str = "grpc-timeout";

/// What the policy needs to know about a call
///
/// Implemented for `http::Request<B>` and `http::request::Parts`, which is
/// what tonic hands to tower middleware. Hosts with another call
/// representation implement it directly.
pub trait AuthContext {
    /// Fully-qualified method name, e.g. `/inventory.v1.Inventory/Get`
    fn full_method(&self) -> &str;

    /// Value of a metadata entry; non-ASCII values read as empty
    fn metadata(&self, key: &str) -> Option<&str>;

    /// Time left before the caller gives up on this call
    fn deadline(&self) -> Option<Duration> {
        self.metadata(GRPC_TIMEOUT_KEY).and_then(parse_grpc_timeout)
    }
}

impl AuthContext for http::request::Parts {
    fn full_method(&self) -> &str {
        self.uri.path()
    }

    fn metadata(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|v| v.to_str().unwrap_or_default())
    }
}

impl<B> AuthContext for http::Request<B> {
    fn full_method(&self) -> &str {
        self.uri().path()
    }

    fn metadata(&self, key: &str) -> Option<&str> {
        self.headers().get(key).map(|v| v.to_str().unwrap_or_default())
    }
}

/// Extract the token from `authorization: bearer <token>`
///
/// ## Errors
///
/// - `AuthzError::MissingCredential` if there is no `authorization` entry
/// - `AuthzError::MalformedCredential` if the scheme is not `bearer`, the
///   separator is not exactly one space, or the token is empty
pub fn extract_bearer<C: AuthContext + ?Sized>(ctx: &C) -> Result<&str, AuthzError> {
    let value = ctx
        .metadata(AUTHORIZATION_KEY)
        .ok_or(AuthzError::MissingCredential)?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AuthzError::MalformedCredential)?;

    if !scheme.eq_ignore_ascii_case(AUTHORIZATION_SCHEME) || token.is_empty() || token.contains(' ')
    {
        return Err(AuthzError::MalformedCredential);
    }

    Ok(token)
}

/// Parse a `grpc-timeout` value: 1-8 ASCII digits followed by a unit
/// (`H`, `M`, `S`, `m`, `u`, `n`)
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if !value.is_ascii() || value.len() < 2 {
        return None;
    }

    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    match unit {
        "H" => Some(Duration::from_secs(amount * 3600)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}
