//! JWT Scope Authorization for gRPC Services
//!
//! This library decides, per incoming gRPC call, whether the call needs a
//! bearer token, verifies the token's signature and standard claims, and
//! enforces a method-to-scope access policy before the handler runs.
//!
//! ## Core Components
//!
//! - **AccessPolicy**: Immutable policy built once at startup, shared by every call
//! - **SignatureVerifier**: HMAC (HS256/384/512) or RSA (RS256/384/512) verification
//! - **ClaimsValidator**: `iat`, `nbf`/`exp` window and audience checks
//! - **ScopeValidator**: Pluggable strategy that inspects raw claims against required scopes
//! - **AuthzLayer**: Tower middleware plugging the policy into a tonic server
//! - **AuthenticatedCallerExt**: Handler-side access to the authenticated identity
//! - **BearerInterceptor**: Client-side interceptor attaching `authorization: bearer <token>`
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use grpc_authz::{AccessPolicy, AuthzLayer, KeyMaterial, ScopeMapping, SigningAlgorithm};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scopes = ScopeMapping::from_pairs([
//!     ("/inventory.v1.Inventory/Get", vec!["read"]),
//!     ("/inventory.v1.Inventory/Put", vec!["write"]),
//! ]);
//!
//! let policy = AccessPolicy::builder(
//!     SigningAlgorithm::HS256,
//!     KeyMaterial::secret(std::env::var("AUTHZ_HS_KEY")?),
//! )
//! .scope_mapping(scopes)
//! .audience("inventory")
//! .build()?;
//!
//! let layer = AuthzLayer::new(Arc::new(policy));
//! // tonic::transport::Server::builder().layer(layer).add_service(...)
//! # Ok(())
//! # }
//! ```
//!
//! ## Status Codes
//!
//! - Missing, malformed, badly signed, expired or wrong-audience token = `Status::unauthenticated`
//! - Valid identity without the required scopes = `Status::permission_denied`
//! - Malformed key material = `Status::failed_precondition`
//! - Unsupported algorithm identifier = `Status::unimplemented`

mod algorithm;
mod claims;
mod client;
mod context;
mod error;
mod extensions;
mod layer;
mod policy;
mod scope;
mod settings;
mod verifier;

pub use algorithm::{AlgorithmFamily, SigningAlgorithm};
pub use claims::{AudienceCheck, ClaimsRejection, ClaimsValidator, StandardClaims};
pub use client::BearerInterceptor;
pub use context::{extract_bearer, parse_grpc_timeout, AuthContext, AUTHORIZATION_SCHEME};
pub use error::{AuthzError, TokenDefect};
pub use extensions::AuthenticatedCallerExt;
pub use layer::{AuthzLayer, AuthzService};
pub use policy::{AccessPolicy, AccessPolicyBuilder, AuthenticatedCaller, Authorization};
pub use scope::{
    AllowAll, ClaimScopeValidator, FnScopeValidator, ScopeDenial, ScopeMapping, ScopeSet,
    ScopeValidator,
};
pub use settings::AuthzSettings;
pub use verifier::{KeyMaterial, SignatureVerifier, VerifiedToken};

// Re-export tonic Status for convenience
pub use tonic::Status;
