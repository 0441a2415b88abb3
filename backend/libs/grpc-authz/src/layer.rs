//! Tower middleware plugging the access policy into a tonic server
//!
//! tonic's `Interceptor` is synchronous and does not see the method path, so
//! the policy runs as a tower layer instead. It sees every call, unary and
//! streaming alike, before the generated service code does.

use crate::policy::{AccessPolicy, Authorization};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tonic::Status;
use tower::{Layer, Service};

/// Layer applying an `AccessPolicy` to every call of the wrapped service
///
/// ## Usage
///
/// ```rust,no_run
/// use grpc_authz::{AccessPolicy, AuthzLayer};
/// use std::sync::Arc;
///
/// # fn example(policy: AccessPolicy) {
/// let layer = AuthzLayer::new(Arc::new(policy));
/// // tonic::transport::Server::builder()
/// //     .layer(layer)
/// //     .add_service(InventoryServer::new(service));
/// # }
/// ```
#[derive(Clone)]
pub struct AuthzLayer {
    policy: Arc<AccessPolicy>,
}

impl AuthzLayer {
    pub fn new(policy: Arc<AccessPolicy>) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for AuthzLayer {
    type Service = AuthzService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthzService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// Service produced by `AuthzLayer`
///
/// On success the `AuthenticatedCaller` is stored in the request extensions.
/// On failure the classified `Status` is returned and the inner service is
/// never called.
#[derive(Clone)]
pub struct AuthzService<S> {
    inner: S,
    policy: Arc<AccessPolicy>,
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for AuthzService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<BoxBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        // Keep the service that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let policy = self.policy.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            match policy.authorize(&parts).await {
                Ok(Authorization::Unprotected) => {}
                Ok(Authorization::Authenticated(caller)) => {
                    parts.extensions.insert(caller);
                }
                Err(err) => return Ok(Status::from(err).into_http()),
            }

            inner.call(http::Request::from_parts(parts, body)).await
        })
    }
}
