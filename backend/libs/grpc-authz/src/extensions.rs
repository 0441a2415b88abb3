//! Request Extension Trait for Authenticated Callers
//!
//! Gives handlers access to the identity stored by `AuthzLayer`.

use crate::policy::AuthenticatedCaller;
use tonic::{Request, Status};

/// Extension trait for reading the authenticated caller from gRPC requests
///
/// ## Usage
///
/// ```rust,no_run
/// use grpc_authz::AuthenticatedCallerExt;
/// use tonic::{Request, Response, Status};
///
/// async fn get_item(request: Request<()>) -> Result<Response<()>, Status> {
///     let caller = request.authenticated_caller()?;
///     tracing::info!(subject = ?caller.subject(), "Serving item");
///     Ok(Response::new(()))
/// }
/// ```
pub trait AuthenticatedCallerExt {
    /// Caller stored by `AuthzLayer`
    ///
    /// ## Errors
    ///
    /// Returns `Status::unauthenticated` if the method was unprotected or
    /// the layer is not attached.
    fn authenticated_caller(&self) -> Result<&AuthenticatedCaller, Status>;

    /// Whether this call passed token authentication
    fn is_authenticated(&self) -> bool;
}

impl<T> AuthenticatedCallerExt for Request<T> {
    fn authenticated_caller(&self) -> Result<&AuthenticatedCaller, Status> {
        self.extensions()
            .get::<AuthenticatedCaller>()
            .ok_or_else(|| Status::unauthenticated("call was not authenticated"))
    }

    fn is_authenticated(&self) -> bool {
        self.extensions().get::<AuthenticatedCaller>().is_some()
    }
}
