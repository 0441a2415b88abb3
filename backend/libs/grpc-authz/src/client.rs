//! Client-side bearer token interceptor
//!
//! Attaches `authorization: bearer <token>` to outgoing gRPC requests.

use tonic::metadata::errors::InvalidMetadataValue;
use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Client-side interceptor that injects a bearer token into gRPC metadata
///
/// ## Usage
///
/// ```rust,no_run
/// use grpc_authz::BearerInterceptor;
/// use tonic::transport::Channel;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let interceptor = BearerInterceptor::new("eyJhbGc...")?;
///
/// let channel = Channel::from_static("http://[::1]:50051")
///     .connect()
///     .await?;
///
/// // let mut client = InventoryClient::with_interceptor(channel, interceptor);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BearerInterceptor {
    /// Pre-formatted `bearer <token>` value
    auth_header: AsciiMetadataValue,
}

impl BearerInterceptor {
    /// ## Errors
    ///
    /// Returns an error if the token contains characters not allowed in
    /// ASCII metadata. Compact JWS tokens never do.
    pub fn new(token: impl AsRef<str>) -> Result<Self, InvalidMetadataValue> {
        let auth_header = format!("Bearer {}", token.as_ref()).parse()?;
        Ok(Self { auth_header })
    }
}

impl Interceptor for BearerInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request
            .metadata_mut()
            .insert("authorization", self.auth_header.clone());
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injects_bearer_header() {
        let mut interceptor = BearerInterceptor::new("abc.def.ghi").unwrap();
        let request = interceptor.call(Request::new(())).unwrap();

        let value = request.metadata().get("authorization").unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer abc.def.ghi");
    }

    #[test]
    fn test_rejects_invalid_token_characters() {
        assert!(BearerInterceptor::new("abc\ndef").is_err());
    }
}
