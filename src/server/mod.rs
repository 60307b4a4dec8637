//! Transport wiring for hosts of the authentication layer
//!
//! The host registers its own services on the returned server builder,
//! wrapping each with [`crate::AuthInterceptor`]:
//!
//! ```ignore
//! let bundle = CredentialProvider::new(CertificatePaths::server(&config.tls)).load()?;
//! let interceptor = AuthInterceptor::with_token_service(TokenService::new(&config.jwt));
//! secure_server(&bundle)?
//!     .add_service(BookServiceServer::with_interceptor(books, interceptor))
//!     .serve(config.grpc_addr().parse()?)
//!     .await?;
//! ```

use crate::error::{AppError, Result};
use crate::grpc::interceptor::AUTHORIZATION_METADATA_KEY;
use crate::tls::CredentialBundle;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Endpoint, Server};
use tonic::Request;

/// Server builder that only accepts connections presenting a client
/// certificate signed by one of the bundle's trusted roots
pub fn secure_server(bundle: &CredentialBundle) -> Result<Server> {
    Ok(Server::builder().tls_config(bundle.server_tls_config())?)
}

/// Client endpoint presenting the bundle's identity and verifying the server
/// certificate for `domain`
pub fn secure_endpoint(
    bundle: &CredentialBundle,
    uri: impl Into<String>,
    domain: &str,
) -> Result<Endpoint> {
    let uri = uri.into();
    let endpoint = Endpoint::from_shared(uri.clone())
        .map_err(|e| AppError::BadRequest(format!("invalid endpoint {}: {}", uri, e)))?;
    Ok(endpoint.tls_config(bundle.client_tls_config(domain))?)
}

/// Wrap `message` in a request carrying `token` in its authorization metadata
pub fn authorized_request<T>(message: T, token: &str) -> Result<Request<T>> {
    let value: MetadataValue<Ascii> = token
        .parse()
        .map_err(|_| AppError::BadRequest("token is not valid metadata".to_string()))?;

    let mut request = Request::new(message);
    request
        .metadata_mut()
        .insert(AUTHORIZATION_METADATA_KEY, value);
    Ok(request)
}
