//! Token authentication interceptor for gRPC services
//!
//! Every inbound call must carry an `authorization` metadata entry holding a
//! raw identity token. The interceptor validates it before the handler runs
//! and records the resulting [`CallIdentity`] in the request extensions.

use crate::error::AuthError;
use crate::jwt::TokenService;
use crate::telemetry::metrics::{AUTH_REJECTIONS, AUTH_SUCCESS};
use metrics::counter;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::{Request, Status};

/// Metadata key carrying the identity token (no scheme prefix)
pub const AUTHORIZATION_METADATA_KEY: &str = "authorization";

/// Identity of the caller for a single authenticated call.
///
/// Only the interceptor can create one, so its presence in a request proves
/// the token of that request was validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallIdentity {
    subject: String,
}

impl CallIdentity {
    pub(crate) fn new(subject: String) -> Self {
        Self { subject }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Identity attached to `request` by [`AuthInterceptor`], if any
    pub fn from_request<T>(request: &Request<T>) -> Option<&CallIdentity> {
        request.extensions().get::<CallIdentity>()
    }
}

/// Identity of an authenticated call, or an unauthenticated status.
///
/// Handlers use this to fail closed if they are ever mounted without the
/// interceptor.
#[allow(clippy::result_large_err)]
pub fn require_identity<T>(request: &Request<T>) -> Result<&CallIdentity, Status> {
    CallIdentity::from_request(request).ok_or_else(|| {
        tracing::error!("handler reached without an authenticated identity");
        Status::unauthenticated("request is not authenticated")
    })
}

/// Turns a presented token into the caller's subject
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<String, AuthError>;
}

impl TokenValidator for TokenService {
    fn validate(&self, token: &str) -> Result<String, AuthError> {
        TokenService::validate(self, token)
    }
}

/// Map an internal authentication failure to the status sent to the caller.
///
/// Token problems all produce the same message so callers cannot probe which
/// check failed; the detailed reason only goes to the logs.
pub fn rejection(err: &AuthError) -> Status {
    match err {
        AuthError::MissingMetadata | AuthError::MissingToken => {
            Status::unauthenticated(err.to_string())
        }
        AuthError::BadAlgorithm(_)
        | AuthError::Malformed(_)
        | AuthError::Invalid(_)
        | AuthError::MissingSubject => Status::unauthenticated("invalid token"),
    }
}

/// Authentication interceptor for gRPC services
#[derive(Clone)]
pub struct AuthInterceptor {
    validator: Arc<dyn TokenValidator>,
}

impl AuthInterceptor {
    pub fn new(validator: Arc<dyn TokenValidator>) -> Self {
        Self { validator }
    }

    /// Interceptor validating tokens with `service`
    pub fn with_token_service(service: TokenService) -> Self {
        Self::new(Arc::new(service))
    }

    /// Authenticate a call from its metadata
    pub fn authenticate(&self, metadata: &MetadataMap) -> Result<CallIdentity, AuthError> {
        if metadata.is_empty() {
            return Err(AuthError::MissingMetadata);
        }

        let token = metadata
            .get(AUTHORIZATION_METADATA_KEY)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::Malformed("authorization value is not ASCII".to_string()))?;
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let subject = self.validator.validate(token)?;
        Ok(CallIdentity::new(subject))
    }
}

impl tonic::service::Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        match self.authenticate(request.metadata()) {
            Ok(identity) => {
                counter!(AUTH_SUCCESS).increment(1);
                tracing::debug!(subject = identity.subject(), "authenticated gRPC call");
                request.extensions_mut().insert(identity);
                Ok(request)
            }
            Err(err) => {
                counter!(AUTH_REJECTIONS, "reason" => err.reason()).increment(1);
                tracing::warn!(reason = err.reason(), error = %err, "rejected gRPC call");
                Err(rejection(&err))
            }
        }
    }
}
