//! Unified error handling for grpc-guard

use std::path::PathBuf;
use thiserror::Error;
use tonic::Status;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Reasons a call or token failed authentication.
///
/// The variants exist for logs and metrics only. Callers on the other side of
/// the wire see a single unauthenticated status, see
/// [`crate::grpc::interceptor::rejection`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("metadata is not provided")]
    MissingMetadata,

    #[error("authorization token is not provided")]
    MissingToken,

    #[error("unexpected signing method: {0}")]
    BadAlgorithm(String),

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("invalid token claims: {0}")]
    Invalid(String),

    #[error("token has no subject")]
    MissingSubject,
}

impl AuthError {
    /// Short, stable label used as the `reason` field in logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingMetadata => "missing_metadata",
            AuthError::MissingToken => "missing_token",
            AuthError::BadAlgorithm(_) => "bad_algorithm",
            AuthError::Malformed(_) => "malformed",
            AuthError::Invalid(_) => "invalid",
            AuthError::MissingSubject => "missing_subject",
        }
    }
}

/// A token could not be issued.
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("signing identity token: {0}")]
    Codec(#[from] jsonwebtoken::errors::Error),

    #[error("signing identity token: expiry is out of range")]
    ExpiryOutOfRange,
}

/// Certificate material could not be turned into transport credentials.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("loading CA's certificate from {path}: {reason}")]
    TrustStore { path: PathBuf, reason: String },

    #[error("loading certificate and private key from {path}: {reason}")]
    IdentityLoad { path: PathBuf, reason: String },
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthenticated: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        match &err {
            AppError::Auth(auth) => crate::grpc::interceptor::rejection(auth),
            AppError::BadRequest(msg) => Status::invalid_argument(msg.clone()),
            AppError::Signing(e) => {
                tracing::error!("Signing error: {:?}", e);
                Status::internal("An internal error occurred")
            }
            AppError::Credential(e) => {
                tracing::error!("Credential error: {}", e);
                Status::internal("An internal error occurred")
            }
            AppError::Transport(e) => {
                tracing::error!("Transport error: {:?}", e);
                Status::internal("An internal error occurred")
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                Status::internal("An internal error occurred")
            }
        }
    }
}
