//! grpc-guard - request authentication for gRPC services
//!
//! This crate provides the authentication layer that sits in front of a gRPC
//! service: short-lived HMAC identity tokens, an interceptor that gates every
//! inbound call, and the mutual-TLS credentials that authenticate the
//! transport itself.

pub mod config;
pub mod error;
pub mod grpc;
pub mod jwt;
pub mod server;
pub mod telemetry;
pub mod tls;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use grpc::{AuthInterceptor, CallIdentity};
pub use jwt::TokenService;
pub use tls::{CredentialBundle, CredentialProvider};
