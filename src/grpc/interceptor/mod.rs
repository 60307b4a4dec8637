//! gRPC authentication interceptors
//!
//! Calls are authenticated twice: the transport by mutual TLS (see
//! [`crate::tls`]), then each call by the identity token in its metadata.

pub mod auth;

pub use auth::{
    rejection, require_identity, AuthInterceptor, CallIdentity, TokenValidator,
    AUTHORIZATION_METADATA_KEY,
};
