//! gRPC call authentication

pub mod interceptor;

pub use interceptor::{require_identity, AuthInterceptor, CallIdentity, TokenValidator};
