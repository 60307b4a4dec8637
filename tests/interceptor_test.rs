//! AuthInterceptor tests through tonic's `InterceptedService`
//!
//! The downstream handler counts its invocations so each test can prove a
//! rejected call never reached it.

mod common;

use chrono::Duration;
use common::{test_jwt_config, token_service_at};
use grpc_guard::grpc::{AuthInterceptor, CallIdentity};
use grpc_guard::jwt::{HmacCodec, SystemClock, TokenService};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tonic::codegen::http;
use tonic::service::interceptor::InterceptedService;
use tonic::{Code, Status};
use tower::{service_fn, ServiceExt};

struct Outcome {
    handler_calls: usize,
    status: Option<Status>,
    /// Subject the handler found in the request extensions
    subject: Option<String>,
}

async fn dispatch(interceptor: AuthInterceptor, headers: &[(&str, &str)]) -> Outcome {
    let calls = Arc::new(AtomicUsize::new(0));
    let subject = Arc::new(Mutex::new(None::<String>));
    let (seen_calls, seen_subject) = (calls.clone(), subject.clone());

    let handler = service_fn(move |request: http::Request<()>| {
        let (seen_calls, seen_subject) = (seen_calls.clone(), seen_subject.clone());
        async move {
            seen_calls.fetch_add(1, Ordering::SeqCst);
            *seen_subject.lock().unwrap() = request
                .extensions()
                .get::<CallIdentity>()
                .map(|identity| identity.subject().to_string());
            Ok::<_, Infallible>(http::Response::new(String::new()))
        }
    });

    let mut builder = http::Request::builder()
        .method("POST")
        .uri("/book.BookService/GetAllBooks");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(()).unwrap();

    let response = InterceptedService::new(handler, interceptor)
        .oneshot(request)
        .await
        .unwrap();

    let subject = subject.lock().unwrap().take();
    Outcome {
        handler_calls: calls.load(Ordering::SeqCst),
        status: Status::from_header_map(response.headers()),
        subject,
    }
}

fn interceptor_at(offset: Duration) -> AuthInterceptor {
    AuthInterceptor::with_token_service(token_service_at(offset))
}

fn foreign_service(secret: &[u8]) -> TokenService {
    TokenService::with_ports(
        Arc::new(HmacCodec::new(secret)),
        Arc::new(SystemClock),
        Duration::minutes(15),
    )
}

#[tokio::test]
async fn test_call_without_authorization_never_reaches_handler() {
    let outcome = dispatch(interceptor_at(Duration::zero()), &[("user_id", "123456")]).await;

    assert_eq!(outcome.handler_calls, 0);
    assert!(outcome.subject.is_none());
    let status = outcome.status.unwrap();
    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(status.message(), "authorization token is not provided");
}

#[tokio::test]
async fn test_call_without_metadata_never_reaches_handler() {
    let outcome = dispatch(interceptor_at(Duration::zero()), &[]).await;

    assert_eq!(outcome.handler_calls, 0);
    let status = outcome.status.unwrap();
    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(status.message(), "metadata is not provided");
}

#[tokio::test]
async fn test_valid_token_reaches_handler_with_identity() {
    let token = token_service_at(Duration::zero()).issue("123456").unwrap();

    let outcome = dispatch(
        interceptor_at(Duration::minutes(1)),
        &[("authorization", &token)],
    )
    .await;

    assert_eq!(outcome.handler_calls, 1);
    assert!(outcome.status.is_none());
    assert_eq!(outcome.subject.as_deref(), Some("123456"));
}

#[tokio::test]
async fn test_token_issued_sixteen_minutes_ago_rejected() {
    let token = token_service_at(-Duration::minutes(16))
        .issue("123456")
        .unwrap();

    let outcome = dispatch(
        interceptor_at(Duration::zero()),
        &[("authorization", &token)],
    )
    .await;

    assert_eq!(outcome.handler_calls, 0);
    let status = outcome.status.unwrap();
    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(status.message(), "invalid token");
}

#[tokio::test]
async fn test_token_from_other_secret_rejected() {
    let token = foreign_service(b"someone-else's-secret")
        .issue("123456")
        .unwrap();

    let outcome = dispatch(
        AuthInterceptor::with_token_service(TokenService::new(&test_jwt_config())),
        &[("authorization", &token)],
    )
    .await;

    assert_eq!(outcome.handler_calls, 0);
    assert_eq!(outcome.status.unwrap().code(), Code::Unauthenticated);
}

#[tokio::test]
async fn test_bearer_prefix_is_not_stripped() {
    let token = token_service_at(Duration::zero()).issue("123456").unwrap();
    let header = format!("Bearer {}", token);

    let outcome = dispatch(
        interceptor_at(Duration::zero()),
        &[("authorization", &header)],
    )
    .await;

    assert_eq!(outcome.handler_calls, 0);
    assert_eq!(outcome.status.unwrap().message(), "invalid token");
}

#[tokio::test]
async fn test_rejections_do_not_reveal_cause() {
    let expired = token_service_at(-Duration::hours(1)).issue("123456").unwrap();
    let forged = foreign_service(b"not-the-server-secret")
        .issue("123456")
        .unwrap();

    let mut messages = Vec::new();
    for token in [expired.as_str(), forged.as_str(), "garbage"] {
        let outcome = dispatch(
            interceptor_at(Duration::zero()),
            &[("authorization", token)],
        )
        .await;
        assert_eq!(outcome.handler_calls, 0);
        messages.push(outcome.status.unwrap().message().to_string());
    }

    assert!(messages.iter().all(|m| m == "invalid token"), "{messages:?}");
}
