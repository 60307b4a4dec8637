//! Metric definitions for the authentication layer

use metrics::describe_counter;

pub const TOKENS_ISSUED: &str = "grpc_guard_tokens_issued_total";
pub const AUTH_SUCCESS: &str = "grpc_guard_auth_success_total";
pub const AUTH_REJECTIONS: &str = "grpc_guard_auth_rejections_total";

/// Register metric descriptions so exporters emit HELP lines from startup
pub fn describe_metrics() {
    describe_counter!(TOKENS_ISSUED, "Total number of identity tokens issued");
    describe_counter!(AUTH_SUCCESS, "Total number of authenticated gRPC calls");
    describe_counter!(
        AUTH_REJECTIONS,
        "Total number of rejected gRPC calls, labelled by reason"
    );
}
