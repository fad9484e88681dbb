//! Plain-text error responses and target URL helpers

use hyper::{body::Bytes, Response, StatusCode};
use mesh_core::{MeshError, ServiceInstance};

/// Build a target URL for an instance
///
/// `path_and_query` is appended verbatim and defaults to `/` when empty.
pub fn build_target_url(instance: &ServiceInstance, path_and_query: &str) -> String {
    if path_and_query.is_empty() {
        format!("{}/", instance.base_url())
    } else if path_and_query.starts_with('/') {
        format!("{}{}", instance.base_url(), path_and_query)
    } else {
        format!("{}/{}", instance.base_url(), path_and_query)
    }
}

fn text_response(status: StatusCode, body: String) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(body));
    *response.status_mut() = status;
    response
}

/// Create a 502 Bad Gateway response
pub fn bad_gateway_response(reason: &str) -> Response<Bytes> {
    text_response(StatusCode::BAD_GATEWAY, format!("Bad Gateway: {}\n", reason))
}

/// Create a 503 Service Unavailable response
pub fn service_unavailable_response(reason: &str) -> Response<Bytes> {
    text_response(
        StatusCode::SERVICE_UNAVAILABLE,
        format!("Service Unavailable: {}\n", reason),
    )
}

/// Create a 404 Not Found response
pub fn not_found_response(reason: &str) -> Response<Bytes> {
    text_response(StatusCode::NOT_FOUND, format!("Not Found: {}\n", reason))
}

/// Map an invocation error to the response the caller sees
///
/// Discovery and upstream failures surface as 503. Anything else is a
/// gateway-side fault and becomes 502.
pub fn error_response(error: &MeshError) -> Response<Bytes> {
    if error.is_service_unavailable() {
        service_unavailable_response(&error.to_string())
    } else {
        bad_gateway_response(&error.to_string())
    }
}
