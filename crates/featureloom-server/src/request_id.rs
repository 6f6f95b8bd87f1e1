//! Request ID middleware
//!
//! 1. An incoming `x-request-id` header is kept; otherwise a UUID v4 is assigned
//! 2. The handler runs inside a `request` span carrying the id and, once
//!    authentication has run, the caller
//! 3. The id is echoed on the response
//!
//! ```bash
//! curl -H "X-Request-ID: my-correlation-id" http://localhost:6566/health -i
//! # Response includes: x-request-id: my-correlation-id
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{field, Instrument};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id of the current request, available to handlers as an extension
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", id = %request_id, caller = field::Empty);
    span.in_scope(|| {
        tracing::debug!(
            method = %request.method(),
            path = %request.uri().path(),
            "Incoming request"
        );
    });

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    response
}
