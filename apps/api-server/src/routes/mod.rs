pub mod auth;
pub mod edge;
pub mod ios;
pub mod users;

use crate::auth::DecodeOutcome;
use crate::error::{Envelope, ErrorCode};
use crate::state::AppState;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use axum::Router;
use serde_json::Value;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(edge::router())
        .merge(users::router())
        .merge(ios::router())
        .merge(auth::router())
        .layer(axum::middleware::from_fn(access_log))
        .fallback(unknown_endpoint)
        .method_not_allowed_fallback(unknown_endpoint)
        .with_state(state)
}

/// Routing miss: unknown method or path.
async fn unknown_endpoint() -> Envelope {
    Envelope::error(StatusCode::NOT_FOUND, ErrorCode::UnknownEndpoint)
}

async fn access_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    tracing::info!(
        target: "access",
        %method,
        path,
        status = response.status().as_u16()
    );
    response
}

/// Parses a request body. Parse failure is `400/100`; a parsed non-object
/// simply has no fields, so the missing-field codes take over, matching the
/// original pipeline.
pub(crate) fn parse_body(body: &[u8]) -> Result<Value, Envelope> {
    serde_json::from_slice(body).map_err(|_| Envelope::bad_request(ErrorCode::InvalidJson))
}

pub(crate) fn has_field(body: &Value, key: &str) -> bool {
    body.get(key).is_some()
}

pub(crate) fn str_field(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Maps a failed token decode onto the HTTP envelope. Success outcomes never
/// reach this.
pub(crate) fn decode_failure(outcome: &DecodeOutcome) -> Envelope {
    match outcome {
        DecodeOutcome::Expired => Envelope::bad_request(ErrorCode::AccessTokenExpired),
        DecodeOutcome::Invalid => Envelope::bad_request(ErrorCode::AccessTokenInvalid),
        DecodeOutcome::BadSignature => Envelope::bad_request(ErrorCode::JwtInvalidSignature),
        DecodeOutcome::Malformed => Envelope::bad_request(ErrorCode::JwtInvalidTokenSupplied),
        _ => Envelope::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalServerError,
        ),
    }
}
