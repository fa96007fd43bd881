use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use serde_json::json;

use crate::error::{Envelope, ErrorCode};
use crate::routes::{has_field, parse_body, str_field};
use crate::state::AppState;
use crate::validate;

/// POST /edge/signup — onboard an edge device by serial number. Re-running
/// the handshake for a known serial is a conflict.
pub(crate) async fn signup(State(state): State<AppState>, body: Bytes) -> Envelope {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(envelope) => return envelope,
    };
    if !has_field(&body, "serial_number") || !has_field(&body, "version") {
        return Envelope::bad_request(ErrorCode::MissingSerialNumberOrVersion);
    }

    let serial_number = str_field(&body, "serial_number");
    let version = str_field(&body, "version");
    if !validate::serial_number(&serial_number) {
        return Envelope::bad_request(ErrorCode::InvalidSerialNumberFormat);
    }

    match state.repo.register_edge(&serial_number, &version).await {
        Ok(true) => Envelope::ok(json!({ "serial_number": serial_number })),
        Ok(false) => Envelope::error(
            StatusCode::CONFLICT,
            ErrorCode::EdgeDeviceAlreadyRegistered,
        ),
        Err(err) => Envelope::internal(err),
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/edge/signup", post(signup))
}
