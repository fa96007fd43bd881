use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use serde_json::json;
use uuid::Uuid;

use crate::auth::DecodeOutcome;
use crate::error::{Envelope, ErrorCode};
use crate::extract::bearer_token;
use crate::routes::{decode_failure, has_field, parse_body, str_field};
use crate::state::AppState;
use crate::validate;

/// POST /ios/signup — upsert an iOS companion device keyed by its device id.
/// A blank id is replaced by a server-generated UUID, recovered afterwards by
/// APNs token.
pub(crate) async fn signup(State(state): State<AppState>, body: Bytes) -> Envelope {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(envelope) => return envelope,
    };
    if !has_field(&body, "user_id") || !has_field(&body, "apns_token") {
        return Envelope::bad_request(ErrorCode::MissingUserIdOrApnsToken);
    }

    let ios_device_id = str_field(&body, "ios_device_id");
    let user_id = str_field(&body, "user_id");
    let apns_token = str_field(&body, "apns_token");
    let device_name = str_field(&body, "device_name");

    if !validate::apns_token(&apns_token) {
        return Envelope::bad_request(ErrorCode::InvalidApnsTokenFormat);
    }
    let user_id = match Uuid::parse_str(&user_id) {
        Ok(user_id) => user_id,
        Err(err) => return Envelope::internal(err),
    };

    if let Err(err) = state
        .repo
        .register_ios_device(&ios_device_id, user_id, &apns_token, &device_name)
        .await
    {
        return Envelope::internal(err);
    }

    let ios_device_id = if ios_device_id.is_empty() {
        match state.repo.find_ios_device_id(&apns_token).await {
            Ok(Some(generated)) => generated.to_string(),
            Ok(None) => return Envelope::internal("upserted ios device not found"),
            Err(err) => return Envelope::internal(err),
        }
    } else {
        ios_device_id
    };

    Envelope::ok(json!({
        "user_id": user_id.to_string(),
        "apns_token": apns_token,
        "ios_device_id": ios_device_id,
    }))
}

/// Shared front half of bind/unbind: field check, bearer decode, serial
/// format check. Returns the caller's user id and the serial on success.
async fn binding_request(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<(Uuid, String), Envelope> {
    let body = parse_body(body)?;
    if !has_field(&body, "serial_number") {
        return Err(Envelope::bad_request(ErrorCode::MissingSerialNumber));
    }
    let serial_number = str_field(&body, "serial_number");

    let access_token = bearer_token(headers);
    if access_token.is_empty() {
        return Err(Envelope::bad_request(ErrorCode::AccessTokenInvalid));
    }
    let user_id = match state.tokens.decode_access_token(&access_token) {
        DecodeOutcome::Ok { user_id } => user_id,
        outcome => return Err(decode_failure(&outcome)),
    };
    let user_id = Uuid::parse_str(&user_id).map_err(Envelope::internal)?;

    if !validate::serial_number(&serial_number) {
        return Err(Envelope::bad_request(ErrorCode::InvalidSerialNumberFormat));
    }
    Ok((user_id, serial_number))
}

/// POST /ios/bind — attach an edge device to the calling user.
pub(crate) async fn bind(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Envelope {
    let (user_id, serial_number) = match binding_request(&state, &headers, &body).await {
        Ok(parts) => parts,
        Err(envelope) => return envelope,
    };

    match state.repo.bind_edge_user(&serial_number, user_id).await {
        Ok(true) => Envelope::ok(json!({ "serial_number": serial_number })),
        Ok(false) => Envelope::error(StatusCode::CONFLICT, ErrorCode::BindingAlreadyExists),
        Err(err) => Envelope::internal(err),
    }
}

/// POST /ios/unbind — detach an edge device; unbinding a non-existent
/// binding still succeeds.
pub(crate) async fn unbind(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Envelope {
    let (user_id, serial_number) = match binding_request(&state, &headers, &body).await {
        Ok(parts) => parts,
        Err(envelope) => return envelope,
    };

    match state.repo.unbind_edge_user(&serial_number, user_id).await {
        Ok(()) => Envelope::ok(json!({ "serial_number": serial_number })),
        Err(err) => Envelope::internal(err),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ios/signup", post(signup))
        .route("/ios/bind", post(bind))
        .route("/ios/unbind", post(unbind))
}
