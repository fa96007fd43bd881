use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use serde_json::json;

use crate::error::{Envelope, ErrorCode};
use crate::extract::refresh_token;
use crate::state::AppState;

/// POST /auth/refresh — slide the refresh record 30 days forward and mint a
/// new access token. An expired record is revoked by the same statement, so
/// the caller sees exactly one of {refreshed, expired}.
pub(crate) async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Envelope {
    let token = refresh_token(&headers);
    if token.is_empty() {
        return Envelope::bad_request(ErrorCode::MissingRefreshToken);
    }

    let user_id = match state.tokens.refresh(&token).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            return Envelope::error(StatusCode::UNAUTHORIZED, ErrorCode::RefreshTokenExpired)
        }
        Err(err) => return Envelope::internal(err),
    };

    match state.tokens.issue_access_token(&user_id.to_string()) {
        Ok(access_token) => Envelope::ok(json!({ "access_token": access_token })),
        Err(err) => Envelope::internal(err),
    }
}

/// POST /auth/out — revoke the refresh token. Idempotent: revoking an
/// unknown or already-revoked token still succeeds.
pub(crate) async fn out(State(state): State<AppState>, headers: HeaderMap) -> Envelope {
    let token = refresh_token(&headers);
    if token.is_empty() {
        return Envelope::bad_request(ErrorCode::MissingRefreshToken);
    }

    match state.tokens.revoke(&token).await {
        Ok(()) => Envelope::ok(json!({})),
        Err(err) => Envelope::internal(err),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/refresh", post(refresh))
        .route("/auth/out", post(out))
}
