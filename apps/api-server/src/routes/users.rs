use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use uuid::Uuid;

use crate::auth::DecodeOutcome;
use crate::error::{Envelope, ErrorCode};
use crate::extract::bearer_token;
use crate::routes::{decode_failure, has_field, parse_body, str_field};
use crate::state::AppState;
use crate::validate;

/// POST /user/signup — create an account. The password policy is enforced
/// before hashing; the email is the uniqueness key.
pub(crate) async fn signup(State(state): State<AppState>, body: Bytes) -> Envelope {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(envelope) => return envelope,
    };
    if !has_field(&body, "email") || !has_field(&body, "user_name") || !has_field(&body, "password")
    {
        return Envelope::bad_request(ErrorCode::MissingEmailOrUserNameOrPassword);
    }

    let email = str_field(&body, "email");
    let user_name = str_field(&body, "user_name");
    let password = str_field(&body, "password");

    if !validate::email(&email) {
        return Envelope::bad_request(ErrorCode::InvalidEmailFormat);
    }
    if !validate::user_name(&user_name) {
        return Envelope::bad_request(ErrorCode::InvalidUserNameFormat);
    }
    if !validate::password(&password) {
        return Envelope::bad_request(ErrorCode::InvalidPasswordFormat);
    }

    let password_hash = match crate::auth::hash_password(&password) {
        Ok(hash) => hash,
        Err(err) => return Envelope::internal(err),
    };

    match state
        .repo
        .register_user(&email, &user_name, &password_hash)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            return Envelope::error(StatusCode::CONFLICT, ErrorCode::EmailAlreadyRegistered)
        }
        Err(err) => return Envelope::internal(err),
    }

    match state.repo.find_user_id(&email).await {
        Ok(Some(user_id)) => Envelope::ok(json!({
            "email": email,
            "user_name": user_name,
            "user_id": user_id.to_string(),
        })),
        Ok(None) => Envelope::internal("registered user has no user_id"),
        Err(err) => Envelope::internal(err),
    }
}

/// POST /user/signin — verify credentials and hand out the token pair: an
/// access token in the body, a refresh token as a cookie.
pub(crate) async fn signin(State(state): State<AppState>, body: Bytes) -> Envelope {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(envelope) => return envelope,
    };
    if !has_field(&body, "email") || !has_field(&body, "password") {
        return Envelope::bad_request(ErrorCode::MissingEmailOrPassword);
    }

    let email = str_field(&body, "email");
    let password = str_field(&body, "password");
    if !validate::email(&email) {
        return Envelope::bad_request(ErrorCode::InvalidEmailFormat);
    }

    // A missing account and a wrong password are indistinguishable on the
    // wire.
    let password_hash = match state.repo.find_user_password_hash(&email).await {
        Ok(Some(hash)) => hash,
        Ok(None) => return Envelope::bad_request(ErrorCode::EmailOrPasswordError),
        Err(err) => return Envelope::internal(err),
    };
    if !crate::auth::verify_password(&password_hash, &password) {
        return Envelope::bad_request(ErrorCode::EmailOrPasswordError);
    }

    let user_id = match state.repo.find_user_id(&email).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return Envelope::internal("signed-in user has no user_id"),
        Err(err) => return Envelope::internal(err),
    };
    let user_name = match state.repo.find_user_name_by_email(&email).await {
        Ok(Some(user_name)) => user_name,
        Ok(None) => return Envelope::internal("signed-in user has no user_name"),
        Err(err) => return Envelope::internal(err),
    };
    let serial_numbers = match state.repo.find_user_edges(user_id).await {
        Ok(serials) => serials,
        Err(err) => return Envelope::internal(err),
    };

    let access_token = match state.tokens.issue_access_token(&user_id.to_string()) {
        Ok(token) => token,
        Err(err) => return Envelope::internal(err),
    };
    let refresh_token = match state.tokens.issue_refresh_token(user_id).await {
        Ok(token) => token,
        Err(err) => return Envelope::internal(err),
    };

    Envelope::ok(json!({
        "user_id": user_id.to_string(),
        "user_name": user_name,
        "serial_number": serial_numbers,
        "access_token": access_token,
    }))
    .with_refresh_token(refresh_token)
}

/// GET /user/all — profile plus bound edge serials for the bearer of a valid
/// access token.
pub(crate) async fn all(State(state): State<AppState>, headers: HeaderMap) -> Envelope {
    let access_token = bearer_token(&headers);
    if access_token.is_empty() {
        return Envelope::bad_request(ErrorCode::AccessTokenInvalid);
    }

    let user_id = match state.tokens.decode_access_token(&access_token) {
        DecodeOutcome::Ok { user_id } => user_id,
        outcome => return decode_failure(&outcome),
    };
    let user_id = match Uuid::parse_str(&user_id) {
        Ok(user_id) => user_id,
        Err(err) => return Envelope::internal(err),
    };

    let user_name = match state.repo.find_user_name_by_id(user_id).await {
        Ok(Some(user_name)) => user_name,
        Ok(None) => return Envelope::bad_request(ErrorCode::AccessTokenInvalid),
        Err(err) => return Envelope::internal(err),
    };
    let email = match state.repo.find_email(user_id).await {
        Ok(Some(email)) => email,
        Ok(None) => return Envelope::internal("user has no email"),
        Err(err) => return Envelope::internal(err),
    };
    let serial_numbers = match state.repo.find_user_edges(user_id).await {
        Ok(serials) => serials,
        Err(err) => return Envelope::internal(err),
    };

    Envelope::ok(json!({
        "user_id": user_id.to_string(),
        "user_name": user_name,
        "email": email,
        "serial_number": serial_numbers,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/signup", post(signup))
        .route("/user/signin", post(signin))
        .route("/user/all", get(all))
}
