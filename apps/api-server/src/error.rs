use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use std::fmt::Display;

/// Wire-stable domain error codes. The integer values are part of the client
/// contract and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    UnknownEndpoint = 99,
    InvalidJson = 100,
    InvalidSerialNumberFormat = 101,
    InvalidApnsTokenFormat = 102,
    InvalidEmailFormat = 103,
    InvalidUserNameFormat = 104,
    InvalidPasswordFormat = 105,
    EmailOrPasswordError = 201,
    EdgeDeviceAlreadyRegistered = 301,
    EmailAlreadyRegistered = 302,
    BindingAlreadyExists = 303,
    MissingSerialNumberOrVersion = 401,
    MissingEmailOrUserNameOrPassword = 402,
    MissingEmailOrPassword = 403,
    MissingUserIdOrApnsToken = 404,
    MissingSerialNumber = 405,
    MissingRefreshToken = 406,
    MissingAccessToken = 407,
    InternalServerError = 500,
    RefreshTokenExpired = 501,
    RefreshTokenInvalid = 502,
    AccessTokenExpired = 503,
    AccessTokenInvalid = 504,
    JwtInvalidSignature = 505,
    JwtInvalidTokenSupplied = 506,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// What every handler returns: HTTP status, domain error code, JSON body, and
/// an optional freshly-issued refresh token that becomes a `Set-Cookie`.
#[derive(Debug)]
pub struct Envelope {
    pub status: StatusCode,
    pub error_code: ErrorCode,
    pub body: Value,
    pub refresh_token: Option<String>,
}

impl Envelope {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            error_code: ErrorCode::Success,
            body,
            refresh_token: None,
        }
    }

    pub fn error(status: StatusCode, error_code: ErrorCode) -> Self {
        Self {
            status,
            error_code,
            body: json!({}),
            refresh_token: None,
        }
    }

    pub fn bad_request(error_code: ErrorCode) -> Self {
        Self::error(StatusCode::BAD_REQUEST, error_code)
    }

    /// Storage or crypto failure: log the cause, return the generic envelope.
    /// Backend error text never reaches the client.
    pub fn internal(err: impl Display) -> Self {
        tracing::error!(error = %err, "internal error");
        Self::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalServerError,
        )
    }

    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }
}

fn refresh_cookie(token: &str) -> String {
    format!(
        "refresh_token={token}; Path=/auth; Max-Age=2592000; HttpOnly; Secure; SameSite=Strict"
    )
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let mut body = match self.body {
            Value::Object(map) => Value::Object(map),
            _ => json!({}),
        };
        body["error_code"] = json!(self.error_code.as_i32());

        let mut response = (self.status, axum::Json(body)).into_response();
        if let Some(token) = &self.refresh_token {
            if let Ok(value) = header::HeaderValue::from_str(&refresh_cookie(token)) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn error_codes_are_wire_stable() {
        assert_eq!(ErrorCode::Success.as_i32(), 0);
        assert_eq!(ErrorCode::UnknownEndpoint.as_i32(), 99);
        assert_eq!(ErrorCode::InvalidJson.as_i32(), 100);
        assert_eq!(ErrorCode::InvalidPasswordFormat.as_i32(), 105);
        assert_eq!(ErrorCode::EmailOrPasswordError.as_i32(), 201);
        assert_eq!(ErrorCode::BindingAlreadyExists.as_i32(), 303);
        assert_eq!(ErrorCode::MissingAccessToken.as_i32(), 407);
        assert_eq!(ErrorCode::RefreshTokenExpired.as_i32(), 501);
        assert_eq!(ErrorCode::JwtInvalidTokenSupplied.as_i32(), 506);
    }

    #[tokio::test]
    async fn envelope_appends_error_code_to_body() {
        let response = Envelope::ok(json!({"serial_number": "RED-0A1B2C3D"})).into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["serial_number"], "RED-0A1B2C3D");
        assert_eq!(body["error_code"], 0);
    }

    #[tokio::test]
    async fn envelope_sets_refresh_cookie_when_token_present() {
        let token = "ab".repeat(32);
        let response = Envelope::ok(json!({}))
            .with_refresh_token(token.clone())
            .into_response();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(cookie.starts_with(&format!("refresh_token={token}")));
        assert!(cookie.contains("Path=/auth"));
        assert!(cookie.contains("Max-Age=2592000"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
    }

    #[tokio::test]
    async fn envelope_without_token_sets_no_cookie() {
        let response = Envelope::bad_request(ErrorCode::InvalidJson).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }
}
