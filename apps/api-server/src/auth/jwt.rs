use crate::auth::secrets::SecretStore;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

pub const ISSUER: &str = "RED-Safe";
const ACCESS_TOKEN_TTL_SECS: i64 = 600;
const NONCE_BYTES: usize = 12;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
}

/// Result of decoding an access token. The numeric codes are the gRPC wire
/// contract shared with peer services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Ok { user_id: String },
    Expired,
    Invalid,
    BadSignature,
    Malformed,
    Internal(String),
}

impl DecodeOutcome {
    pub fn code(&self) -> i32 {
        match self {
            DecodeOutcome::Ok { .. } => 0,
            DecodeOutcome::Expired => 1,
            DecodeOutcome::Invalid => 2,
            DecodeOutcome::BadSignature => 3,
            DecodeOutcome::Malformed => 4,
            DecodeOutcome::Internal(_) => 5,
        }
    }

    pub fn error_message(&self) -> &str {
        match self {
            DecodeOutcome::Ok { .. } => "",
            DecodeOutcome::Expired => "access token expired",
            DecodeOutcome::Invalid => "access token invalid",
            DecodeOutcome::BadSignature => "invalid signature",
            DecodeOutcome::Malformed => "malformed token",
            DecodeOutcome::Internal(message) => message,
        }
    }
}

/// Issues a 10-minute HS256 access token whose subject is the encrypted
/// user id.
pub fn issue(secrets: &SecretStore, user_id: &str) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        iss: ISSUER.to_string(),
        sub: encrypt_subject(secrets, user_id)?,
        iat: now,
        exp: now + ACCESS_TOKEN_TTL_SECS,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secrets.hmac_key()),
    )
    .context("sign access token")
}

/// Verifies signature, issuer, and expiry, then decrypts the subject back to
/// the user id.
pub fn decode(secrets: &SecretStore, token: &str) -> DecodeOutcome {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.leeway = 0;

    let data = match jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secrets.hmac_key()),
        &validation,
    ) {
        Ok(data) => data,
        Err(err) => {
            return match err.kind() {
                ErrorKind::ExpiredSignature => DecodeOutcome::Expired,
                ErrorKind::InvalidSignature => DecodeOutcome::BadSignature,
                ErrorKind::InvalidIssuer
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::MissingRequiredClaim(_) => DecodeOutcome::Invalid,
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => DecodeOutcome::Malformed,
                _ => DecodeOutcome::Internal(err.to_string()),
            };
        }
    };

    match decrypt_subject(secrets, &data.claims.sub) {
        Ok(user_id) => DecodeOutcome::Ok { user_id },
        Err(_) => DecodeOutcome::Invalid,
    }
}

fn encrypt_subject(secrets: &SecretStore, user_id: &str) -> Result<String> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(secrets.subject_key()));
    let mut nonce = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), user_id.as_bytes())
        .map_err(|_| anyhow!("subject encryption failed"))?;

    let mut sealed = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(sealed))
}

fn decrypt_subject(secrets: &SecretStore, subject: &str) -> Result<String> {
    let sealed = URL_SAFE_NO_PAD
        .decode(subject)
        .context("subject is not base64")?;
    if sealed.len() <= NONCE_BYTES {
        anyhow::bail!("subject too short");
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_BYTES);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(secrets.subject_key()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| anyhow!("subject decryption failed"))?;
    String::from_utf8(plaintext).context("subject is not UTF-8")
}
