pub mod jwt;
pub mod password;
pub mod secrets;

pub use jwt::DecodeOutcome;
pub use password::{hash_password, verify_password};
pub use secrets::SecretStore;

use crate::db::Repo;
use anyhow::Result;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Token subsystem: short-lived signed access tokens plus opaque refresh
/// handles whose SHA-256 is the server-side key. Owns the secret material;
/// everything else goes through this service.
pub struct TokenService {
    secrets: SecretStore,
    repo: Repo,
}

impl TokenService {
    pub fn new(secrets: SecretStore, repo: Repo) -> Self {
        Self { secrets, repo }
    }

    pub fn issue_access_token(&self, user_id: &str) -> Result<String> {
        jwt::issue(&self.secrets, user_id)
    }

    pub fn decode_access_token(&self, token: &str) -> DecodeOutcome {
        jwt::decode(&self.secrets, token)
    }

    /// Mints a refresh token and persists its hash with a 30-day expiry. The
    /// plaintext token exists only in the response cookie.
    pub async fn issue_refresh_token(&self, user_id: Uuid) -> sqlx::Result<String> {
        let token = generate_refresh_token();
        self.repo
            .register_refresh_token(&sha256_hex(&token), user_id)
            .await?;
        Ok(token)
    }

    /// Slides the expiry of a live record; revokes a matching expired one in
    /// the same statement. `None` means the token no longer refreshes.
    pub async fn refresh(&self, refresh_token: &str) -> sqlx::Result<Option<Uuid>> {
        self.repo
            .check_and_refresh_token(&sha256_hex(refresh_token))
            .await
    }

    pub async fn revoke(&self, refresh_token: &str) -> sqlx::Result<()> {
        self.repo
            .revoke_refresh_token(&sha256_hex(refresh_token))
            .await
    }
}

/// 32 random bytes rendered as 64 lower-hex characters.
pub fn generate_refresh_token() -> String {
    let mut buf = [0u8; 32];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

pub fn sha256_hex(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_tokens_are_64_lower_hex_and_unique() {
        let first = generate_refresh_token();
        let second = generate_refresh_token();
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(first, second);
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
