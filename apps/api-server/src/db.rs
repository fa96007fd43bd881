use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

pub fn connect_lazy(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(8))
        .connect_lazy(database_url)
        .with_context(|| format!("Failed to create lazy database pool for {database_url}"))
}

/// Named-statement repository. Each method corresponds to one statement of
/// the database contract; the schema itself belongs to the database owner and
/// callers only see names and positional parameters.
#[derive(Clone)]
pub struct Repo {
    pool: PgPool,
}

impl Repo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `register_edge`: returns false when the serial number is already
    /// registered.
    pub async fn register_edge(&self, serial_number: &str, version: &str) -> sqlx::Result<bool> {
        let done = sqlx::query(
            r#"
            INSERT INTO edge_devices (edge_serial_number, version)
            VALUES ($1, $2)
            ON CONFLICT (edge_serial_number) DO NOTHING
            "#,
        )
        .bind(serial_number)
        .bind(version)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    /// `register_user`: returns false when the email is already taken.
    pub async fn register_user(
        &self,
        email: &str,
        user_name: &str,
        password_hash: &str,
    ) -> sqlx::Result<bool> {
        let done = sqlx::query(
            r#"
            INSERT INTO users (email, user_name, user_password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(email)
        .bind(user_name)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    /// `find_user_id`
    pub async fn find_user_id(&self, email: &str) -> sqlx::Result<Option<Uuid>> {
        sqlx::query_scalar("SELECT user_id FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    /// `find_user_name_email`
    pub async fn find_user_name_by_email(&self, email: &str) -> sqlx::Result<Option<String>> {
        sqlx::query_scalar("SELECT user_name FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    /// `find_user_name_userid`
    pub async fn find_user_name_by_id(&self, user_id: Uuid) -> sqlx::Result<Option<String>> {
        sqlx::query_scalar("SELECT user_name FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// `find_email`
    pub async fn find_email(&self, user_id: Uuid) -> sqlx::Result<Option<String>> {
        sqlx::query_scalar("SELECT email FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// `register_ios_device`: upsert keyed by `ios_device_id`; a blank id is
    /// replaced server-side by a generated UUID.
    pub async fn register_ios_device(
        &self,
        ios_device_id: &str,
        user_id: Uuid,
        apns_token: &str,
        device_name: &str,
    ) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ios_devices (ios_device_id, user_id, apns_token, device_name, last_seen_at)
            VALUES (COALESCE(NULLIF($1, '')::uuid, gen_random_uuid()), $2, $3, $4, NOW())
            ON CONFLICT (ios_device_id) DO UPDATE
            SET user_id      = EXCLUDED.user_id,
                apns_token   = EXCLUDED.apns_token,
                device_name  = EXCLUDED.device_name,
                last_seen_at = NOW()
            "#,
        )
        .bind(ios_device_id)
        .bind(user_id)
        .bind(apns_token)
        .bind(device_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `find_ios_device_id`
    pub async fn find_ios_device_id(&self, apns_token: &str) -> sqlx::Result<Option<Uuid>> {
        sqlx::query_scalar("SELECT ios_device_id FROM ios_devices WHERE apns_token = $1")
            .bind(apns_token)
            .fetch_optional(&self.pool)
            .await
    }

    /// `bind_edge_user`: returns false when the binding already exists.
    pub async fn bind_edge_user(&self, serial_number: &str, user_id: Uuid) -> sqlx::Result<bool> {
        let done = sqlx::query(
            r#"
            INSERT INTO edge_users (edge_serial_number, user_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(serial_number)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    /// `unbind_edge_user`: idempotent delete.
    pub async fn unbind_edge_user(&self, serial_number: &str, user_id: Uuid) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            DELETE FROM edge_users
            WHERE edge_serial_number = $1
            AND   user_id = $2
            "#,
        )
        .bind(serial_number)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `find_user_pwdhash`
    pub async fn find_user_password_hash(&self, email: &str) -> sqlx::Result<Option<String>> {
        sqlx::query_scalar("SELECT user_password_hash FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    /// `find_user_edges`
    pub async fn find_user_edges(&self, user_id: Uuid) -> sqlx::Result<Vec<String>> {
        sqlx::query_scalar("SELECT edge_serial_number FROM edge_users WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    /// `reg_refretoken`: stores the SHA-256 of a freshly-issued refresh token
    /// with a 30-day expiry.
    pub async fn register_refresh_token(
        &self,
        refresh_token_hash: &str,
        user_id: Uuid,
    ) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO auth (refresh_token_hash, user_id, expires_at)
            VALUES ($1, $2, NOW() + INTERVAL '30 days')
            "#,
        )
        .bind(refresh_token_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `chk_refretoken`: the combined refresh-or-revoke statement. One atomic
    /// statement slides the expiry of a live record and revokes a matching
    /// expired one; a concurrent refresh racing expiry sees exactly one of
    /// the two outcomes.
    pub async fn check_and_refresh_token(
        &self,
        refresh_token_hash: &str,
    ) -> sqlx::Result<Option<Uuid>> {
        sqlx::query_scalar(
            r#"
            WITH upd AS (
                UPDATE auth
                SET    expires_at = NOW() + INTERVAL '30 days'
                WHERE  refresh_token_hash = $1
                  AND  revoked = FALSE
                  AND  expires_at > NOW()
                RETURNING user_id
            ), rev AS (
                UPDATE auth
                SET    revoked = TRUE
                WHERE  refresh_token_hash = $1
                  AND  revoked = FALSE
                  AND  expires_at <= NOW()
            )
            SELECT user_id FROM upd
            "#,
        )
        .bind(refresh_token_hash)
        .fetch_optional(&self.pool)
        .await
    }

    /// `revoke_refretoken`: unconditional; revoking an unknown hash is a
    /// no-op success.
    pub async fn revoke_refresh_token(&self, refresh_token_hash: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE auth SET revoked = TRUE WHERE refresh_token_hash = $1")
            .bind(refresh_token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
