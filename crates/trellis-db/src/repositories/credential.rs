//! Credential repository implementation

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use trellis_core::{
    Credential, CredentialId, CredentialRepository, IdentityId, Result, TrellisError,
};

use super::{db_error, write_error};

fn credential_from_row(row: &PgRow) -> Credential {
    Credential {
        id: CredentialId::from_uuid(row.get("id")),
        identity_id: IdentityId::from_uuid(row.get("identity_id")),
        password_hash: row.get("password_hash"),
        one_time_password: row.get("one_time_password"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// PostgreSQL implementation of CredentialRepository
pub struct PgCredentialRepository {
    pool: PgPool,
}

impl PgCredentialRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepository for PgCredentialRepository {
    #[instrument(skip(self, credential), fields(identity_id = %credential.identity_id))]
    async fn create(&self, credential: &Credential) -> Result<Credential> {
        sqlx::query(
            r#"
            INSERT INTO credentials (id, identity_id, password_hash, one_time_password, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(credential.id.as_uuid())
        .bind(credential.identity_id.as_uuid())
        .bind(&credential.password_hash)
        .bind(credential.one_time_password)
        .bind(credential.created_at)
        .bind(credential.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "credential", &credential.identity_id.to_string()))?;

        Ok(credential.clone())
    }

    #[instrument(skip(self))]
    async fn find_by_identity(&self, identity_id: IdentityId) -> Result<Option<Credential>> {
        let row = sqlx::query(
            r#"
            SELECT id, identity_id, password_hash, one_time_password, created_at, updated_at
            FROM credentials
            WHERE identity_id = $1
            "#,
        )
        .bind(identity_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.as_ref().map(credential_from_row))
    }

    #[instrument(skip(self, credential), fields(identity_id = %credential.identity_id))]
    async fn update(&self, credential: &Credential) -> Result<Credential> {
        let mut updated = credential.clone();
        updated.updated_at = chrono::Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE credentials
            SET password_hash = $1, one_time_password = $2, updated_at = $3
            WHERE identity_id = $4
            "#,
        )
        .bind(&updated.password_hash)
        .bind(updated.one_time_password)
        .bind(updated.updated_at)
        .bind(updated.identity_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(TrellisError::not_found(
                "credential",
                updated.identity_id.to_string(),
            ));
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn delete(&self, identity_id: IdentityId) -> Result<()> {
        let result = sqlx::query("DELETE FROM credentials WHERE identity_id = $1")
            .bind(identity_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(TrellisError::not_found("credential", identity_id.to_string()));
        }
        Ok(())
    }
}
