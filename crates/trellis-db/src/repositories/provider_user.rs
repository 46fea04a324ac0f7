//! Provider user repository implementation

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use tracing::instrument;

use trellis_core::{
    Filter, IdentityId, ProviderId, ProviderUser, ProviderUserRepository, Result, TokenBundle,
    TrellisError,
};

use super::filter::{push_conditions, push_window, Columns};
use super::{db_error, write_error};

const COLUMNS: Columns = Columns {
    id: None,
    name: None,
    provider_id: Some("provider_id"),
    identity_id: Some("identity_id"),
    expires_at: Some("expires_at"),
    created_at: "created_at",
};

const SELECT: &str = "SELECT identity_id, provider_id, email, groups, access_token, \
     refresh_token, expires_at, last_update, created_at FROM provider_users";

fn provider_user_from_row(row: &PgRow) -> ProviderUser {
    let groups: Vec<String> = row.get("groups");
    ProviderUser {
        identity_id: IdentityId::from_uuid(row.get("identity_id")),
        provider_id: ProviderId::from_uuid(row.get("provider_id")),
        email: row.get("email"),
        groups: groups.into_iter().collect(),
        tokens: TokenBundle {
            access_token: row.get("access_token"),
            refresh_token: row.get("refresh_token"),
            expires_at: row.get("expires_at"),
        },
        last_update: row.get("last_update"),
        created_at: row.get("created_at"),
    }
}

fn link_key(identity_id: IdentityId, provider_id: ProviderId) -> String {
    format!("{}/{}", identity_id, provider_id)
}

/// PostgreSQL implementation of ProviderUserRepository
pub struct PgProviderUserRepository {
    pool: PgPool,
}

impl PgProviderUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderUserRepository for PgProviderUserRepository {
    #[instrument(skip(self, provider_user), fields(
        identity_id = %provider_user.identity_id,
        provider_id = %provider_user.provider_id,
    ))]
    async fn create(&self, provider_user: &ProviderUser) -> Result<ProviderUser> {
        let groups: Vec<String> = provider_user.groups.iter().cloned().collect();

        sqlx::query(
            r#"
            INSERT INTO provider_users
                (identity_id, provider_id, email, groups, access_token, refresh_token,
                 expires_at, last_update, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(provider_user.identity_id.as_uuid())
        .bind(provider_user.provider_id.as_uuid())
        .bind(&provider_user.email)
        .bind(&groups)
        .bind(&provider_user.tokens.access_token)
        .bind(&provider_user.tokens.refresh_token)
        .bind(provider_user.tokens.expires_at)
        .bind(provider_user.last_update)
        .bind(provider_user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            write_error(
                e,
                "provider_user",
                &link_key(provider_user.identity_id, provider_user.provider_id),
            )
        })?;

        Ok(provider_user.clone())
    }

    #[instrument(skip(self))]
    async fn find(
        &self,
        identity_id: IdentityId,
        provider_id: ProviderId,
    ) -> Result<Option<ProviderUser>> {
        let sql = format!("{} WHERE identity_id = $1 AND provider_id = $2", SELECT);
        let row = sqlx::query(&sql)
            .bind(identity_id.as_uuid())
            .bind(provider_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(row.as_ref().map(provider_user_from_row))
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &Filter) -> Result<Vec<ProviderUser>> {
        let mut qb = QueryBuilder::new(SELECT);
        qb.push(" WHERE TRUE");
        push_conditions(&mut qb, filter, &COLUMNS);
        push_window(&mut qb, filter, &COLUMNS);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(rows.iter().map(provider_user_from_row).collect())
    }

    #[instrument(skip(self, tokens))]
    async fn update_tokens(
        &self,
        identity_id: IdentityId,
        provider_id: ProviderId,
        tokens: &TokenBundle,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE provider_users
            SET access_token = $1, refresh_token = $2, expires_at = $3, last_update = now()
            WHERE identity_id = $4 AND provider_id = $5
            "#,
        )
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.expires_at)
        .bind(identity_id.as_uuid())
        .bind(provider_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(TrellisError::not_found(
                "provider_user",
                link_key(identity_id, provider_id),
            ));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, identity_id: IdentityId, provider_id: ProviderId) -> Result<()> {
        let result =
            sqlx::query("DELETE FROM provider_users WHERE identity_id = $1 AND provider_id = $2")
                .bind(identity_id.as_uuid())
                .bind(provider_id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(TrellisError::not_found(
                "provider_user",
                link_key(identity_id, provider_id),
            ));
        }
        Ok(())
    }
}
