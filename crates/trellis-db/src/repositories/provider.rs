//! Provider repository implementation

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use tracing::instrument;

use trellis_core::{
    Filter, Provider, ProviderId, ProviderKind, ProviderRepository, Result, TrellisError,
};

use super::filter::{push_conditions, push_window, Columns};
use super::{db_error, write_error};

const COLUMNS: Columns = Columns {
    id: Some("id"),
    name: Some("name"),
    provider_id: None,
    identity_id: None,
    expires_at: None,
    created_at: "created_at",
};

fn provider_from_row(row: &PgRow) -> Result<Provider> {
    let kind: String = row.get("kind");
    let kind: ProviderKind = kind
        .parse()
        .map_err(|_| TrellisError::database_error(format!("unknown provider kind '{}'", kind)))?;

    Ok(Provider {
        id: ProviderId::from_uuid(row.get("id")),
        name: row.get("name"),
        kind,
        url: row.get("url"),
        client_id: row.get("client_id"),
        client_secret: row.get("client_secret"),
        enabled: row.get("enabled"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// PostgreSQL implementation of ProviderRepository
pub struct PgProviderRepository {
    pool: PgPool,
}

impl PgProviderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderRepository for PgProviderRepository {
    #[instrument(skip(self, provider), fields(name = %provider.name, kind = %provider.kind))]
    async fn create(&self, provider: &Provider) -> Result<Provider> {
        sqlx::query(
            r#"
            INSERT INTO providers (id, name, kind, url, client_id, client_secret, enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(provider.id.as_uuid())
        .bind(&provider.name)
        .bind(provider.kind.as_str())
        .bind(&provider.url)
        .bind(&provider.client_id)
        .bind(&provider.client_secret)
        .bind(provider.enabled)
        .bind(provider.created_at)
        .bind(provider.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "provider", &provider.name))?;

        Ok(provider.clone())
    }

    #[instrument(skip(self))]
    async fn find(&self, filter: &Filter) -> Result<Option<Provider>> {
        Ok(self.list(filter).await?.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &Filter) -> Result<Vec<Provider>> {
        let mut qb = QueryBuilder::new(
            "SELECT id, name, kind, url, client_id, client_secret, enabled, created_at, updated_at \
             FROM providers WHERE TRUE",
        );
        push_conditions(&mut qb, filter, &COLUMNS);
        push_window(&mut qb, filter, &COLUMNS);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(provider_from_row).collect()
    }

    #[instrument(skip(self, provider), fields(id = %provider.id))]
    async fn update(&self, provider: &Provider) -> Result<Provider> {
        let mut updated = provider.clone();
        updated.updated_at = chrono::Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE providers
            SET name = $1, kind = $2, url = $3, client_id = $4, client_secret = $5,
                enabled = $6, updated_at = $7
            WHERE id = $8
            "#,
        )
        .bind(&updated.name)
        .bind(updated.kind.as_str())
        .bind(&updated.url)
        .bind(&updated.client_id)
        .bind(&updated.client_secret)
        .bind(updated.enabled)
        .bind(updated.updated_at)
        .bind(updated.id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "provider", &updated.name))?;

        if result.rows_affected() == 0 {
            return Err(TrellisError::not_found("provider", updated.id.to_string()));
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: ProviderId) -> Result<()> {
        let result = sqlx::query("DELETE FROM providers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(TrellisError::not_found("provider", id.to_string()));
        }
        Ok(())
    }
}
