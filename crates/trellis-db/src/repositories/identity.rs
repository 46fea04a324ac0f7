//! Identity repository implementation

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use tracing::instrument;

use trellis_core::{Filter, Identity, IdentityId, IdentityRepository, Result, TrellisError};

use super::filter::{push_conditions, push_window, Columns};
use super::membership::load_groups;
use super::{db_error, write_error};

const COLUMNS: Columns = Columns {
    id: Some("id"),
    name: Some("name"),
    provider_id: None,
    identity_id: None,
    expires_at: None,
    created_at: "created_at",
};

fn identity_from_row(row: &PgRow) -> Identity {
    Identity {
        id: IdentityId::from_uuid(row.get("id")),
        name: row.get("name"),
        groups: vec![],
        last_seen_at: row.get("last_seen_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    }
}

/// PostgreSQL implementation of IdentityRepository
pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    #[instrument(skip(self, identity), fields(name = %identity.name))]
    async fn create(&self, identity: &Identity) -> Result<Identity> {
        sqlx::query(
            r#"
            INSERT INTO identities (id, name, last_seen_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(identity.id.as_uuid())
        .bind(&identity.name)
        .bind(identity.last_seen_at)
        .bind(identity.created_at)
        .bind(identity.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "identity", &identity.name))?;

        Ok(identity.clone())
    }

    #[instrument(skip(self))]
    async fn find(&self, filter: &Filter) -> Result<Option<Identity>> {
        Ok(self.list(filter).await?.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &Filter) -> Result<Vec<Identity>> {
        let mut qb = QueryBuilder::new(
            "SELECT id, name, last_seen_at, created_at, updated_at, deleted_at \
             FROM identities WHERE deleted_at IS NULL",
        );
        push_conditions(&mut qb, filter, &COLUMNS);
        push_window(&mut qb, filter, &COLUMNS);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        let mut identities = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut identity = identity_from_row(row);
            identity.groups = load_groups(&self.pool, identity.id).await?;
            identities.push(identity);
        }
        Ok(identities)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: IdentityId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE identities
            SET deleted_at = now(), updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(TrellisError::not_found("identity", id.to_string()));
        }
        Ok(())
    }
}
