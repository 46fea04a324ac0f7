//! Group repository implementation

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use tracing::instrument;

use trellis_core::{Filter, Group, GroupId, GroupRepository, Result, TrellisError};

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

pub(crate) fn group_from_row(row: &PgRow) -> Group {
    Group {
        id: GroupId::from_uuid(row.get("id")),
        name: row.get("name"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// PostgreSQL implementation of GroupRepository
pub struct PgGroupRepository {
    pool: PgPool,
}

impl PgGroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupRepository for PgGroupRepository {
    #[instrument(skip(self, group), fields(name = %group.name))]
    async fn create(&self, group: &Group) -> Result<Group> {
        sqlx::query(
            r#"
            INSERT INTO groups (id, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(group.id.as_uuid())
        .bind(&group.name)
        .bind(group.created_at)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "group", &group.name))?;

        Ok(group.clone())
    }

    #[instrument(skip(self))]
    async fn find(&self, filter: &Filter) -> Result<Option<Group>> {
        Ok(self.list(filter).await?.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &Filter) -> Result<Vec<Group>> {
        let mut qb = QueryBuilder::new(
            "SELECT id, name, created_at, updated_at FROM groups WHERE TRUE",
        );
        push_conditions(&mut qb, filter, &COLUMNS);
        push_window(&mut qb, filter, &COLUMNS);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(rows.iter().map(group_from_row).collect())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: GroupId) -> Result<()> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(TrellisError::not_found("group", id.to_string()));
        }
        Ok(())
    }
}
