//! Membership repository implementation

use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use tracing::{debug, instrument};
use uuid::Uuid;

use trellis_core::{
    Group, GroupId, IdentityId, MembershipRepository, Result, SyncCommit, TrellisError,
};

use super::group::group_from_row;
use super::{db_error, write_error};

pub(crate) async fn load_groups<'e, E>(executor: E, identity_id: IdentityId) -> Result<Vec<Group>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query(
        r#"
        SELECT g.id, g.name, g.created_at, g.updated_at
        FROM groups g
        JOIN identity_groups ig ON ig.group_id = g.id
        WHERE ig.identity_id = $1
        ORDER BY g.name
        "#,
    )
    .bind(identity_id.into_uuid())
    .fetch_all(executor)
    .await
    .map_err(db_error)?;

    Ok(rows.iter().map(group_from_row).collect())
}

/// PostgreSQL implementation of MembershipRepository
pub struct PgMembershipRepository {
    pool: PgPool,
}

impl PgMembershipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipRepository for PgMembershipRepository {
    #[instrument(skip(self))]
    async fn groups_of(&self, identity_id: IdentityId) -> Result<Vec<Group>> {
        load_groups(&self.pool, identity_id).await
    }

    #[instrument(skip(self))]
    async fn add_membership(&self, identity_id: IdentityId, group_id: GroupId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO identity_groups (identity_id, group_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(identity_id.as_uuid())
        .bind(group_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "membership", &format!("{}/{}", identity_id, group_id)))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_membership(&self, identity_id: IdentityId, group_id: GroupId) -> Result<()> {
        sqlx::query("DELETE FROM identity_groups WHERE identity_id = $1 AND group_id = $2")
            .bind(identity_id.as_uuid())
            .bind(group_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(())
    }

    #[instrument(skip(self, commit), fields(
        identity_id = %commit.identity_id,
        provider_id = %commit.provider_user.provider_id,
        added = commit.add.len(),
        removed = commit.remove.len(),
    ))]
    async fn commit_sync(&self, commit: &SyncCommit) -> Result<()> {
        let identity_key = commit.identity_id.to_string();
        let add: Vec<Uuid> = commit.add.iter().map(|id| id.into_uuid()).collect();
        let remove: Vec<Uuid> = commit.remove.iter().map(|id| id.into_uuid()).collect();
        let pu = &commit.provider_user;
        let snapshot: Vec<String> = pu.groups.iter().cloned().collect();

        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let touched = sqlx::query(
            r#"
            UPDATE identities
            SET last_seen_at = $1, updated_at = now()
            WHERE id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(commit.last_seen_at)
        .bind(commit.identity_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if touched.rows_affected() == 0 {
            return Err(TrellisError::not_found("identity", identity_key));
        }

        if !add.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO identity_groups (identity_id, group_id)
                SELECT $1, UNNEST($2::uuid[])
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(commit.identity_id.as_uuid())
            .bind(&add)
            .execute(&mut *tx)
            .await
            .map_err(|e| write_error(e, "group", &identity_key))?;
        }

        if !remove.is_empty() {
            sqlx::query("DELETE FROM identity_groups WHERE identity_id = $1 AND group_id = ANY($2)")
                .bind(commit.identity_id.as_uuid())
                .bind(&remove)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }

        sqlx::query(
            r#"
            INSERT INTO provider_users
                (identity_id, provider_id, email, groups, access_token, refresh_token,
                 expires_at, last_update, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (identity_id, provider_id) DO UPDATE
            SET email = EXCLUDED.email,
                groups = EXCLUDED.groups,
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                last_update = EXCLUDED.last_update
            "#,
        )
        .bind(pu.identity_id.as_uuid())
        .bind(pu.provider_id.as_uuid())
        .bind(&pu.email)
        .bind(&snapshot)
        .bind(&pu.tokens.access_token)
        .bind(&pu.tokens.refresh_token)
        .bind(pu.tokens.expires_at)
        .bind(pu.last_update)
        .bind(pu.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, "provider", &pu.provider_id.to_string()))?;

        tx.commit().await.map_err(db_error)?;

        debug!("Committed provider sync");
        Ok(())
    }
}
