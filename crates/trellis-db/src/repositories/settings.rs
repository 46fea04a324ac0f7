//! Settings repository implementation

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use tracing::instrument;

use trellis_core::{Result, Settings, SettingsRepository};

use super::{count_from_db, db_error};

/// PostgreSQL implementation of SettingsRepository. The table holds at most
/// one row.
pub struct PgSettingsRepository {
    pool: PgPool,
}

impl PgSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn count_to_db(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl SettingsRepository for PgSettingsRepository {
    #[instrument(skip(self))]
    async fn get(&self) -> Result<Settings> {
        let row = sqlx::query(
            r#"
            SELECT length_min, lowercase_min, uppercase_min, number_min, symbol_min, updated_at
            FROM settings
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(match row {
            Some(row) => Settings {
                length_min: count_from_db(row.get("length_min")),
                lowercase_min: count_from_db(row.get("lowercase_min")),
                uppercase_min: count_from_db(row.get("uppercase_min")),
                number_min: count_from_db(row.get("number_min")),
                symbol_min: count_from_db(row.get("symbol_min")),
                updated_at: row.get("updated_at"),
            },
            None => Settings::default(),
        })
    }

    #[instrument(skip(self))]
    async fn save(&self, settings: &Settings) -> Result<Settings> {
        let mut saved = settings.clone();
        saved.updated_at = Some(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO settings (id, length_min, lowercase_min, uppercase_min, number_min, symbol_min, updated_at)
            VALUES (1, $1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET length_min = EXCLUDED.length_min,
                lowercase_min = EXCLUDED.lowercase_min,
                uppercase_min = EXCLUDED.uppercase_min,
                number_min = EXCLUDED.number_min,
                symbol_min = EXCLUDED.symbol_min,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(count_to_db(saved.length_min))
        .bind(count_to_db(saved.lowercase_min))
        .bind(count_to_db(saved.uppercase_min))
        .bind(count_to_db(saved.number_min))
        .bind(count_to_db(saved.symbol_min))
        .bind(saved.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(saved)
    }
}
