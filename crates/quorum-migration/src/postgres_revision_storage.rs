use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio::sync::OnceCell;
use tokio_postgres::Row;
use tracing::instrument;

use crate::applied_revision::AppliedRevision;
use crate::migrate_store::{RevisionBatch, RevisionStorage};
use crate::migration::Direction;

/// [RevisionStorage] backed by a deadpool postgres pool, the applied revisions
/// live in the `migrations` table.
pub struct PostgresRevisionStorage {
    pool: Pool,
    ensure_table: OnceCell<Result<()>>,
}

impl PostgresRevisionStorage {
    pub fn new(pool: &Pool) -> Self {
        Self {
            pool: pool.clone(),
            ensure_table: OnceCell::new(),
        }
    }

    async fn ensure_migrations_table(&self) -> Result<()> {
        self.ensure_table
            .get_or_init(|| async move {
                self.pool
                    .get()
                    .await?
                    .batch_execute(
                        r#"
                        CREATE TABLE IF NOT EXISTS migrations (
                            id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
                            rev TEXT NOT NULL UNIQUE,
                            timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
                        )
                        "#,
                    )
                    .await
                    .with_context(|| "failed to ensure the migration table")?;
                Ok(())
            })
            .await
            .as_ref()
            .map(|_| ())
            .map_err(|e| anyhow!("failed to ensure 'migrations': {e}"))
    }
}

impl RevisionStorage for PostgresRevisionStorage {
    type Row = tokio_postgres::Row;

    #[instrument(level = "debug", skip_all)]
    async fn query_applied(&self) -> Result<Vec<Self::Row>> {
        self.ensure_migrations_table().await?;

        self.pool
            .get()
            .await?
            .query("SELECT rev, timestamp FROM migrations ORDER BY id", &[])
            .await
            .with_context(|| "failed to query the migrations table")
    }

    #[instrument(level = "debug", skip_all, fields(revision = %batch.revision, direction = %batch.direction))]
    async fn execute(&self, batch: &RevisionBatch) -> Result<()> {
        self.ensure_migrations_table().await?;

        let mut client = self.pool.get().await?;
        let transaction = client.transaction().await?;

        if !batch.statements.is_empty() {
            transaction
                .batch_execute(&batch.sql())
                .await
                .with_context(|| format!("failed to {} '{}'", batch.direction, batch.revision))?;
        }

        let recorded = match batch.direction {
            Direction::Apply => {
                transaction
                    .execute(
                        "INSERT INTO migrations (rev) VALUES ($1) ON CONFLICT (rev) DO NOTHING",
                        &[&batch.revision],
                    )
                    .await
            }
            Direction::Revert => {
                transaction
                    .execute("DELETE FROM migrations WHERE rev = $1", &[&batch.revision])
                    .await
            }
        }
        .with_context(|| format!("failed to record '{}'", batch.revision))?;

        // returning before commit drops the transaction and rolls the batch back
        if recorded != 1 {
            bail!(
                "'{}' {} in the migrations table, refusing to {} it",
                batch.revision,
                match batch.direction {
                    Direction::Apply => "is already recorded",
                    Direction::Revert => "is not recorded",
                },
                batch.direction
            );
        }

        transaction
            .commit()
            .await
            .with_context(|| "failed to commit transaction")?;

        Ok(())
    }
}

impl TryFrom<Row> for AppliedRevision {
    type Error = anyhow::Error;

    fn try_from(value: Row) -> std::result::Result<Self, Self::Error> {
        let revision: String = value.try_get(0)?;
        let timestamp: DateTime<Utc> = value.try_get(1)?;

        Ok(AppliedRevision::builder()
            .revision(revision)
            .timestamp(timestamp)
            .build())
    }
}
