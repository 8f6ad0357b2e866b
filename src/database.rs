use std::str::FromStr;

use crate::config::Config;
use crate::migrations::DATABASE_REVISIONS;
use anyhow::{Context, Result};
use deadpool_postgres::{Manager, Pool};
use quorum_migration::{MigrationBuilder, RevisionChain, RevisionStatus};
use tokio_postgres::NoTls;
use tracing::instrument;

#[instrument(level = "info", skip_all)]
pub async fn initialize_database(config: &Config) -> Result<Pool> {
    let database_config = tokio_postgres::Config::from_str(&config.database_url)?;
    let pool = Pool::builder(Manager::new(database_config, NoTls))
        .max_size(config.max_connections)
        .build()
        .with_context(|| "failed to create the database pool")?;
    execute_migrations(config, &pool).await?;

    tracing::debug!("connected to database");
    Ok(pool)
}

async fn execute_migrations(config: &Config, database_pool: &Pool) -> Result<()> {
    let chain = RevisionChain::new(DATABASE_REVISIONS)
        .with_context(|| "the declared database revisions are invalid")?;

    let migration = MigrationBuilder::postgres()
        .database_pool(database_pool)
        .chain(chain)
        .build();

    if config.reset_database {
        migration
            .reset()
            .await
            .with_context(|| "failed to reset the database")?;
    } else if let Some(revisions) = config.revert_database {
        migration
            .downgrade(Some(revisions))
            .await
            .with_context(|| format!("failed to revert {revisions} revision(s)"))?;
    } else if let Some(target) = config.downgrade_target() {
        migration
            .revert_to(target)
            .await
            .with_context(|| format!("failed to downgrade to {}", target.unwrap_or("base")))?;
    } else if let Some(target) = config.upgrade_to.as_deref() {
        migration
            .apply_to(target)
            .await
            .with_context(|| format!("failed to upgrade to {target}"))?;
    } else {
        migration
            .upgrade()
            .await
            .with_context(|| "failed to execute upgrade")?;
    }

    tracing::info!(
        history = migration.history().await?.revision_status(),
        "database is at {}",
        migration
            .current()
            .await?
            .map(|revision| revision.revision())
            .unwrap_or("base")
    );

    Ok(())
}
