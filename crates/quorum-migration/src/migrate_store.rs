use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use bon::Builder;
use mockall::automock;
use tracing::instrument;

use crate::migration::Direction;
use crate::schema::Change;
use crate::{Revision, applied_revision::AppliedRevision};

/// The interface the migration runner drives, one call per revision so every
/// step commits or rolls back on its own.
#[allow(async_fn_in_trait)]
#[automock]
pub trait RevisionStore {
    async fn applied_revisions(&self) -> Result<Vec<AppliedRevision>>;
    async fn apply(&self, revision: &Revision) -> Result<()>;
    async fn revert(&self, revision: &Revision) -> Result<()>;
}

/// The rendered statements of one revision step. Storage runs them and then
/// records or removes `revision` in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionBatch {
    pub revision: String,
    pub direction: Direction,
    pub statements: Vec<String>,
}

impl RevisionBatch {
    pub fn sql(&self) -> String {
        self.statements.join("\n;\n")
    }
}

/// Low level access to the database holding the revisions
#[automock(type Row=String;)]
#[allow(async_fn_in_trait)]
pub trait RevisionStorage {
    type Row;

    async fn query_applied(&self) -> Result<Vec<Self::Row>>;
    /// Execute the batch and its bookkeeping inside a single transaction, the
    /// bookkeeping must touch exactly one row or the batch rolls back
    async fn execute(&self, batch: &RevisionBatch) -> Result<()>;
}

/// Renders revisions into SQL batches and hands them to a [RevisionStorage]
#[derive(Clone, Builder)]
pub struct RevisionDatabase<S> {
    #[builder(with = |storage: S| Arc::new(storage))]
    storage: Arc<S>,
}

impl<S> RevisionDatabase<S>
where
    S: RevisionStorage,
{
    async fn run(&self, revision: &Revision, direction: Direction) -> Result<()> {
        let changes = match direction {
            Direction::Apply => revision.apply(),
            Direction::Revert => revision.revert(),
        };
        let batch = RevisionBatch {
            revision: revision.revision().to_owned(),
            direction,
            statements: render(changes),
        };
        tracing::debug!(
            revision = revision.revision(),
            statements = ?batch.statements,
            "{direction} revision"
        );

        match self.storage.execute(&batch).await {
            Ok(_) => {
                tracing::info!(revision = revision.revision(), "{direction} succeeded");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = format!("{e:#}"),
                    revision = revision.revision(),
                    statements = ?batch.statements,
                    "{direction} failed",
                );
                Err(e)
            }
        }
    }
}

fn render(changes: &[Change]) -> Vec<String> {
    changes
        .iter()
        .map(Change::to_sql)
        .filter(|statement| !statement.is_empty())
        .collect()
}

impl<S> RevisionStore for RevisionDatabase<S>
where
    S: RevisionStorage,
    S::Row: TryInto<AppliedRevision>,
    <S::Row as TryInto<AppliedRevision>>::Error: ToString,
{
    /// Queries the revisions from the storage layer and converts them
    /// into a collection of [AppliedRevision]
    #[instrument(level = "info", skip_all)]
    async fn applied_revisions(&self) -> Result<Vec<AppliedRevision>> {
        let revisions = self
            .storage
            .query_applied()
            .await
            .with_context(|| "failed to query applied revisions")?;

        let revisions = revisions
            .into_iter()
            .map(|row| {
                row.try_into()
                    .map_err(|e| anyhow!("failed to convert row: {}", e.to_string()))
            })
            .collect::<std::result::Result<Vec<AppliedRevision>, _>>()?;

        Ok(revisions)
    }

    #[instrument(level = "debug", skip_all, fields(revision = revision.revision()))]
    async fn apply(&self, revision: &Revision) -> Result<()> {
        self.run(revision, Direction::Apply).await
    }

    #[instrument(level = "debug", skip_all, fields(revision = revision.revision()))]
    async fn revert(&self, revision: &Revision) -> Result<()> {
        self.run(revision, Direction::Revert).await
    }
}
