use std::fmt::Display;

use bon::bon;
use thiserror::Error;
use tracing::instrument;

use super::revision_list::{RevisionList, RevisionStatus};
use crate::Revision;
use crate::applied_revision::AppliedRevision;
use crate::chain::RevisionChain;
use crate::migrate_store::RevisionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Apply,
    Revert,
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Apply => f.write_str("apply"),
            Direction::Revert => f.write_str("revert"),
        }
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to retrieve applied revisions: {0:#}")]
    Store(#[source] anyhow::Error),
    #[error("applied revision '{0}' is not part of the revision chain")]
    UnknownApplied(String),
    #[error("revision '{missing}' is missing below the applied revision '{pointer}'")]
    Gap { missing: String, pointer: String },
    #[error("unknown revision '{0}'")]
    UnknownRevision(String),
    #[error("revision '{target}' is already applied, the database is at '{pointer}'")]
    AlreadyApplied { target: String, pointer: String },
    #[error("revision '{target}' is not applied, the database is at {}", pointer_name(.pointer))]
    NotApplied {
        target: String,
        pointer: Option<String>,
    },
    #[error("cannot revert {requested} revision(s), only {applied} are applied")]
    PastRoot { requested: usize, applied: usize },
    #[error("failed to {direction} '{revision}', the database is at {}: {source:#}", pointer_name(.pointer))]
    StepFailed {
        revision: String,
        direction: Direction,
        /// The last revision still applied once the failed step rolled back
        pointer: Option<String>,
        #[source]
        source: anyhow::Error,
    },
}

fn pointer_name(pointer: &Option<String>) -> String {
    match pointer {
        Some(revision) => format!("'{revision}'"),
        None => String::from("the base"),
    }
}

/// Runs a [RevisionChain] against a [RevisionStore].
///
/// The applied revisions must always be a gap-free prefix of the chain, the
/// last of them is the current revision pointer.
pub struct Migration<S> {
    store: S,
    chain: RevisionChain,
}

#[bon]
impl<S> Migration<S>
where
    S: RevisionStore,
{
    #[builder]
    pub fn new(store: S, chain: RevisionChain) -> Self {
        Self { store, chain }
    }

    pub fn chain(&self) -> &RevisionChain {
        &self.chain
    }

    async fn applied(&self) -> Result<Vec<AppliedRevision>, MigrationError> {
        self.store
            .applied_revisions()
            .await
            .map_err(MigrationError::Store)
    }

    /// Number of chain revisions applied, validating they form a prefix
    fn applied_count(&self, applied: &[AppliedRevision]) -> Result<usize, MigrationError> {
        if let Some(unknown) = applied
            .iter()
            .find(|revision| self.chain.position(revision.revision()).is_none())
        {
            return Err(MigrationError::UnknownApplied(unknown.revision().to_owned()));
        }

        let count = applied.len();
        if let Some(missing) = self
            .chain
            .iter()
            .take(count)
            .find(|revision| !applied.contains_revision(revision.revision()))
        {
            let pointer = applied
                .iter()
                .filter_map(|revision| self.chain.position(revision.revision()))
                .max()
                .map(|index| self.chain.revisions()[index].revision().to_owned())
                .unwrap_or_default();
            return Err(MigrationError::Gap {
                missing: missing.revision().to_owned(),
                pointer,
            });
        }

        Ok(count)
    }

    fn pointer_at(&self, count: usize) -> Option<&'static Revision> {
        count
            .checked_sub(1)
            .and_then(|index| self.chain.revisions().get(index).copied())
    }

    /// The revision the database is currently at, `None` before the root
    #[instrument(level = "debug", skip_all)]
    pub async fn current(&self) -> Result<Option<&'static Revision>, MigrationError> {
        let applied = self.applied().await?;
        let count = self.applied_count(&applied)?;
        Ok(self.pointer_at(count))
    }

    /// Applied revisions in chain order, with the time they were applied
    pub async fn history(&self) -> Result<Vec<AppliedRevision>, MigrationError> {
        let mut applied = self.applied().await?;
        self.applied_count(&applied)?;
        applied.sort_by_key(|revision| self.chain.position(revision.revision()));
        Ok(applied)
    }

    #[instrument(level = "info", skip_all, fields(revisions = self.chain.revisions().revision_list()))]
    pub async fn needs_migration(&self) -> Result<bool, MigrationError> {
        let current = self.current().await?.map(Revision::revision);
        Ok(current != self.chain.head().map(Revision::revision))
    }

    /// Apply everything up to the head of the chain
    #[instrument(level = "info", skip_all, fields(revisions = self.chain.revisions().revision_list()))]
    pub async fn upgrade(&self) -> Result<usize, MigrationError> {
        match self.chain.head() {
            Some(head) => self.apply_to(head.revision()).await,
            None => {
                tracing::info!("no revisions declared");
                Ok(0)
            }
        }
    }

    /// Walk forward from the current revision to `target`, applying each step
    #[instrument(level = "info", skip(self))]
    pub async fn apply_to(&self, target: &str) -> Result<usize, MigrationError> {
        let target_index = self
            .chain
            .position(target)
            .ok_or_else(|| MigrationError::UnknownRevision(target.to_owned()))?;

        let applied = self.applied().await?;
        let count = self.applied_count(&applied)?;

        if target_index + 1 < count {
            return Err(MigrationError::AlreadyApplied {
                target: target.to_owned(),
                pointer: self
                    .pointer_at(count)
                    .map(|revision| revision.revision().to_owned())
                    .unwrap_or_default(),
            });
        }

        let to_apply = &self.chain.revisions()[count..=target_index];
        if to_apply.is_empty() {
            tracing::info!("database has all required revisions");
            return Ok(0);
        }

        tracing::debug!(
            "preparing to apply migration applied={}, needed={}",
            applied.revision_status(),
            to_apply.revision_list(),
        );

        for (offset, revision) in to_apply.iter().enumerate() {
            if let Err(source) = self.store.apply(revision).await {
                let pointer = self
                    .pointer_at(count + offset)
                    .map(|revision| revision.revision().to_owned());
                tracing::error!(
                    revision = revision.revision(),
                    pointer = ?pointer,
                    "failed to apply revision: {source:#}"
                );
                return Err(MigrationError::StepFailed {
                    revision: revision.revision().to_owned(),
                    direction: Direction::Apply,
                    pointer,
                    source,
                });
            }
        }

        tracing::info!(
            revisions = to_apply.revision_list(),
            "successfully applied {} revision(s)",
            to_apply.len()
        );
        Ok(to_apply.len())
    }

    /// Walk backward from the current revision until `target` is the current
    /// revision, `None` reverts the whole chain
    #[instrument(level = "info", skip(self))]
    pub async fn revert_to(&self, target: Option<&str>) -> Result<usize, MigrationError> {
        let keep = match target {
            Some(target) => {
                self.chain
                    .position(target)
                    .ok_or_else(|| MigrationError::UnknownRevision(target.to_owned()))?
                    + 1
            }
            None => 0,
        };

        let applied = self.applied().await?;
        let count = self.applied_count(&applied)?;

        if keep > count {
            return Err(MigrationError::NotApplied {
                target: target.unwrap_or_default().to_owned(),
                pointer: self
                    .pointer_at(count)
                    .map(|revision| revision.revision().to_owned()),
            });
        }

        self.revert_range(keep, count).await
    }

    /// Revert the last `revisions` applied revisions, all of them when `None`
    #[instrument(level = "info", skip(self))]
    pub async fn downgrade(&self, revisions: Option<usize>) -> Result<usize, MigrationError> {
        let applied = self.applied().await?;
        let count = self.applied_count(&applied)?;
        let requested = revisions.unwrap_or(count);

        let Some(keep) = count.checked_sub(requested) else {
            return Err(MigrationError::PastRoot {
                requested,
                applied: count,
            });
        };

        self.revert_range(keep, count).await
    }

    async fn revert_range(&self, keep: usize, count: usize) -> Result<usize, MigrationError> {
        let to_revert = &self.chain.revisions()[keep..count];
        if to_revert.is_empty() {
            tracing::info!("no revisions to revert");
            return Ok(0);
        }

        tracing::debug!("preparing to revert {} revision(s)", to_revert.len());

        for revision in to_revert.iter().rev() {
            if let Err(source) = self.store.revert(revision).await {
                tracing::error!(
                    revision = revision.revision(),
                    "failed to revert revision: {source:#}"
                );
                return Err(MigrationError::StepFailed {
                    revision: revision.revision().to_owned(),
                    direction: Direction::Revert,
                    pointer: Some(revision.revision().to_owned()),
                    source,
                });
            }
        }

        tracing::info!(
            revisions = to_revert.revision_list(),
            remaining = self.chain.revisions()[..keep].revision_list(),
            "reverted {} revision(s)",
            to_revert.len()
        );
        Ok(to_revert.len())
    }

    /// Revert every applied revision and then apply the whole chain again,
    /// this throws away all data held in the migrated tables
    #[instrument(level = "info", skip_all, fields(revisions = self.chain.revisions().revision_list()))]
    pub async fn reset(&self) -> Result<(), MigrationError> {
        let reverted = self.downgrade(None).await?;
        let applied = self.upgrade().await?;
        tracing::info!("reset database, reverted {reverted} and applied {applied} revision(s)");
        Ok(())
    }
}
