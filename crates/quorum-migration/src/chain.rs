use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::instrument;

use crate::Revision;
use crate::revision_list::RevisionList;
use crate::schema::{Schema, SchemaError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("revision '{0}' is declared more than once")]
    DuplicateRevision(&'static str),
    #[error("no revision is marked as the root")]
    NoRoot,
    #[error("more than one root revision: {0:?}")]
    MultipleRoots(Vec<&'static str>),
    #[error("revision '{revision}' revises unknown revision '{parent}'")]
    MissingPredecessor {
        revision: &'static str,
        parent: &'static str,
    },
    #[error("revisions '{first}' and '{second}' both revise '{parent}'")]
    Branch {
        parent: &'static str,
        first: &'static str,
        second: &'static str,
    },
    #[error("revision '{0}' is not reachable from the root")]
    Unreachable(&'static str),
    #[error("revision '{revision}' cannot be applied: {source}")]
    InvalidStep {
        revision: &'static str,
        #[source]
        source: SchemaError,
    },
    #[error("revision '{revision}' cannot be reverted: {source}")]
    InvalidRevert {
        revision: &'static str,
        #[source]
        source: SchemaError,
    },
    #[error("reverting revision '{0}' does not restore the previous schema")]
    NotReversible(&'static str),
}

/// A validated, linear chain of revisions ordered from root to head.
///
/// Construction replays every revision over the schema produced by the ones
/// before it, so a chain that exists has links, references and reverts that
/// are known to line up.
#[derive(Debug, Clone)]
pub struct RevisionChain {
    revisions: Vec<&'static Revision>,
    /// `snapshots[0]` is the empty schema, `snapshots[n]` the schema after `n` revisions
    snapshots: Vec<Schema>,
}

impl RevisionChain {
    #[instrument(level = "debug", skip_all, fields(revisions = revisions.revision_list()))]
    pub fn new(revisions: &'static [Revision]) -> Result<Self, ChainError> {
        let mut ids = HashSet::with_capacity(revisions.len());
        for revision in revisions {
            if !ids.insert(revision.revision()) {
                return Err(ChainError::DuplicateRevision(revision.revision()));
            }
        }

        if revisions.is_empty() {
            return Ok(Self {
                revisions: Vec::new(),
                snapshots: vec![Schema::default()],
            });
        }

        let roots = revisions
            .iter()
            .filter(|revision| revision.is_root())
            .collect::<Vec<&Revision>>();
        let root = match roots.as_slice() {
            [] => return Err(ChainError::NoRoot),
            [root] => *root,
            _ => {
                return Err(ChainError::MultipleRoots(
                    roots.iter().map(|root| root.revision()).collect(),
                ));
            }
        };

        let mut children: HashMap<&'static str, &'static Revision> = HashMap::new();
        for revision in revisions {
            let Some(parent) = revision.down_revision() else {
                continue;
            };
            if !ids.contains(parent) {
                return Err(ChainError::MissingPredecessor {
                    revision: revision.revision(),
                    parent,
                });
            }
            if let Some(first) = children.insert(parent, revision) {
                return Err(ChainError::Branch {
                    parent,
                    first: first.revision(),
                    second: revision.revision(),
                });
            }
        }

        let mut ordered = vec![root];
        while let Some(next) = ordered
            .last()
            .and_then(|current| children.get(current.revision()))
        {
            ordered.push(*next);
        }

        if let Some(orphan) = revisions
            .iter()
            .find(|revision| !ordered.contains_revision(revision.revision()))
        {
            return Err(ChainError::Unreachable(orphan.revision()));
        }

        let snapshots = Self::replay(&ordered)?;
        tracing::debug!(
            root = root.revision(),
            head = ordered.last().map(|head| head.revision()),
            "validated chain of {} revision(s)",
            ordered.len()
        );

        Ok(Self {
            revisions: ordered,
            snapshots,
        })
    }

    fn replay(ordered: &[&'static Revision]) -> Result<Vec<Schema>, ChainError> {
        let mut snapshots = Vec::with_capacity(ordered.len() + 1);
        snapshots.push(Schema::default());

        for revision in ordered {
            let before = snapshots.last().cloned().unwrap_or_default();

            let mut after = before.clone();
            for change in revision.apply() {
                after
                    .apply(change)
                    .map_err(|source| ChainError::InvalidStep {
                        revision: revision.revision(),
                        source,
                    })?;
            }

            let mut reverted = after.clone();
            for change in revision.revert() {
                reverted
                    .apply(change)
                    .map_err(|source| ChainError::InvalidRevert {
                        revision: revision.revision(),
                        source,
                    })?;
            }
            if reverted != before {
                return Err(ChainError::NotReversible(revision.revision()));
            }

            snapshots.push(after);
        }

        Ok(snapshots)
    }

    pub fn revisions(&self) -> &[&'static Revision] {
        &self.revisions
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'static Revision> + '_ {
        self.revisions.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn root(&self) -> Option<&'static Revision> {
        self.revisions.first().copied()
    }

    pub fn head(&self) -> Option<&'static Revision> {
        self.revisions.last().copied()
    }

    pub fn position(&self, revision: &str) -> Option<usize> {
        self.revisions
            .iter()
            .position(|candidate| candidate.revision() == revision)
    }

    pub fn get(&self, revision: &str) -> Option<&'static Revision> {
        self.position(revision).map(|index| self.revisions[index])
    }

    /// The schema once `revision` and everything before it is applied, `None`
    /// is the schema before the root
    pub fn snapshot_at(&self, revision: Option<&str>) -> Option<&Schema> {
        match revision {
            Some(revision) => self
                .position(revision)
                .and_then(|index| self.snapshots.get(index + 1)),
            None => self.snapshots.first(),
        }
    }

    pub fn head_snapshot(&self) -> &Schema {
        // never empty, index 0 always holds the base schema
        &self.snapshots[self.snapshots.len() - 1]
    }
}
