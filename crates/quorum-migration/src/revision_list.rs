use super::Revision;
use crate::applied_revision::AppliedRevision;

/// Anything that names a revision
pub trait Revisioned {
    fn revision_id(&self) -> &str;
}

impl Revisioned for Revision {
    fn revision_id(&self) -> &str {
        self.revision()
    }
}

impl Revisioned for &Revision {
    fn revision_id(&self) -> &str {
        self.revision()
    }
}

impl Revisioned for AppliedRevision {
    fn revision_id(&self) -> &str {
        self.revision()
    }
}

/// Formatting and lookup helpers over a list of revisions, used mostly to give
/// the tracing output a compact `[a;b;c]` field.
pub trait RevisionList {
    fn revision_list(&self) -> String;
    fn contains_revision(&self, revision: &str) -> bool;
}

pub trait RevisionStatus {
    fn revision_status(&self) -> String;
}

impl<T> RevisionList for [T]
where
    T: Revisioned,
{
    fn revision_list(&self) -> String {
        format!(
            "[{}]",
            self.iter()
                .map(|revision| revision.revision_id().replace([' ', '\t', '\r', '\n'], "_"))
                .collect::<Vec<String>>()
                .join(";")
        )
    }

    fn contains_revision(&self, revision: &str) -> bool {
        self.iter().any(|rev| rev.revision_id() == revision)
    }
}

impl RevisionStatus for [AppliedRevision] {
    fn revision_status(&self) -> String {
        format!(
            "[{}]",
            self.iter()
                .map(AppliedRevision::revision_status)
                .collect::<Vec<String>>()
                .join(";")
        )
    }
}

impl RevisionStatus for AppliedRevision {
    fn revision_status(&self) -> String {
        format!(
            "{}@{}",
            self.revision().replace([' ', '\n', '\r'], "_"),
            self.applied_at().to_rfc3339()
        )
    }
}
