use bon::Builder;
use chrono::{DateTime, Utc};

/// A revision recorded in the `migrations` bookkeeping table
#[derive(Debug, Clone, Eq, PartialEq, Builder)]
#[builder(on(String, into))]
pub struct AppliedRevision {
    revision: String,
    timestamp: DateTime<Utc>,
}

impl AppliedRevision {
    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn applied_at(&self) -> &DateTime<Utc> {
        &self.timestamp
    }
}
