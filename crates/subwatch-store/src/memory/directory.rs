use crate::{StoreResult, SubmissionDirectory};
use async_trait::async_trait;
use dashmap::DashMap;
use subwatch_core::{SubmissionId, SubmissionRecord};

/// Submission table stand-in
#[derive(Debug, Default)]
pub struct InMemorySubmissionDirectory {
    records: DashMap<SubmissionId, SubmissionRecord>,
}

impl InMemorySubmissionDirectory {
    /// Create empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a submission record
    pub fn register(&self, record: SubmissionRecord) {
        self.records.insert(record.submission_id, record);
    }
}

#[async_trait]
impl SubmissionDirectory for InMemorySubmissionDirectory {
    async fn lookup(&self, id: SubmissionId) -> StoreResult<Option<SubmissionRecord>> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }
}
