use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::AnalysisRecord;
use super::RepositoryError;

/// In-memory store of analysis records, shared across workers.
///
/// Records are never evicted; the map is unbounded and retention is left to
/// whatever replaces this store.
#[derive(Clone, Default)]
pub struct AnalysisRepository {
    records: Arc<RwLock<HashMap<Uuid, AnalysisRecord>>>,
}

impl AnalysisRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: AnalysisRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.analysis_id) {
            return Err(RepositoryError::Conflict(record.analysis_id.to_string()));
        }
        log::debug!(
            "Storing analysis {} for user {}",
            record.analysis_id,
            record.user_id
        );
        records.insert(record.analysis_id, record);
        Ok(())
    }

    pub async fn get(&self, analysis_id: Uuid) -> Option<AnalysisRecord> {
        self.records.read().await.get(&analysis_id).cloned()
    }

    /// Records owned by `user_id`, newest first.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        skip: usize,
        limit: usize,
    ) -> Vec<AnalysisRecord> {
        let records = self.records.read().await;
        let mut owned: Vec<&AnalysisRecord> =
            records.values().filter(|r| r.user_id == user_id).collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.into_iter().skip(skip).take(limit).cloned().collect()
    }
}
