//! Unseen-count aggregation for the sidebar.

use std::collections::HashMap;
use std::sync::Arc;

use crate::chat::store::MessageStore;
use crate::core::error::Result;
use crate::core::models::UserId;

pub struct UnseenCounts {
    store: Arc<dyn MessageStore>,
}

impl UnseenCounts {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Unseen messages each candidate has sent to `viewer_id`.
    ///
    /// Sparse: candidates with nothing unseen are left out. Always read
    /// fresh from the store.
    pub async fn unseen_counts(
        &self,
        viewer_id: &str,
        candidate_user_ids: &[UserId],
    ) -> Result<HashMap<UserId, u64>> {
        let mut by_sender = self.store.unseen_by_sender(viewer_id).await?;

        Ok(candidate_user_ids
            .iter()
            .filter_map(|candidate| {
                by_sender
                    .remove(candidate)
                    .filter(|count| *count > 0)
                    .map(|count| (candidate.clone(), count))
            })
            .collect())
    }
}
