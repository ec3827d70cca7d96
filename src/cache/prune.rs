//! Reclaiming the build cache behind a discarded outcome
//!
//! Removing a stored image leaves its fetch layer in the build cache, where
//! the next hit-check would find it again. After the removal, cache records
//! that became unshared and carry the fetch fingerprint are pruned by id.

use crate::cache::store::StoredImage;
use crate::cache::template::is_fetch_record;
use crate::error::DkrResult;
use crate::orchestration::ImageBuilder;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Removes stored images together with their orphaned fetch layers
pub struct PruneCoordinator {
    builder: Arc<dyn ImageBuilder>,
}

impl PruneCoordinator {
    pub fn new(builder: Arc<dyn ImageBuilder>) -> Self {
        Self { builder }
    }

    /// Ids of unshared cache records produced by the fetch instruction
    async fn orphaned_fetch_records(&self) -> DkrResult<BTreeSet<String>> {
        Ok(self
            .builder
            .cache_usage()
            .await?
            .into_iter()
            .filter(|record| !record.shared && is_fetch_record(&record.description))
            .map(|record| record.id)
            .collect())
    }

    /// Remove `image` and prune the fetch records its removal freed.
    /// Returns the pruned ids.
    pub async fn discard(&self, image: &StoredImage) -> DkrResult<Vec<String>> {
        let before = self.orphaned_fetch_records().await?;
        self.builder.remove_image(image.as_str()).await?;
        let after = self.orphaned_fetch_records().await?;

        // If nothing new shows up, someone else already pruned it. The user can
        // prune the builder at any time, so pruning too much is no worse.
        let freed: Vec<String> = after.difference(&before).cloned().collect();
        if freed.is_empty() {
            debug!("Removing {} freed no fetch records", image);
        }

        for id in &freed {
            self.builder.prune_cache(id).await?;
            info!("Pruned build cache record: {}", id);
        }

        Ok(freed)
    }
}
