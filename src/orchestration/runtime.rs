//! Image builder abstraction
//!
//! Provides a trait for the builder operations the cache consumes, so the
//! docker CLI backend can be swapped for another content-addressed builder.

use crate::error::DkrResult;
use crate::orchestration::types::{BuildReport, BuildRequest, CacheRecord};
use async_trait::async_trait;

/// Abstract image builder interface
///
/// Implementations must cache layers by instruction and inputs, so building
/// the same stage twice reuses the first result without executing it.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Build a stage. A build that runs but fails is reported through
    /// [`BuildReport::success`], not as an error.
    async fn build(&self, request: &BuildRequest) -> DkrResult<BuildReport>;

    /// Run an image ephemerally and return everything it wrote to stdout
    async fn run(&self, image: &str) -> DkrResult<Vec<u8>>;

    /// Remove an image by id
    async fn remove_image(&self, image: &str) -> DkrResult<()>;

    /// List build cache records
    async fn cache_usage(&self) -> DkrResult<Vec<CacheRecord>>;

    /// Prune a single build cache record by id. Pruning an id that no longer
    /// exists is not an error.
    async fn prune_cache(&self, id: &str) -> DkrResult<()>;

    /// Get the human-readable builder name for display
    fn builder_name(&self) -> &'static str;
}
