//! Outcome cache on top of the image builder's layer cache
//!
//! The builder decides hits and misses; dkrcache only observes it.
//! Everything the cache knows lives in the builder's state.
//!
//! # Hit-check
//!
//! | Full build | Listener contacted | Result |
//! |------------|--------------------|--------|
//! | succeeds | no | Hit, fetch layer was cached |
//! | fails | yes | Miss, listener refused the fetch |
//! | fails | no | Build failure |
//! | succeeds | yes | Inconsistent builder, error |

pub mod prune;
pub mod store;
pub mod template;

pub use prune::PruneCoordinator;
pub use store::{BuildCacheStore, CacheKey, ContentStore, Probe, StoredImage};
pub use template::FETCH_FINGERPRINT;
