//! Memoized task execution
//!
//! [`ExpensiveTask`] binds a context directory, a discriminator and a task.
//! Each run first asks the store whether an outcome exists for those inputs,
//! replays it on a hit, and otherwise executes the task and persists its
//! outcome according to the cache policy.

use crate::cache::{BuildCacheStore, CacheKey, ContentStore, Probe};
use crate::config::{Config, ConfigManager};
use crate::error::DkrResult;
use crate::outcome::{policy, Outcome};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// A task whose outcome is memoized per (context content, discriminator)
pub struct ExpensiveTask<F, T, E> {
    key: CacheKey,
    task: F,
    store: Arc<dyn ContentStore>,
    _outcome: PhantomData<fn() -> (T, E)>,
}

impl<F, Fut, T, E> ExpensiveTask<F, T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    T: Serialize + DeserializeOwned,
    E: Serialize + DeserializeOwned,
{
    /// Memoize `task` with the settings from the user's config file
    ///
    /// Falls back to defaults when `<config_dir>/dkrcache/config.toml` does
    /// not exist.
    pub async fn load(
        context: impl AsRef<Path>,
        discriminator: impl fmt::Display,
        task: F,
    ) -> DkrResult<Self> {
        Self::with_config_manager(&ConfigManager::new(), context, discriminator, task).await
    }

    /// Memoize `task` with the settings `manager` loads
    pub async fn with_config_manager(
        manager: &ConfigManager,
        context: impl AsRef<Path>,
        discriminator: impl fmt::Display,
        task: F,
    ) -> DkrResult<Self> {
        let config = manager.load().await?;
        Self::with_config(&config, context, discriminator, task)
    }

    /// Memoize `task` in the local docker build cache with default settings
    pub fn new(
        context: impl AsRef<Path>,
        discriminator: impl fmt::Display,
        task: F,
    ) -> DkrResult<Self> {
        Self::with_config(&Config::default(), context, discriminator, task)
    }

    /// Memoize `task` in the docker build cache described by `config`
    pub fn with_config(
        config: &Config,
        context: impl AsRef<Path>,
        discriminator: impl fmt::Display,
        task: F,
    ) -> DkrResult<Self> {
        let store = Arc::new(BuildCacheStore::from_config(config));
        Self::with_store(store, context, discriminator, task)
    }

    /// Memoize `task` in an arbitrary store
    pub fn with_store(
        store: Arc<dyn ContentStore>,
        context: impl AsRef<Path>,
        discriminator: impl fmt::Display,
        task: F,
    ) -> DkrResult<Self> {
        Ok(Self {
            key: CacheKey::new(context, discriminator)?,
            task,
            store,
            _outcome: PhantomData,
        })
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Replay the stored outcome, or run the task and cache it if it succeeds.
    ///
    /// The outer result carries cache infrastructure errors, the inner one is
    /// the task's result, replayed or fresh.
    pub async fn run(&self) -> DkrResult<Result<T, E>> {
        self.run_with(policy::never, policy::normal).await
    }

    /// Like [`run`](Self::run) with explicit policies.
    ///
    /// `force` decides whether a stored outcome is discarded and recomputed,
    /// `cache` decides whether a fresh outcome is persisted.
    pub async fn run_with<P, Q>(&self, force: P, cache: Q) -> DkrResult<Result<T, E>>
    where
        P: Fn(&Outcome<T, E>) -> bool,
        Q: Fn(&Outcome<T, E>) -> bool,
    {
        if let Some(outcome) = self.cached_outcome(&force).await? {
            return Ok(outcome.into_result());
        }

        let outcome = Outcome::from_result((self.task)().await);
        if cache(&outcome) {
            match outcome.to_bytes() {
                Ok(payload) => {
                    let image = self.store.store(&self.key, payload).await?;
                    info!("Cached as: {}", image);
                }
                // The task has run; its result is returned even when it cannot be cached.
                Err(e) => warn!("Not caching outcome: {}", e),
            }
        }
        Ok(outcome.into_result())
    }

    /// Stored outcome to replay, or `None` when the task must run
    async fn cached_outcome<P>(&self, force: &P) -> DkrResult<Option<Outcome<T, E>>>
    where
        P: Fn(&Outcome<T, E>) -> bool,
    {
        let Probe::Found(image) = self.store.probe(&self.key).await? else {
            return Ok(None);
        };

        let bytes = self.store.fetch(&image).await?;
        let outcome = Outcome::from_bytes(image.as_str(), &bytes)?;
        let forced = force(&outcome);
        info!(
            "Cache hit{}: {}",
            if forced { " and drop" } else { "" },
            image
        );
        if !forced {
            return Ok(Some(outcome));
        }

        self.store.discard(image).await?;
        Ok(None)
    }
}
