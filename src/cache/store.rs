//! Outcome storage in the build cache
//!
//! [`ContentStore`] is the narrow interface the orchestrator needs from a
//! content-addressed store. [`BuildCacheStore`] implements it on top of an
//! [`ImageBuilder`]: presence is detected by racing a build against the
//! local listener, and outcomes are persisted as the body of the fetch layer.

use crate::cache::prune::PruneCoordinator;
use crate::cache::template::{self, DISCRIMINATOR_ARG, KEY_TARGET, PORT_ARG};
use crate::config::Config;
use crate::error::{DkrError, DkrResult};
use crate::listener::{PortArbiter, Race, Reply};
use crate::orchestration::{BuildReport, BuildRequest, DockerBuilder, ImageBuilder};
use async_trait::async_trait;
use axum::body::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

/// Inputs the builder derives the cache key from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    /// Absolute path of the context directory
    pub context: PathBuf,
    pub discriminator: String,
}

impl CacheKey {
    pub fn new(context: impl AsRef<Path>, discriminator: impl fmt::Display) -> DkrResult<Self> {
        let context = context.as_ref();
        let context = std::path::absolute(context)
            .map_err(|e| DkrError::io(format!("resolving context {}", context.display()), e))?;
        Ok(Self {
            context,
            discriminator: discriminator.to_string(),
        })
    }
}

/// Image holding a persisted outcome
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredImage(String);

impl StoredImage {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoredImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a presence check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Found(StoredImage),
    NotFound,
}

/// Content-addressed outcome storage
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Look up the stored outcome for `key` without producing one
    async fn probe(&self, key: &CacheKey) -> DkrResult<Probe>;

    /// Persist `payload` under `key`
    async fn store(&self, key: &CacheKey, payload: Vec<u8>) -> DkrResult<StoredImage>;

    /// Read back a stored payload
    async fn fetch(&self, image: &StoredImage) -> DkrResult<Vec<u8>>;

    /// Delete a stored payload and whatever cache entries only it kept alive
    async fn discard(&self, image: StoredImage) -> DkrResult<()>;
}

/// [`ContentStore`] backed by an image builder's layer cache
pub struct BuildCacheStore {
    builder: Arc<dyn ImageBuilder>,
    arbiter: PortArbiter,
    dockerfile: String,
}

impl BuildCacheStore {
    pub fn new(builder: Arc<dyn ImageBuilder>, arbiter: PortArbiter, base_image: &str) -> Self {
        debug!("Using builder: {}", builder.builder_name());
        Self {
            builder,
            arbiter,
            dockerfile: template::dockerfile(base_image),
        }
    }

    /// Docker-backed store as described by `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(DockerBuilder::new(&config.builder)),
            PortArbiter::from_config(&config.listener),
            &config.builder.base_image,
        )
    }

    fn request(
        &self,
        key: &CacheKey,
        target: Option<&str>,
        port: Option<u16>,
        iidfile: Option<&Path>,
    ) -> BuildRequest {
        let mut build_args = vec![(DISCRIMINATOR_ARG.to_string(), key.discriminator.clone())];
        if let Some(port) = port {
            build_args.push((PORT_ARG.to_string(), port.to_string()));
        }
        BuildRequest {
            context: key.context.clone(),
            dockerfile: self.dockerfile.clone(),
            target: target.map(str::to_string),
            build_args,
            iidfile: iidfile.map(Path::to_path_buf),
        }
    }

    /// Build the key stage ahead of the race, so copying a large context
    /// never happens while the port is held.
    async fn build_key(&self, key: &CacheKey) -> DkrResult<()> {
        let request = self.request(key, Some(KEY_TARGET), None, None);
        let report = self.builder.build(&request).await?;
        if report.success {
            Ok(())
        } else {
            Err(DkrError::BuildFailed {
                target: KEY_TARGET.to_string(),
                output: report.output,
            })
        }
    }

    /// Race the full build against a listener answering `reply`
    async fn race_build(
        &self,
        key: &CacheKey,
        reply: Reply,
        iidfile: &Path,
    ) -> DkrResult<Race<BuildReport>> {
        let race = self
            .arbiter
            .race(reply, |port| {
                let request = self.request(key, None, Some(port), Some(iidfile));
                async move { self.builder.build(&request).await }
            })
            .await?;
        Ok(Race {
            build: race.build?,
            requests: race.requests,
        })
    }

    async fn read_image_id(iidfile: &Path) -> DkrResult<StoredImage> {
        let text = fs::read_to_string(iidfile)
            .await
            .map_err(|_| DkrError::MissingImageId(iidfile.to_path_buf()))?;
        let id = text.trim();
        if id.is_empty() {
            return Err(DkrError::MissingImageId(iidfile.to_path_buf()));
        }
        Ok(StoredImage::new(id))
    }
}

#[async_trait]
impl ContentStore for BuildCacheStore {
    async fn probe(&self, key: &CacheKey) -> DkrResult<Probe> {
        self.build_key(key).await?;

        let workdir = tempfile::tempdir().map_err(|e| DkrError::io("creating build workdir", e))?;
        let iidfile = workdir.path().join("iid");
        let race = self.race_build(key, Reply::Miss, &iidfile).await?;

        match (race.build.success, race.fetched()) {
            (true, false) => Ok(Probe::Found(Self::read_image_id(&iidfile).await?)),
            (false, false) => Err(DkrError::BuildFailed {
                target: "fetch".to_string(),
                output: race.build.output,
            }),
            (false, true) => {
                debug!("Cache miss for {}", key.context.display());
                Ok(Probe::NotFound)
            }
            (true, true) => Err(DkrError::InconsistentProbe {
                requests: race.requests,
            }),
        }
    }

    async fn store(&self, key: &CacheKey, payload: Vec<u8>) -> DkrResult<StoredImage> {
        self.build_key(key).await?;

        let workdir = tempfile::tempdir().map_err(|e| DkrError::io("creating build workdir", e))?;
        let iidfile = workdir.path().join("iid");
        let race = self
            .race_build(key, Reply::Payload(Bytes::from(payload)), &iidfile)
            .await?;

        if !race.build.success {
            return Err(DkrError::BuildFailed {
                target: "fetch".to_string(),
                output: race.build.output,
            });
        }
        if !race.fetched() {
            // A concurrent caller stored the same key first; its outcome stands.
            debug!("Fetch layer already cached, keeping existing outcome");
        }
        Self::read_image_id(&iidfile).await
    }

    async fn fetch(&self, image: &StoredImage) -> DkrResult<Vec<u8>> {
        self.builder.run(image.as_str()).await
    }

    async fn discard(&self, image: StoredImage) -> DkrResult<()> {
        PruneCoordinator::new(Arc::clone(&self.builder))
            .discard(&image)
            .await
            .map(|_| ())
    }
}
