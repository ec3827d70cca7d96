//! In-process image builder emulating BuildKit layer caching
//!
//! The key stage is keyed by the archived context plus the discriminator,
//! the fetch layer additionally by the port. An uncached fetch layer is
//! produced by a real HTTP GET against the listener, exactly like `wget`.

use async_trait::async_trait;
use dkrcache::cache::FETCH_FINGERPRINT;
use dkrcache::orchestration::archive::archive_context;
use dkrcache::orchestration::{BuildReport, BuildRequest, CacheRecord, ImageBuilder};
use dkrcache::{DkrError, DkrResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Description of a cache record unrelated to dkrcache
pub const UNRELATED: &str = "mount / from exec /bin/sh -c make";

/// Agent that ignores proxy settings from the environment, like `wget localhost`
/// from a host-network build
fn direct_agent() -> ureq::Agent {
    ureq::Agent::new_with_config(ureq::Agent::config_builder().proxy(None).build())
}

struct Layer {
    record_id: String,
    body: Vec<u8>,
}

#[derive(Default)]
struct State {
    /// Fetch layers by fetch key
    layers: HashMap<String, Layer>,
    /// Image id to fetch key
    images: HashMap<String, String>,
    /// Records not produced by dkrcache
    unrelated: Vec<CacheRecord>,
    next_record: usize,
}

#[derive(Default)]
pub struct FakeBuilder {
    state: Mutex<State>,
    fetch_builds: AtomicUsize,
    max_fetch_builds: AtomicUsize,
    downloads: AtomicUsize,
}

impl FakeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record that dkrcache must never prune
    pub fn add_unrelated_record(&self, id: &str) {
        self.state.lock().unwrap().unrelated.push(CacheRecord {
            id: id.to_string(),
            description: UNRELATED.to_string(),
            shared: false,
        });
    }

    /// Highest number of full builds that ever ran at the same time
    pub fn max_concurrent_fetch_builds(&self) -> usize {
        self.max_fetch_builds.load(Ordering::SeqCst)
    }

    /// Number of times a fetch layer was produced from the listener
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn fetch_layer_count(&self) -> usize {
        self.state.lock().unwrap().layers.len()
    }

    fn key_digest(request: &BuildRequest) -> DkrResult<String> {
        let archive = archive_context(&request.dockerfile, &request.context)?;
        let mut hasher = Sha256::new();
        hasher.update(&archive);
        hasher.update(request.build_arg("discriminator").unwrap_or_default());
        Ok(hex::encode(hasher.finalize()))
    }

    fn image_id(fetch_key: &str, record_id: &str) -> String {
        let digest = Sha256::digest(format!("{fetch_key}/{record_id}"));
        format!("sha256:{}", hex::encode(digest))
    }

    /// Record the image for a cached layer and write its id file
    fn finish(&self, request: &BuildRequest, fetch_key: &str) -> DkrResult<BuildReport> {
        let image = {
            let mut state = self.state.lock().unwrap();
            let record_id = state.layers[fetch_key].record_id.clone();
            let image = Self::image_id(fetch_key, &record_id);
            state.images.insert(image.clone(), fetch_key.to_string());
            image
        };
        if let Some(iidfile) = &request.iidfile {
            std::fs::write(iidfile, image).map_err(|e| DkrError::io("writing iid", e))?;
        }
        Ok(BuildReport::succeeded())
    }

    async fn full_build(&self, request: &BuildRequest, key: String) -> DkrResult<BuildReport> {
        let port: u16 = request
            .build_arg("port")
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| DkrError::Internal("port build-arg missing".to_string()))?;
        let fetch_key = format!("{key}:{port}");

        if self.state.lock().unwrap().layers.contains_key(&fetch_key) {
            return self.finish(request, &fetch_key);
        }

        let url = format!("http://127.0.0.1:{port}/");
        let fetched = tokio::task::spawn_blocking(move || match direct_agent().get(&url).call() {
            Ok(mut response) => response.body_mut().read_to_vec().map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        })
        .await
        .map_err(|e| DkrError::Internal(e.to_string()))?;

        match fetched {
            Ok(body) => {
                self.downloads.fetch_add(1, Ordering::SeqCst);
                {
                    let mut state = self.state.lock().unwrap();
                    state.next_record += 1;
                    let record_id = format!("rec{}", state.next_record);
                    state.layers.insert(fetch_key.clone(), Layer { record_id, body });
                }
                self.finish(request, &fetch_key)
            }
            Err(e) => Ok(BuildReport::failed(format!("wget: {e}"))),
        }
    }
}

#[async_trait]
impl ImageBuilder for FakeBuilder {
    async fn build(&self, request: &BuildRequest) -> DkrResult<BuildReport> {
        let key = Self::key_digest(request)?;
        if request.target.as_deref() == Some("key") {
            return Ok(BuildReport::succeeded());
        }

        let running = self.fetch_builds.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_fetch_builds.fetch_max(running, Ordering::SeqCst);
        let report = self.full_build(request, key).await;
        self.fetch_builds.fetch_sub(1, Ordering::SeqCst);
        report
    }

    async fn run(&self, image: &str) -> DkrResult<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .images
            .get(image)
            .and_then(|fetch_key| state.layers.get(fetch_key))
            .map(|layer| layer.body.clone())
            .ok_or_else(|| DkrError::ImageRun {
                image: image.to_string(),
                stderr: "Unable to find image".to_string(),
            })
    }

    async fn remove_image(&self, image: &str) -> DkrResult<()> {
        self.state.lock().unwrap().images.remove(image);
        Ok(())
    }

    async fn cache_usage(&self) -> DkrResult<Vec<CacheRecord>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<CacheRecord> = state
            .layers
            .iter()
            .map(|(fetch_key, layer)| CacheRecord {
                id: layer.record_id.clone(),
                description: FETCH_FINGERPRINT.to_string(),
                shared: state.images.values().any(|k| k == fetch_key),
            })
            .collect();
        records.extend(state.unrelated.iter().cloned());
        Ok(records)
    }

    async fn prune_cache(&self, id: &str) -> DkrResult<()> {
        let mut state = self.state.lock().unwrap();
        state.layers.retain(|_, layer| layer.record_id != id);
        state.unrelated.retain(|record| record.id != id);
        Ok(())
    }

    fn builder_name(&self) -> &'static str {
        "Fake"
    }
}
