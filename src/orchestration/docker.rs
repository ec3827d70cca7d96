//! Docker CLI image builder
//!
//! Implements the ImageBuilder trait by shelling out to the docker CLI
//! (BuildKit backend with the buildx plugin for cache listing).

use crate::config::BuilderConfig;
use crate::error::{DkrError, DkrResult};
use crate::orchestration::archive::write_context;
use crate::orchestration::runtime::ImageBuilder;
use crate::orchestration::types::{BuildReport, BuildRequest, CacheRecord};
use crate::orchestration::usage::parse_cache_usage;
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, warn};

/// Image builder using the docker CLI
pub struct DockerBuilder {
    program: String,
    network: String,
}

impl DockerBuilder {
    /// Create a builder from configuration
    pub fn new(config: &BuilderConfig) -> Self {
        Self {
            program: config.program.clone(),
            network: config.network.clone(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Execute a docker command and return the output
    async fn exec(&self, args: &[&str]) -> DkrResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.program, args);

        self.command(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DkrError::command_failed(format!("{} {:?}", self.program, args), e))
    }

    /// Assemble `docker build` arguments, reading the context from stdin
    fn build_args(&self, request: &BuildRequest) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "--network".to_string(),
            self.network.clone(),
            "--quiet".to_string(),
        ];

        if let Some(iidfile) = &request.iidfile {
            args.push("--iidfile".to_string());
            args.push(iidfile.display().to_string());
        }

        if let Some(target) = &request.target {
            args.push("--target".to_string());
            args.push(target.clone());
        }

        for (name, value) in &request.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{}={}", name, value));
        }

        args.push("-".to_string());
        args
    }
}

#[async_trait]
impl ImageBuilder for DockerBuilder {
    async fn build(&self, request: &BuildRequest) -> DkrResult<BuildReport> {
        let args = self.build_args(request);
        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!("Building {}: {} {:?}", request.target_name(), self.program, args_refs);

        let mut child = self
            .command(&args_refs)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| DkrError::command_failed(format!("{} build", self.program), e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DkrError::Internal("build stdin not piped".to_string()))?;

        // The archive is streamed, so the context never sits in memory whole.
        // Dropping the bridge closes stdin and ends the upload.
        let dockerfile = request.dockerfile.clone();
        let context = request.context.clone();
        let stdin = SyncIoBridge::new(stdin);
        let feed = tokio::task::spawn_blocking(move || {
            let mut stdin = write_context(stdin, &dockerfile, &context)?;
            stdin
                .flush()
                .map_err(|e| DkrError::io("flushing context archive", e))
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DkrError::command_failed(format!("{} build", self.program), e))?;

        match feed.await {
            Ok(Ok(())) => {}
            // A build that exits early closes stdin under us; its exit status says why.
            Ok(Err(DkrError::Io { source, .. })) if source.kind() == ErrorKind::BrokenPipe => {
                debug!("Context upload interrupted: {}", source);
            }
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(DkrError::Internal(format!("archive task panicked: {e}"))),
        }

        if output.status.success() {
            Ok(BuildReport::succeeded())
        } else {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            Ok(BuildReport::failed(super::build_error_output(&stdout, &stderr)))
        }
    }

    async fn run(&self, image: &str) -> DkrResult<Vec<u8>> {
        debug!("Running image: {}", image);

        let output = self.exec(&["run", "--rm", image]).await?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(DkrError::ImageRun {
                image: image.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    async fn remove_image(&self, image: &str) -> DkrResult<()> {
        debug!("Removing image: {}", image);

        let output = self.exec(&["rmi", image]).await?;

        if output.status.success() {
            Ok(())
        } else {
            // Another caller may have removed it already
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such image") {
                warn!("Image already gone: {}", image);
                Ok(())
            } else {
                Err(DkrError::command_exec(format!("{} rmi", self.program), stderr))
            }
        }
    }

    async fn cache_usage(&self) -> DkrResult<Vec<CacheRecord>> {
        let output = self.exec(&["buildx", "du", "--verbose"]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DkrError::command_exec(
                format!("{} buildx du", self.program),
                stderr,
            ));
        }

        parse_cache_usage(&String::from_utf8_lossy(&output.stdout))
    }

    async fn prune_cache(&self, id: &str) -> DkrResult<()> {
        debug!("Pruning build cache record: {}", id);

        let filter = format!("id={}", id);
        let output = self
            .exec(&["builder", "prune", "-f", "--filter", &filter])
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DkrError::command_exec(
                format!("{} builder prune", self.program),
                stderr,
            ))
        }
    }

    fn builder_name(&self) -> &'static str {
        "Docker"
    }
}
