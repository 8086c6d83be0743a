//! Rendered-preview image source
//!
//! Fetches a document from the object store and hands it to an external
//! renderer that produces a preview image. The renderer is any command that
//! takes the staged input file as its last argument and prints the path of
//! the image it produced on stdout. That output file is deleted once read.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::s3::{S3Source, S3SourceConfig};
use super::{FetchRequest, HttpClient, ImageSource};
use crate::constants::DEFAULT_RENDER_TIMEOUT_SECS;
use crate::error::{ConfigError, RenderError, SourceFetchError};

/// Turns an arbitrary document into a preview image
#[async_trait]
pub trait ThumbnailRenderer: Send + Sync {
    async fn render(&self, filename: &str, data: Bytes) -> Result<Bytes, RenderError>;
}

/// Runs a configured external command per render.
///
/// Each call copies the argv template, so concurrent renders never share
/// argument buffers. The input is staged in a private temp directory that is
/// removed when the call returns.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    command: Arc<[String]>,
    timeout: Duration,
}

impl CommandRenderer {
    pub fn new(command: Vec<String>, timeout: Duration) -> Result<Self, RenderError> {
        if command.first().map_or(true, |program| program.is_empty()) {
            return Err(RenderError::EmptyCommand);
        }
        Ok(Self {
            command: command.into(),
            timeout,
        })
    }
}

#[async_trait]
impl ThumbnailRenderer for CommandRenderer {
    async fn render(&self, filename: &str, data: Bytes) -> Result<Bytes, RenderError> {
        let staging = tempfile::tempdir().map_err(RenderError::Stage)?;
        let name = Path::new(filename)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "input".into());
        let input_path = staging.path().join(name);
        tokio::fs::write(&input_path, &data)
            .await
            .map_err(RenderError::Stage)?;

        let mut argv: Vec<String> = self.command.to_vec();
        argv.push(input_path.to_string_lossy().into_owned());
        debug!(input = %input_path.display(), program = %argv[0], "Rendering preview");

        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RenderError::Spawn)?;

        // Dropping the future on timeout drops the child, which kills it
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout(self.timeout.as_secs()))?
            .map_err(RenderError::Spawn)?;

        if !output.status.success() {
            return Err(RenderError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let produced = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(output = %produced, "Preview rendered");
        let image = tokio::fs::read(&produced)
            .await
            .map_err(|source| RenderError::Output {
                path: produced.clone(),
                source,
            })?;

        if let Err(e) = tokio::fs::remove_file(&produced).await {
            warn!(output = %produced, error = %e, "Failed to remove rendered preview");
        }

        Ok(Bytes::from(image))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PreviewSourceConfig {
    #[serde(flatten)]
    pub store: S3SourceConfig,
    /// Renderer argv template; the staged file path is appended per call
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
}

fn default_render_timeout_secs() -> u64 {
    DEFAULT_RENDER_TIMEOUT_SECS
}

/// Object-store fetch followed by an external render step
pub struct PreviewSource {
    store: Arc<dyn ImageSource>,
    renderer: Arc<dyn ThumbnailRenderer>,
}

impl PreviewSource {
    pub fn new(store: Arc<dyn ImageSource>, renderer: Arc<dyn ThumbnailRenderer>) -> Self {
        Self { store, renderer }
    }

    pub fn from_config(config: PreviewSourceConfig, client: HttpClient) -> Result<Self, ConfigError> {
        let renderer = CommandRenderer::new(
            config.command,
            Duration::from_secs(config.render_timeout_secs),
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let store = S3Source::new(config.store, client)?;
        Ok(Self::new(Arc::new(store), Arc::new(renderer)))
    }
}

#[async_trait]
impl ImageSource for PreviewSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, SourceFetchError> {
        let document = self.store.fetch(request).await?;
        let image = self.renderer.render(request.filename(), document).await?;
        Ok(image)
    }
}
