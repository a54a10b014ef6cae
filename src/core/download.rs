use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::{Config, DownloadConfig};
use crate::error::{AppError, Result};
use crate::utils::{ensure_dir_exists, partial_path};

/// Fetches model artifacts over HTTP
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    client: reqwest::Client,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl ModelDownloader {
    /// Create a downloader with the configured timeout and User-Agent
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            max_attempts: config.max_attempts.max(1),
            retry_backoff: Duration::from_secs(config.retry_backoff_secs),
        })
    }

    /// Make sure `dest` exists, downloading it from `url` if it does not.
    ///
    /// The body is written to a `.part` file that is renamed into place only
    /// once complete. A failed attempt deletes its partial file and the next
    /// attempt starts over.
    pub async fn ensure(&self, url: &str, dest: &Path) -> Result<PathBuf> {
        if dest.is_file() {
            log::info!("Model already exists: {}", dest.display());
            return Ok(dest.to_path_buf());
        }
        if let Some(parent) = dest.parent() {
            ensure_dir_exists(parent)?;
        }

        let partial = partial_path(dest);
        let mut attempt = 1;
        loop {
            match self.fetch(url, &partial).await {
                Ok(bytes) => {
                    tokio::fs::rename(&partial, dest).await?;
                    log::info!(
                        "Downloaded {} ({:.1} MB) to {}",
                        url,
                        bytes as f64 / (1024.0 * 1024.0),
                        dest.display()
                    );
                    return Ok(dest.to_path_buf());
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&partial).await;
                    if attempt >= self.max_attempts {
                        return Err(AppError::Download(format!(
                            "{} failed after {} attempt(s): {}",
                            url, attempt, e
                        )));
                    }
                    let delay = self.retry_backoff * attempt;
                    log::warn!(
                        "Download attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn fetch(&self, url: &str, partial: &Path) -> Result<u64> {
        let mut response = self.client.get(url).send().await?.error_for_status()?;
        let total = response.content_length();

        let progress = match total {
            Some(len) => {
                let bar = ProgressBar::new(len);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{msg} [{bar:40}] {bytes}/{total_bytes} ({eta})",
                    )
                    .map_err(|e| AppError::Internal(e.to_string()))?
                    .progress_chars("=> "),
                );
                bar
            }
            None => ProgressBar::new_spinner(),
        };
        progress.set_message(model_file_name(url));

        let mut file = File::create(partial).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress.set_position(written);
        }
        file.flush().await?;
        progress.finish_and_clear();

        if let Some(expected) = total {
            if written != expected {
                return Err(AppError::Download(format!(
                    "truncated body: got {} of {} bytes",
                    written, expected
                )));
            }
        }
        Ok(written)
    }
}

/// Download the configured visual encoder if it is missing and a URL is set.
///
/// Returns the model path whether or not anything was fetched.
pub async fn fetch_model(config: &Config) -> Result<PathBuf> {
    let dest = config.model.visual_model_path();
    match config.model.visual_model_url.as_deref() {
        Some(url) if !dest.is_file() => {
            log::info!("Model missing, downloading {}", model_file_name(url));
            ModelDownloader::new(&config.download)?.ensure(url, &dest).await
        }
        _ => Ok(dest),
    }
}

fn model_file_name(url: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(url)
        .to_string()
}
