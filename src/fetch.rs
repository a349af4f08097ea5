//! Artifact fetching and SHA-256 verification.
//!
//! [`HttpFetcher`] downloads `http(s)://` URLs with a progress bar and copies
//! `file://` URLs or plain paths from disk. Artifacts land in the download
//! cache as `<name>--<file name>`; a cached file that already matches its
//! checksum is reused instead of fetched again.
//!
//! The executor verifies every artifact itself after fetching, whatever the
//! fetcher did, so a fetcher never has to be trusted.

use anyhow::{Context, Result, anyhow, bail};
use futures::future::BoxFuture;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// What to fetch and where to put it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub name: String,
    pub url: String,
    pub sha256: String,
    pub dest_dir: PathBuf,
}

impl FetchRequest {
    pub fn dest_path(&self) -> PathBuf {
        self.dest_dir.join(artifact_file_name(&self.name, &self.url))
    }
}

pub trait Fetcher: Send + Sync {
    /// Fetch the artifact and return its local path
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<PathBuf>>;
}

/// Cache file name for an artifact: `<name>--<last url segment>`
pub fn artifact_file_name(name: &str, url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let last = without_query
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("artifact");
    format!("{}--{}", name, last)
}

/// SHA-256 of a file as lowercase hex
pub async fn sha256_file(file_path: &Path) -> Result<String> {
    let mut file = fs::File::open(file_path)
        .await
        .with_context(|| format!("Failed to open {}", file_path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 8192];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA256 checksum verification
pub async fn verify_checksum(file_path: &Path, expected: &str) -> Result<bool> {
    Ok(sha256_file(file_path).await? == expected.to_ascii_lowercase())
}

/// Local path for `file://` URLs and scheme-less paths
fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        Some(PathBuf::from(path))
    } else if !url.contains("://") {
        Some(PathBuf::from(url))
    } else {
        None
    }
}

/// Default fetcher: HTTP(S) via reqwest, local files via copy
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    progress: Option<MultiProgress>,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(format!("scoby/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            progress: None,
        })
    }

    /// Show a progress bar per download
    pub fn with_progress(mut self, progress: MultiProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    async fn fetch_impl(&self, request: &FetchRequest) -> Result<PathBuf> {
        fs::create_dir_all(&request.dest_dir)
            .await
            .context("Failed to create download directory")?;

        let output_path = request.dest_path();

        // Check if already downloaded and verified
        if fs::try_exists(&output_path).await.unwrap_or(false) {
            if verify_checksum(&output_path, &request.sha256).await? {
                tracing::debug!("Using cached {}", output_path.display());
                return Ok(output_path);
            }
            fs::remove_file(&output_path).await?;
        }

        let partial = output_path.with_extension("part");

        if let Some(source) = local_path(&request.url) {
            fs::copy(&source, &partial)
                .await
                .with_context(|| format!("Failed to copy {}", source.display()))?;
        } else if request.url.starts_with("http://") || request.url.starts_with("https://") {
            if let Err(e) = self.download(request, &partial).await {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        } else {
            bail!("Unsupported URL scheme: {}", request.url);
        }

        fs::rename(&partial, &output_path)
            .await
            .context("Failed to move download into place")?;

        Ok(output_path)
    }

    async fn download(&self, request: &FetchRequest, output_path: &Path) -> Result<()> {
        let pb = match &self.progress {
            Some(mp) => {
                let pb = mp.add(ProgressBar::new(0));
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template(
                            "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                        )?
                        .progress_chars("#>-"),
                );
                pb.set_message(format!("⬇ {}", request.name));
                Some(pb)
            }
            None => None,
        };

        let mut response = self
            .client
            .get(&request.url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP {} for {}", response.status(), request.url));
        }

        if let (Some(pb), Some(total)) = (&pb, response.content_length()) {
            pb.set_length(total);
        }

        let mut file = fs::File::create(output_path)
            .await
            .context("Failed to create output file")?;
        let mut downloaded: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if let Some(pb) = &pb {
                pb.set_position(downloaded);
            }
        }

        file.flush().await?;

        if let Some(pb) = &pb {
            pb.finish_with_message(format!("✓ {}", request.name));
        }

        Ok(())
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(self.fetch_impl(request))
    }
}
