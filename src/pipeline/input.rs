//! Source resolution: read a local path or download a URL into memory.
//!
//! Documents are single scanned pages, so the whole file is held as bytes
//! and handed to the store. The document name is the final path or URL
//! segment, which is what the format check and artifact keys are derived
//! from.

use crate::error::TamperError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bytes of a source document together with the name it will be stored under.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read `source` from disk, or download it when it is an HTTP(S) URL.
pub async fn read_source(source: &str, timeout_secs: u64) -> Result<SourceDocument, TamperError> {
    if is_url(source) {
        download_url(source, timeout_secs).await
    } else {
        read_local(Path::new(source)).await
    }
}

async fn read_local(path: &Path) -> Result<SourceDocument, TamperError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TamperError::InvalidInput(format!("'{}' has no file name", path.display())))?
        .to_string();

    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TamperError::FileNotFound {
            path: PathBuf::from(path),
        },
        _ => TamperError::InvalidInput(format!("cannot read '{}': {}", path.display(), e)),
    })?;

    debug!("Read local document {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceDocument { name, bytes })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceDocument, TamperError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| TamperError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TamperError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            TamperError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(TamperError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let name = filename_from_url(url);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| TamperError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} ({} bytes)", name, bytes.len());
    Ok(SourceDocument {
        name,
        bytes: bytes.to_vec(),
    })
}

/// Last non-empty path segment of `url`, or `downloaded.pdf`.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
