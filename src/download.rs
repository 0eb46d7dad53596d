use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use regex::Regex;
use url::Url;

/// Binary downloads get a longer leash than page fetches.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// What a successful download reported back.
#[derive(Debug, Clone)]
pub struct Downloaded {
    /// Filename declared by the server, when it sent one.
    pub original_filename: Option<String>,
}

/// Fetch one document to `dest`. Every failure mode (transport, non-2xx,
/// wrong content type) is absorbed here and reported as `None`; a missing
/// document never aborts the municipality run.
pub async fn download_document(
    client: &reqwest::Client,
    url: &Url,
    dest: &Path,
) -> Option<Downloaded> {
    match try_download(client, url, dest).await {
        Ok(downloaded) => Some(downloaded),
        Err(err) => {
            tracing::warn!(?err, url = %url, "download failed");
            None
        }
    }
}

async fn try_download(
    client: &reqwest::Client,
    url: &Url,
    dest: &Path,
) -> anyhow::Result<Downloaded> {
    let response = client
        .get(url.clone())
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .context("document status")?;

    let content_type = header_value(&response, &reqwest::header::CONTENT_TYPE).unwrap_or_default();
    if !content_type.to_lowercase().contains("pdf") && !url.as_str().to_lowercase().ends_with(".pdf")
    {
        anyhow::bail!("not a pdf: content-type {content_type:?}");
    }

    let original_filename = header_value(&response, &reqwest::header::CONTENT_DISPOSITION)
        .as_deref()
        .and_then(content_disposition_filename);

    let body = response.bytes().await.context("read document body")?;

    let parent = dest
        .parent()
        .ok_or_else(|| anyhow::anyhow!("destination must have parent: {}", dest.display()))?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("create download dir: {}", parent.display()))?;
    std::fs::write(dest, &body).with_context(|| format!("write document: {}", dest.display()))?;

    Ok(Downloaded { original_filename })
}

fn header_value(response: &reqwest::Response, name: &reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Pull the filename out of a Content-Disposition header such as
/// `inline; filename="Annual Report 2024.pdf"`, percent-decoded.
pub fn content_disposition_filename(header: &str) -> Option<String> {
    let pattern = Regex::new(r#"filename\*?=["']?([^"';\n]+)["']?"#).ok()?;
    let raw = pattern.captures(header)?.get(1)?.as_str().trim();
    if raw.is_empty() {
        return None;
    }

    match urlencoding::decode(raw) {
        Ok(decoded) => Some(decoded.into_owned()),
        Err(_) => Some(raw.to_owned()),
    }
}

/// Rename a download to its year-qualified canonical name. No-op when the
/// name already matches or the target is taken, so re-runs stay
/// idempotent. Returns the path the document ends up under.
pub fn finalize_with_year(path: &Path, year: i32) -> anyhow::Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("document path must have parent: {}", path.display()))?;
    let target = parent.join(format!("financial_statement_{year}.pdf"));

    if target.as_path() == path || target.exists() {
        return Ok(path.to_path_buf());
    }

    std::fs::rename(path, &target)
        .with_context(|| format!("rename {} -> {}", path.display(), target.display()))?;
    Ok(target)
}
