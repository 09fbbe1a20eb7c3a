//! Upload driver: executes a single PUT (simple category) or a multipart
//! PUT sequence (multipart category) against pre-signed URLs, streaming
//! file bytes without buffering the whole file, and collecting per-part
//! etags.
//!
//! The concurrent-parts shape (a bounded semaphore, one spawned task per
//! part, seek + bounded read per byte range) is grounded on
//! `dickwu-r2`'s `src/tauri/src/upload.rs` (`upload_multipart`) and
//! `Archibald-Wix-gale`'s modpack exporter (`upload_chunk` /
//! `try_join_all`).

use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::io::ReaderStream;

use crate::config::MULTIPART_PART_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload failed with status {status}: {body}")]
    UploadFailure { status: u16, body: String },
    #[error("part {0} did not return an ETag header")]
    EtagMissing(usize),
    #[error("{completed} of {total} parts completed before failure")]
    PartsIncomplete { completed: usize, total: usize },
    #[error("I/O error reading file for upload: {0}")]
    Io(#[from] std::io::Error),
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upload category {0:?} is not handled by this driver")]
    UnsupportedCategory(crate::client::models::UploadCategory),
}

/// Progress callback invoked at the start of each part and at completion:
/// `(parts_done, total_parts)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Upload `path` to a single pre-signed URL in one request. Streams the
/// file from disk rather than buffering it.
pub async fn upload_simple(
    client: &reqwest::Client,
    presigned_url: &str,
    path: &Path,
    mime_type: &str,
    content_md5_base64: &str,
    user_agent: &str,
    on_progress: ProgressFn,
) -> Result<(), UploadError> {
    let file = File::open(path).await?;
    let len = file.metadata().await?.len();
    let stream = ReaderStream::new(file);
    let body = reqwest::Body::wrap_stream(stream);

    on_progress(0, 1);

    let response = client
        .put(presigned_url)
        .header(reqwest::header::CONTENT_TYPE, mime_type)
        .header("Content-MD5", content_md5_base64)
        .header(reqwest::header::USER_AGENT, user_agent)
        .header(reqwest::header::CONTENT_LENGTH, len)
        .body(body)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(UploadError::UploadFailure { status, body });
    }

    on_progress(1, 1);
    Ok(())
}

/// Pre-signed URLs for a multipart upload, one per part, 1-indexed by
/// position (`urls[0]` is part 1).
pub struct MultipartUrls<'a> {
    pub urls: &'a [String],
}

/// Upload `path` as a sequence of 10 MiB parts against pre-signed URLs
/// already obtained by the caller (one `startFileUpload` call per part is
/// a network round-trip the orchestrator drives; this function only moves
/// bytes once the URLs are known). Parts upload concurrently, bounded by a
/// semaphore; on first failure the remaining parts are dropped.
pub async fn upload_multipart(
    client: &reqwest::Client,
    urls: MultipartUrls<'_>,
    path: &Path,
    mime_type: &str,
    user_agent: &str,
    concurrency: usize,
    on_progress: ProgressFn,
) -> Result<Vec<String>, UploadError> {
    let file_size = tokio::fs::metadata(path).await?.len();
    let total_parts = urls.urls.len() as u64;

    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(urls.urls.len());

    for (idx, url) in urls.urls.iter().enumerate() {
        let permit = semaphore.clone().acquire_owned().await.expect("semaphore closed");
        let client = client.clone();
        let url = url.clone();
        let path = path.to_path_buf();
        let mime_type = mime_type.to_string();
        let user_agent = user_agent.to_string();
        let on_progress = on_progress.clone();

        let part_number = idx as u64 + 1;
        let start = idx as u64 * MULTIPART_PART_SIZE;
        let end = std::cmp::min(start + MULTIPART_PART_SIZE, file_size);

        handles.push(tokio::spawn(async move {
            let _permit = permit;
            on_progress(part_number.saturating_sub(1), total_parts);
            let etag = upload_one_part(&client, &url, &path, start, end, &mime_type, &user_agent, part_number).await?;
            on_progress(part_number, total_parts);
            Ok::<String, UploadError>(etag)
        }));
    }

    let mut etags: Vec<Option<String>> = vec![None; urls.urls.len()];
    let mut first_error: Option<UploadError> = None;
    let mut completed = 0usize;

    for (idx, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(etag)) => {
                etags[idx] = Some(etag);
                completed += 1;
            }
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(join_err) => {
                if first_error.is_none() {
                    first_error = Some(UploadError::UploadFailure {
                        status: 0,
                        body: join_err.to_string(),
                    });
                }
            }
        }
    }

    if let Some(err) = first_error {
        return Err(if completed < urls.urls.len() {
            UploadError::PartsIncomplete {
                completed,
                total: urls.urls.len(),
            }
            .also_log(err)
        } else {
            err
        });
    }

    etags
        .into_iter()
        .enumerate()
        .map(|(i, e)| e.ok_or(UploadError::EtagMissing(i + 1)))
        .collect()
}

impl UploadError {
    /// Keep the more informative `PartsIncomplete` summary as the returned
    /// error while making sure the underlying cause still reaches the logs.
    fn also_log(self, cause: UploadError) -> UploadError {
        tracing::error!("multipart upload failed: {cause}");
        self
    }
}

#[allow(clippy::too_many_arguments)]
async fn upload_one_part(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
    start: u64,
    end: u64,
    mime_type: &str,
    user_agent: &str,
    part_number: u64,
) -> Result<String, UploadError> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(start)).await?;

    let len = end - start;
    let mut buffer = vec![0u8; len as usize];
    file.read_exact(&mut buffer).await?;

    let response = client
        .put(url)
        .header(reqwest::header::CONTENT_TYPE, mime_type)
        .header(reqwest::header::USER_AGENT, user_agent)
        .body(buffer)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(UploadError::UploadFailure { status, body });
    }

    let etag_header = response
        .headers()
        .get(reqwest::header::ETAG)
        .ok_or(UploadError::EtagMissing(part_number as usize))?
        .to_str()
        .map_err(|_| UploadError::EtagMissing(part_number as usize))?
        .to_string();

    Ok(strip_etag_quotes(&etag_header))
}

/// Strip surrounding single or double quotes from an `ETag` header value.
fn strip_etag_quotes(etag: &str) -> String {
    etag.trim_matches(|c| c == '"' || c == '\'').to_string()
}

/// Compute the number of 10 MiB parts a file of `size` bytes requires.
pub fn part_count(size: u64) -> u64 {
    size.div_ceil(MULTIPART_PART_SIZE)
}
