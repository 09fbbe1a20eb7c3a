//! Bundle container reader: opens a `.3b` archive (ZIP), extracts it into a
//! fresh per-invocation temp directory, and validates it against the
//! manifest schema.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::manifest::{BundleManifest, ManifestParseError, Platform};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive is corrupt: {0}")]
    Corrupt(#[from] zip::result::ZipError),
    #[error("archive is missing metadata.json")]
    ManifestMissing,
    #[error("archive contains more than one metadata.json")]
    DuplicateManifest,
    #[error("manifest is invalid: {0}")]
    ManifestInvalid(#[from] ManifestParseError),
    #[error("archive is missing thumbnail.png")]
    ThumbnailMissing,
    #[error("archive is missing a payload for platform {0}")]
    MissingPlatformPayload(Platform),
    #[error("I/O error unpacking archive: {0}")]
    Io(#[from] std::io::Error),
}

/// One platform's payload as found in the archive: either already canonical
/// (`.vrca`) or still wrapped in the compressed envelope (`.vrcaz`).
#[derive(Debug, Clone)]
pub struct PlatformPayload {
    pub platform: Platform,
    pub path: PathBuf,
    pub compressed: bool,
}

/// An unpacked bundle archive. The temp directory lives until
/// [`UnpackedBundle::close`] is called or the value is dropped.
pub struct UnpackedBundle {
    dir: TempDir,
    pub manifest: BundleManifest,
    pub thumbnail_path: PathBuf,
    pub payloads: Vec<PlatformPayload>,
}

impl UnpackedBundle {
    pub fn unpack_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Explicit, deterministic cleanup, invoked by the orchestrator's
    /// shutdown hook on every exit path (success, error, cancel, close).
    /// Dropping the value without calling this still removes the directory
    /// via `TempDir`'s `Drop` impl, but the orchestrator prefers to make the
    /// deletion an observable step rather than relying on drop order.
    pub fn close(self) {
        drop(self.dir);
    }
}

/// Open a `.3b` archive and extract it into a fresh temp directory,
/// validating the manifest and locating the thumbnail and per-platform
/// payloads.
pub async fn unpack_bundle(archive_path: impl AsRef<Path>) -> Result<UnpackedBundle, ArchiveError> {
    let archive_path = archive_path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || unpack_bundle_blocking(&archive_path))
        .await
        .expect("unpack task panicked")
}

fn unpack_bundle_blocking(archive_path: &Path) -> Result<UnpackedBundle, ArchiveError> {
    let file = std::fs::File::open(archive_path)?;
    let mut zip = zip::ZipArchive::new(file)?;

    let dir = TempDir::new()?;

    let mut manifest_bytes: Option<Vec<u8>> = None;
    let mut saw_manifest_twice = false;
    let mut thumbnail_path: Option<PathBuf> = None;
    let mut payload_paths: std::collections::HashMap<(Platform, bool), PathBuf> =
        std::collections::HashMap::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let name = entry.name().to_string();
        if entry.is_dir() {
            continue;
        }

        let dest_path = dir.path().join(sanitize_entry_name(&name));
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        {
            let mut out = std::fs::File::create(&dest_path)?;
            std::io::copy(&mut entry, &mut out)?;
        }

        match name.as_str() {
            "metadata.json" => {
                if manifest_bytes.is_some() {
                    saw_manifest_twice = true;
                } else {
                    manifest_bytes = Some(std::fs::read(&dest_path)?);
                }
            }
            "thumbnail.png" => thumbnail_path = Some(dest_path),
            _ => {
                if let Some((platform, compressed)) = classify_platform_file(&name) {
                    payload_paths.insert((platform, compressed), dest_path);
                }
            }
        }
    }

    if saw_manifest_twice {
        return Err(ArchiveError::DuplicateManifest);
    }
    let manifest_bytes = manifest_bytes.ok_or(ArchiveError::ManifestMissing)?;
    let manifest = BundleManifest::parse(&manifest_bytes)?;

    let thumbnail_path = thumbnail_path.ok_or(ArchiveError::ThumbnailMissing)?;

    let mut payloads = Vec::new();
    for (platform, _entry) in manifest.asset_bundles.iter() {
        let compressed_path = payload_paths.get(&(platform, true)).cloned();
        let canonical_path = payload_paths.get(&(platform, false)).cloned();

        let (path, compressed) = match (canonical_path, compressed_path) {
            (Some(p), _) => (p, false),
            (None, Some(p)) => (p, true),
            (None, None) => return Err(ArchiveError::MissingPlatformPayload(platform)),
        };
        payloads.push(PlatformPayload {
            platform,
            path,
            compressed,
        });
    }

    Ok(UnpackedBundle {
        dir,
        manifest,
        thumbnail_path,
        payloads,
    })
}

fn classify_platform_file(name: &str) -> Option<(Platform, bool)> {
    let (stem, ext) = name.rsplit_once('.')?;
    let platform = match stem {
        "windows" => Platform::Windows,
        "android" => Platform::Android,
        "ios" => Platform::Ios,
        _ => return None,
    };
    match ext {
        "vrca" => Some((platform, false)),
        "vrcaz" => Some((platform, true)),
        _ => None,
    }
}

/// Strip any path traversal components from a zip entry name before joining
/// it to the extraction directory.
fn sanitize_entry_name(name: &str) -> PathBuf {
    Path::new(name)
        .components()
        .filter(|c| matches!(c, std::path::Component::Normal(_)))
        .collect()
}
