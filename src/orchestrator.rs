//! Publication orchestrator: the top-level state machine that sequences
//! thumbnail upload, avatar upsert, per-platform transcode, and per-platform
//! bundle upload, publishing progress events along the way.
//!
//! The "promise race" in ready-bundle iteration is a completion queue built
//! on `futures::stream::FuturesUnordered`, per the design note in
//! SPEC_FULL.md §9, generalizing the concurrent-task-fan-in shape used for
//! multipart parts in [`crate::upload`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::archive::{self, PlatformPayload};
use crate::client::cookie::CookieJar;
use crate::client::models::*;
use crate::client::url::parse_file_id;
use crate::client::{GetUserOutcome, ServiceClient};
use crate::credentials::CredentialStore;
use crate::digest;
use crate::error::{AuthError, PublishError};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::signature;
use crate::transcode;
use crate::upload::{self, MultipartUrls};

const THUMBNAIL_MIME: &str = "image/png";
const BUNDLE_MIME: &str = "application/x-avatar";
const SIGNATURE_MIME: &str = "application/octet-stream";
const DEFAULT_UNITY_VERSION: &str = "2022.3.6f1";
const MULTIPART_CONCURRENCY: usize = 4;

/// Credentials good for one publication session: a username (for the
/// credential store key) and the cookie jar proving authentication.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    pub username: String,
    pub cookies: CookieJar,
}

/// Result of attempting password login: either fully authenticated, or
/// paused awaiting a 2FA code, mirroring the session login state machine in
/// SPEC_FULL.md §4.6 ("Session login state").
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(SessionCredentials),
    AwaitingTwoFactor {
        kind: TwoFactorKind,
        auth_cookie: String,
    },
}

/// `Anonymous → AwaitingCredentials`: attempt a password login.
pub async fn login(
    client: &ServiceClient,
    username: &str,
    password: &str,
) -> Result<LoginOutcome, PublishError> {
    let (outcome, cookies) = client
        .get_user(Some((username, password)), &CookieJar::default())
        .await?;

    match outcome {
        GetUserOutcome::User(_) => {
            let credentials = SessionCredentials {
                username: username.to_string(),
                cookies,
            };
            persist_session(&credentials)?;
            Ok(LoginOutcome::Authenticated(credentials))
        }
        GetUserOutcome::TwoFactorRequired { kind, auth_cookie } => {
            Ok(LoginOutcome::AwaitingTwoFactor { kind, auth_cookie })
        }
        GetUserOutcome::InvalidCredentials => Err(AuthError::InvalidCredentials.into()),
    }
}

/// `AwaitingTwoFactor → Authenticated`: submit a 2FA code and confirm the
/// resulting session is accepted.
pub async fn complete_two_factor(
    client: &ServiceClient,
    username: &str,
    auth_cookie: &str,
    kind: TwoFactorKind,
    code: &str,
) -> Result<SessionCredentials, PublishError> {
    let two_factor_auth = client.verify_two_factor(auth_cookie, kind, code).await?;
    let cookies = CookieJar::new(Some(auth_cookie.to_string()), Some(two_factor_auth));

    let (outcome, _) = client.get_user(None, &cookies).await?;
    match outcome {
        GetUserOutcome::User(_) => {
            let credentials = SessionCredentials {
                username: username.to_string(),
                cookies,
            };
            persist_session(&credentials)?;
            Ok(credentials)
        }
        _ => Err(AuthError::TwoFactorFailed.into()),
    }
}

fn persist_session(credentials: &SessionCredentials) -> Result<(), PublishError> {
    CredentialStore::new()
        .save_session(&credentials.username, &credentials.cookies)
        .map_err(PublishError::from)
}

/// `publish(bundle, credentials, sink)` — the crate's single high-level
/// entry point (SPEC_FULL.md §1). Unpacks `archive_path`, drives the state
/// machine in §4.6, and guarantees the unpack directory is removed on every
/// exit path.
pub async fn publish(
    client: &ServiceClient,
    archive_path: impl AsRef<Path>,
    credentials: &SessionCredentials,
    sink: &ProgressSink,
    cancel: &CancellationToken,
) -> Result<Avatar, PublishError> {
    let bundle = archive::unpack_bundle(archive_path).await?;
    let result = run_publication(client, &bundle, credentials, sink, cancel).await;
    bundle.close();

    if let Err(e) = &result {
        if !matches!(e, PublishError::Cancelled) {
            let _ = sink.send(ProgressEvent::Error {
                msg: e.user_message(),
            });
        }
    }
    result
}

async fn run_publication(
    client: &ServiceClient,
    bundle: &archive::UnpackedBundle,
    credentials: &SessionCredentials,
    sink: &ProgressSink,
    cancel: &CancellationToken,
) -> Result<Avatar, PublishError> {
    let cookies = &credentials.cookies;
    let manifest = &bundle.manifest;

    check_cancelled(cancel)?;
    let _ = sink.send(ProgressEvent::Init);
    let existing_avatar = client.get_avatar(cookies, &manifest.blueprint_id).await?;

    check_cancelled(cancel)?;
    let _ = sink.send(ProgressEvent::Thumbnail);
    let thumbnail_reuse = existing_avatar
        .as_ref()
        .and_then(|a| parse_file_id(&a.thumbnail_image_url));
    let image_url = upload_file_to_service(
        client,
        cookies,
        "thumbnail",
        &bundle.thumbnail_path,
        THUMBNAIL_MIME,
        "png",
        thumbnail_reuse,
        manifest.tags.clone(),
        Arc::new(|_, _| {}),
    )
    .await?;

    check_cancelled(cancel)?;
    let mut avatar = match &existing_avatar {
        Some(existing) => {
            client
                .update_avatar(
                    cookies,
                    &existing.id,
                    UpdateAvatarBody {
                        name: Some(manifest.name.clone()),
                        image_url: Some(image_url.clone()),
                        ..Default::default()
                    },
                )
                .await?
        }
        None => {
            client
                .create_avatar(
                    cookies,
                    CreateAvatarBody {
                        id: manifest.blueprint_id.clone(),
                        name: manifest.name.clone(),
                        image_url: image_url.clone(),
                        release_status: "private".to_string(),
                        unity_version: DEFAULT_UNITY_VERSION.to_string(),
                    },
                )
                .await?
        }
    };

    check_cancelled(cancel)?;
    let _ = sink.send(ProgressEvent::Waiting);
    let total_platforms = bundle.payloads.len();
    let ready = transcode_ready_in_completion_order(bundle).await?;

    for (platform_index, payload) in ready.into_iter().enumerate() {
        check_cancelled(cancel)?;

        let token = payload.platform.service_token();
        let reuse_file_id = existing_avatar
            .as_ref()
            .and_then(|a| a.standard_package_for(token))
            .and_then(|p| parse_file_id(&p.asset_url));

        let sink_for_progress = sink.clone();
        let on_progress: upload::ProgressFn = Arc::new(move |part, total_parts| {
            let _ = sink_for_progress.send(ProgressEvent::Bundle {
                part,
                total_parts,
                platform_index,
                total_platforms,
            });
        });

        let entry = manifest
            .asset_bundles
            .get(payload.platform)
            .expect("ready payload's platform is always declared in the manifest");

        let asset_url = upload_file_to_service(
            client,
            cookies,
            &payload.platform.to_string(),
            &payload.path,
            BUNDLE_MIME,
            "vrca",
            reuse_file_id,
            manifest.tags.clone(),
            on_progress,
        )
        .await?;

        check_cancelled(cancel)?;
        avatar = client
            .update_avatar(
                cookies,
                &avatar.id,
                UpdateAvatarBody {
                    asset_url: Some(asset_url),
                    platform: Some(token.to_string()),
                    unity_version: Some(entry.unity_version.clone()),
                    asset_version: Some(1),
                    ..Default::default()
                },
            )
            .await?;
    }

    let _ = sink.send(ProgressEvent::Completed);
    Ok(avatar)
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), PublishError> {
    if cancel.is_cancelled() {
        Err(PublishError::Cancelled)
    } else {
        Ok(())
    }
}

/// Kick off a transcode task per envelope-form payload and yield every ready
/// platform (transcoded or already-canonical) in completion order via a
/// `FuturesUnordered` completion queue, per the "promise race" design note.
async fn transcode_ready_in_completion_order(
    bundle: &archive::UnpackedBundle,
) -> Result<Vec<PlatformPayload>, PublishError> {
    let mut queue: FuturesUnordered<
        std::pin::Pin<Box<dyn std::future::Future<Output = Result<PlatformPayload, PublishError>> + Send>>,
    > = FuturesUnordered::new();

    for payload in &bundle.payloads {
        let payload = payload.clone();
        if payload.compressed {
            queue.push(Box::pin(async move {
                let canonical_path = canonical_path_for(&payload.path);
                transcode::transcode(&payload.path, &canonical_path).await?;
                Ok(PlatformPayload {
                    platform: payload.platform,
                    path: canonical_path,
                    compressed: false,
                })
            }));
        } else {
            queue.push(Box::pin(async move { Ok(payload) }));
        }
    }

    let mut ready = Vec::with_capacity(bundle.payloads.len());
    while let Some(result) = queue.next().await {
        ready.push(result?);
    }
    Ok(ready)
}

fn canonical_path_for(envelope_path: &Path) -> PathBuf {
    envelope_path.with_extension("vrca")
}

/// `uploadFileToVRChat` — SPEC_FULL.md §4.6 "File upload internals": digest,
/// sign, reconcile the file's version history, create a version, upload the
/// payload and signature concurrently, then resolve the final asset URL.
#[allow(clippy::too_many_arguments)]
async fn upload_file_to_service(
    client: &ServiceClient,
    cookies: &CookieJar,
    name: &str,
    path: &Path,
    mime_type: &str,
    extension: &str,
    reuse_file_id: Option<String>,
    tags: Vec<String>,
    on_bundle_progress: upload::ProgressFn,
) -> Result<String, PublishError> {
    let file_digest = digest::md5_file(path).await?;

    let sig_path = PathBuf::from(format!("{}.sig", path.display()));
    signature::generate_signature(path, &sig_path).await?;
    let sig_digest = digest::md5_file(&sig_path).await?;

    let file_id = match reuse_file_id {
        Some(id) => id,
        None => {
            client
                .create_file(cookies, name, mime_type, extension, tags)
                .await?
                .id
        }
    };

    reconcile_latest_version(client, cookies, &file_id).await?;

    let record = client
        .create_file_version(
            cookies,
            &file_id,
            CreateFileVersionBody {
                file_md5: file_digest.hex(),
                file_size_in_bytes: file_digest.size,
                signature_md5: sig_digest.hex(),
                signature_size_in_bytes: sig_digest.size,
            },
        )
        .await?;
    let version = record
        .latest_version()
        .expect("createFileVersion always appends a version")
        .clone();

    let user_agent = client.user_agent().to_string();

    let file_upload = upload_payload(
        client,
        cookies,
        &file_id,
        version.version,
        Subresource::File,
        &path.to_path_buf(),
        mime_type,
        &file_digest,
        version.category,
        &user_agent,
        on_bundle_progress,
    );
    let signature_upload = upload_payload(
        client,
        cookies,
        &file_id,
        version.version,
        Subresource::Signature,
        &sig_path,
        SIGNATURE_MIME,
        &sig_digest,
        UploadCategory::Simple,
        &user_agent,
        Arc::new(|_, _| {}),
    );

    tokio::try_join!(file_upload, signature_upload)?;

    let final_record = client.show_file(cookies, &file_id).await?;
    final_record
        .versions
        .iter()
        .find(|v| v.version == version.version)
        .and_then(|v| v.file.as_ref())
        .and_then(|f| f.url.clone())
        .ok_or_else(|| {
            crate::client::ServiceError::Unexpected {
                status: 0,
                body: "finished file version carries no file URL".to_string(),
            }
            .into()
        })
}

async fn reconcile_latest_version(
    client: &ServiceClient,
    cookies: &CookieJar,
    file_id: &str,
) -> Result<(), PublishError> {
    let record = client.show_file(cookies, file_id).await?;
    if let Some(latest) = record.latest_version() {
        if latest.status != VersionStatus::Complete {
            client
                .delete_file_version(cookies, file_id, latest.version)
                .await?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn upload_payload(
    client: &ServiceClient,
    cookies: &CookieJar,
    file_id: &str,
    version_id: u32,
    subresource: Subresource,
    path: &Path,
    mime_type: &str,
    file_digest: &digest::FileDigest,
    category: UploadCategory,
    user_agent: &str,
    on_progress: upload::ProgressFn,
) -> Result<(), PublishError> {
    match category {
        UploadCategory::Simple => {
            let url = client
                .start_file_upload(cookies, file_id, version_id, subresource, None)
                .await?;
            upload::upload_simple(
                client.http_client(),
                &url,
                path,
                mime_type,
                &file_digest.base64(),
                user_agent,
                on_progress,
            )
            .await?;
            client
                .finish_file_upload(cookies, file_id, version_id, subresource, None)
                .await?;
        }
        UploadCategory::Multipart => {
            let part_count = upload::part_count(file_digest.size);
            let mut urls = Vec::with_capacity(part_count as usize);
            for part_number in 1..=part_count {
                let url = client
                    .start_file_upload(
                        cookies,
                        file_id,
                        version_id,
                        subresource,
                        Some(part_number as u32),
                    )
                    .await?;
                urls.push(url);
            }
            let etags = upload::upload_multipart(
                client.http_client(),
                MultipartUrls { urls: &urls },
                path,
                mime_type,
                user_agent,
                MULTIPART_CONCURRENCY,
                on_progress,
            )
            .await?;
            client
                .finish_file_upload(cookies, file_id, version_id, subresource, Some(etags))
                .await?;
        }
        UploadCategory::Queued => {
            return Err(crate::upload::UploadError::UnsupportedCategory(category).into());
        }
    }
    Ok(())
}
