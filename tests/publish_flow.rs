//! End-to-end coverage of the publication state machine against a mocked
//! Service, corresponding to the literal scenarios in SPEC_FULL.md §8.

use std::io::Write;

use third_uploader_core::client::cookie::CookieJar;
use third_uploader_core::client::models::TwoFactorKind;
use third_uploader_core::client::ServiceClient;
use third_uploader_core::config::AppConfig;
use third_uploader_core::credentials::CredentialStore;
use third_uploader_core::orchestrator::{self, LoginOutcome, SessionCredentials};
use third_uploader_core::progress::{self, ProgressEvent};

fn build_bundle_archive(blueprint_id: &str) -> tempfile::NamedTempFile {
    build_bundle_archive_with_payload(blueprint_id, b"fake-canonical-bundle-bytes")
}

fn build_bundle_archive_with_payload(blueprint_id: &str, payload: &[u8]) -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().unwrap();
    let manifest = format!(
        r#"{{"name":"Alice","blueprintId":"{blueprint_id}","assetBundles":{{"windows":{{"performance":"good","unityVersion":"2022.3.6f1"}}}}}}"#
    );

    let mut zip = zip::ZipWriter::new(file.reopen().unwrap());
    let options = zip::write::SimpleFileOptions::default();

    zip.start_file("metadata.json", options).unwrap();
    zip.write_all(manifest.as_bytes()).unwrap();

    zip.start_file("thumbnail.png", options).unwrap();
    zip.write_all(b"fake-png-bytes").unwrap();

    zip.start_file("windows.vrca", options).unwrap();
    zip.write_all(payload).unwrap();

    zip.finish().unwrap();
    file
}

fn test_client(server_url: &str) -> ServiceClient {
    let cfg = Box::leak(Box::new(AppConfig {
        user_agent: "Third Uploader/test test@example.com".to_string(),
        base_url: server_url.to_string(),
        control_plane_timeout: std::time::Duration::from_secs(5),
    }));
    ServiceClient::new(cfg).unwrap()
}

fn test_credentials() -> SessionCredentials {
    SessionCredentials {
        username: "alice".to_string(),
        cookies: CookieJar::new(Some("auth-cookie".to_string()), Some("2fa-cookie".to_string())),
    }
}

/// Mocks the whole `createFile -> createFileVersion -> start/finish x2 ->
/// showFile` sequence generically under one `file_id`: both the thumbnail
/// and the bundle upload exercise the same routes, which is sufficient to
/// exercise the orchestrator's control flow without needing the mock server
/// to disambiguate which logical file a request belongs to.
async fn mock_file_lifecycle(server: &mut mockito::ServerGuard, file_id: &str, asset_url: &str) {
    let sig_upload_url = format!("{}/sig-upload", server.url());
    let file_upload_url = format!("{}/file-upload", server.url());

    server
        .mock("POST", "/file")
        .with_status(200)
        .with_body(format!(r#"{{"id":"{file_id}","versions":[]}}"#))
        .create_async()
        .await;

    server
        .mock("GET", format!("/file/{file_id}").as_str())
        .with_status(200)
        .with_body(format!(
            r#"{{"id":"{file_id}","versions":[{{"version":1,"status":"complete","category":"simple","file":{{"url":"{asset_url}"}}}}]}}"#
        ))
        .create_async()
        .await;

    server
        .mock("POST", format!("/file/{file_id}").as_str())
        .with_status(200)
        .with_body(
            r#"{"id":"file_x","versions":[{"version":1,"status":"waiting","category":"simple"}]}"#,
        )
        .create_async()
        .await;

    server
        .mock("PUT", format!("/file/{file_id}/1/signature/start").as_str())
        .with_status(200)
        .with_body(format!(r#"{{"url":"{sig_upload_url}"}}"#))
        .create_async()
        .await;

    server
        .mock("PUT", format!("/file/{file_id}/1/file/start").as_str())
        .with_status(200)
        .with_body(format!(r#"{{"url":"{file_upload_url}"}}"#))
        .create_async()
        .await;

    server.mock("PUT", "/sig-upload").with_status(200).create_async().await;
    server.mock("PUT", "/file-upload").with_status(200).create_async().await;

    server
        .mock("PUT", format!("/file/{file_id}/1/signature/finish").as_str())
        .with_status(200)
        .with_body(format!(r#"{{"id":"{file_id}","versions":[{{"version":1,"status":"complete","category":"simple"}}]}}"#))
        .create_async()
        .await;

    server
        .mock("PUT", format!("/file/{file_id}/1/file/finish").as_str())
        .with_status(200)
        .with_body(format!(r#"{{"id":"{file_id}","versions":[{{"version":1,"status":"complete","category":"simple"}}]}}"#))
        .create_async()
        .await;
}

#[tokio::test]
async fn fresh_avatar_single_platform_simple_upload() {
    let mut server = mockito::Server::new_async().await;
    let blueprint_id = "avtr_00000000-0000-0000-0000-000000000001";

    server
        .mock("GET", format!("/avatars/{blueprint_id}").as_str())
        .with_status(404)
        .create_async()
        .await;

    mock_file_lifecycle(&mut server, "file_x", "https://files.example/file_x/1/file").await;

    server
        .mock("POST", "/avatars")
        .with_status(200)
        .with_body(format!(
            r#"{{"id":"{blueprint_id}","name":"Alice","imageUrl":"","thumbnailImageUrl":"","unityPackages":[]}}"#
        ))
        .create_async()
        .await;

    server
        .mock("PUT", format!("/avatars/{blueprint_id}").as_str())
        .with_status(200)
        .with_body(format!(
            r#"{{"id":"{blueprint_id}","name":"Alice","imageUrl":"","thumbnailImageUrl":"","unityPackages":[]}}"#
        ))
        .create_async()
        .await;

    let client = test_client(&server.url());
    let archive = build_bundle_archive(blueprint_id);
    let credentials = test_credentials();

    let (sink, mut stream) = progress::channel();
    let cancel = tokio_util::sync::CancellationToken::new();

    let publish_task = tokio::spawn(async move {
        orchestrator::publish(&client, archive.path().to_path_buf(), &credentials, &sink, &cancel).await
    });

    let mut events = Vec::new();
    while let Some(event) = stream.recv().await {
        events.push(event);
    }

    let avatar = publish_task.await.unwrap().unwrap();
    assert_eq!(avatar.id, blueprint_id);

    assert!(matches!(events.first(), Some(ProgressEvent::Init)));
    assert!(events.contains(&ProgressEvent::Thumbnail));
    assert!(events.contains(&ProgressEvent::Waiting));
    assert!(matches!(events.last(), Some(ProgressEvent::Completed)));
    assert!(events.iter().any(|e| matches!(e, ProgressEvent::Bundle { .. })));
}

/// Scenario 2: an existing avatar with a `standalonewindows` standard
/// package reuses that file id instead of calling `createFile`, and
/// `updateAvatar` is used in place of `createAvatar`.
#[tokio::test]
async fn existing_avatar_reuses_file_id_and_updates_instead_of_creating() {
    let mut server = mockito::Server::new_async().await;
    let blueprint_id = "avtr_00000000-0000-0000-0000-000000000002";
    let asset_url = "https://files.example/file_x/1/file";

    server
        .mock("GET", format!("/avatars/{blueprint_id}").as_str())
        .with_status(200)
        .with_body(format!(
            r#"{{"id":"{blueprint_id}","name":"Alice","imageUrl":"","thumbnailImageUrl":"","unityPackages":[{{"platform":"standalonewindows","variant":"standard","assetUrl":"{asset_url}"}}]}}"#
        ))
        .create_async()
        .await;

    // Thumbnail upload is not reused (thumbnailImageUrl is empty) and lands
    // on the same `file_x` routes as the reused bundle file, mirroring how
    // scenario 1 already drives both uploads through one mocked file.
    mock_file_lifecycle(&mut server, "file_x", asset_url).await;

    server
        .mock("PUT", format!("/avatars/{blueprint_id}").as_str())
        .with_status(200)
        .with_body(format!(
            r#"{{"id":"{blueprint_id}","name":"Alice","imageUrl":"","thumbnailImageUrl":"","unityPackages":[]}}"#
        ))
        .create_async()
        .await;
    // No `POST /avatars` mock is registered: if the orchestrator wrongly
    // called `createAvatar` instead of `updateAvatar`, the unmatched
    // request would 501 and the publish would fail.

    let client = test_client(&server.url());
    let archive = build_bundle_archive(blueprint_id);
    let credentials = test_credentials();

    let (sink, mut stream) = progress::channel();
    let cancel = tokio_util::sync::CancellationToken::new();

    let publish_task = tokio::spawn(async move {
        orchestrator::publish(&client, archive.path().to_path_buf(), &credentials, &sink, &cancel).await
    });

    while stream.recv().await.is_some() {}

    let avatar = publish_task.await.unwrap().unwrap();
    assert_eq!(avatar.id, blueprint_id);
}

/// Scenario 3: a 30 MiB bundle whose `createFileVersion` response reports
/// `category="multipart"` uploads in exactly 3 parts of 10 MiB each.
#[tokio::test]
async fn multipart_upload_at_boundary_uploads_exactly_three_parts() {
    let mut server = mockito::Server::new_async().await;
    let blueprint_id = "avtr_00000000-0000-0000-0000-000000000003";

    server
        .mock("GET", format!("/avatars/{blueprint_id}").as_str())
        .with_status(404)
        .create_async()
        .await;

    // Thumbnail: a fresh, simple-category file.
    server
        .mock("POST", "/file")
        .match_body(mockito::Matcher::PartialJsonString(r#"{"name":"thumbnail"}"#.to_string()))
        .with_status(200)
        .with_body(r#"{"id":"file_thumb","versions":[]}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/file/file_thumb")
        .with_status(200)
        .with_body(r#"{"id":"file_thumb","versions":[{"version":1,"status":"complete","category":"simple","file":{"url":"https://files.example/file_thumb/1/file"}}]}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/file/file_thumb")
        .with_status(200)
        .with_body(r#"{"id":"file_thumb","versions":[{"version":1,"status":"waiting","category":"simple"}]}"#)
        .create_async()
        .await;
    server
        .mock("PUT", "/file/file_thumb/1/signature/start")
        .with_status(200)
        .with_body(format!(r#"{{"url":"{}/thumb-sig-upload"}}"#, server.url()))
        .create_async()
        .await;
    server
        .mock("PUT", "/file/file_thumb/1/file/start")
        .with_status(200)
        .with_body(format!(r#"{{"url":"{}/thumb-file-upload"}}"#, server.url()))
        .create_async()
        .await;
    server.mock("PUT", "/thumb-sig-upload").with_status(200).create_async().await;
    server.mock("PUT", "/thumb-file-upload").with_status(200).create_async().await;
    server
        .mock("PUT", "/file/file_thumb/1/signature/finish")
        .with_status(200)
        .with_body(r#"{"id":"file_thumb","versions":[{"version":1,"status":"complete","category":"simple"}]}"#)
        .create_async()
        .await;
    server
        .mock("PUT", "/file/file_thumb/1/file/finish")
        .with_status(200)
        .with_body(r#"{"id":"file_thumb","versions":[{"version":1,"status":"complete","category":"simple"}]}"#)
        .create_async()
        .await;

    // Bundle: a fresh, multipart-category file.
    server
        .mock("POST", "/file")
        .match_body(mockito::Matcher::PartialJsonString(r#"{"name":"windows"}"#.to_string()))
        .with_status(200)
        .with_body(r#"{"id":"file_bundle","versions":[]}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/file/file_bundle")
        .with_status(200)
        .with_body(r#"{"id":"file_bundle","versions":[{"version":1,"status":"complete","category":"multipart","file":{"url":"https://files.example/file_bundle/1/file"}}]}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/file/file_bundle")
        .with_status(200)
        .with_body(r#"{"id":"file_bundle","versions":[{"version":1,"status":"waiting","category":"multipart"}]}"#)
        .create_async()
        .await;

    server
        .mock("PUT", "/file/file_bundle/1/signature/start")
        .with_status(200)
        .with_body(format!(r#"{{"url":"{}/bundle-sig-upload"}}"#, server.url()))
        .create_async()
        .await;
    server.mock("PUT", "/bundle-sig-upload").with_status(200).create_async().await;
    server
        .mock("PUT", "/file/file_bundle/1/signature/finish")
        .with_status(200)
        .with_body(r#"{"id":"file_bundle","versions":[{"version":1,"status":"complete","category":"multipart"}]}"#)
        .create_async()
        .await;

    for (part_number, etag) in [(1, "etag-one"), (2, "etag-two"), (3, "etag-three")] {
        server
            .mock("PUT", "/file/file_bundle/1/file/start")
            .match_query(mockito::Matcher::UrlEncoded("partNumber".into(), part_number.to_string()))
            .with_status(200)
            .with_body(format!(r#"{{"url":"{}/bundle-part-{part_number}"}}"#, server.url()))
            .create_async()
            .await;
        server
            .mock("PUT", format!("/bundle-part-{part_number}").as_str())
            .with_status(200)
            .with_header("ETag", &format!("\"{etag}\""))
            .create_async()
            .await;
    }

    let finish_body_mock = server
        .mock("PUT", "/file/file_bundle/1/file/finish")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"etags":["etag-one","etag-two","etag-three"]}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"id":"file_bundle","versions":[{"version":1,"status":"complete","category":"multipart"}]}"#)
        .create_async()
        .await;

    server
        .mock("POST", "/avatars")
        .with_status(200)
        .with_body(format!(
            r#"{{"id":"{blueprint_id}","name":"Alice","imageUrl":"","thumbnailImageUrl":"","unityPackages":[]}}"#
        ))
        .create_async()
        .await;
    server
        .mock("PUT", format!("/avatars/{blueprint_id}").as_str())
        .with_status(200)
        .with_body(format!(
            r#"{{"id":"{blueprint_id}","name":"Alice","imageUrl":"","thumbnailImageUrl":"","unityPackages":[]}}"#
        ))
        .create_async()
        .await;

    let client = test_client(&server.url());
    const THIRTY_MIB: usize = 30 * 1024 * 1024;
    let payload = vec![7u8; THIRTY_MIB];
    let archive = build_bundle_archive_with_payload(blueprint_id, &payload);
    let credentials = test_credentials();

    let (sink, mut stream) = progress::channel();
    let cancel = tokio_util::sync::CancellationToken::new();

    let publish_task = tokio::spawn(async move {
        orchestrator::publish(&client, archive.path().to_path_buf(), &credentials, &sink, &cancel).await
    });

    while stream.recv().await.is_some() {}

    let avatar = publish_task.await.unwrap().unwrap();
    assert_eq!(avatar.id, blueprint_id);
    finish_body_mock.assert_async().await;
}

/// Scenario 5: a password login that requires two-factor verification
/// pauses without persisting a session, and persists exactly one session
/// (both cookies) once the 2FA code is verified.
#[tokio::test]
async fn two_factor_login_persists_session_once_on_success() {
    keyring::set_default_credential_builder(keyring::mock::default_credential_builder());

    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", "/auth/user")
        .match_header("authorization", mockito::Matcher::Regex("^Basic ".to_string()))
        .with_status(200)
        .with_header("set-cookie", "auth=partial-cookie; Path=/")
        .with_body(r#"{"requiresTwoFactorAuth":["emailotp"]}"#)
        .create_async()
        .await;

    server
        .mock("POST", "/auth/twofactorauth/emailotp/verify")
        .with_status(200)
        .with_header("set-cookie", "twoFactorAuth=full-auth-cookie; Path=/")
        .create_async()
        .await;

    server
        .mock("GET", "/auth/user")
        .match_header("cookie", mockito::Matcher::Regex("auth=partial-cookie".to_string()))
        .with_status(200)
        .with_body(r#"{"id":"usr_1","username":"alice_2fa"}"#)
        .create_async()
        .await;

    let client = test_client(&server.url());
    let username = format!("scenario5-{}", std::process::id());

    let outcome = orchestrator::login(&client, &username, "hunter2").await.unwrap();
    let auth_cookie = match outcome {
        LoginOutcome::AwaitingTwoFactor { kind, auth_cookie } => {
            assert_eq!(kind, TwoFactorKind::EmailOtp);
            auth_cookie
        }
        LoginOutcome::Authenticated(_) => panic!("expected to pause for two-factor verification"),
    };
    assert_eq!(auth_cookie, "partial-cookie");

    assert!(
        CredentialStore::new().load_session(&username).is_err(),
        "no session should be persisted while awaiting a two-factor code"
    );

    let credentials = orchestrator::complete_two_factor(
        &client,
        &username,
        &auth_cookie,
        TwoFactorKind::EmailOtp,
        "123456",
    )
    .await
    .unwrap();

    assert_eq!(credentials.cookies.auth.as_deref(), Some("partial-cookie"));
    assert_eq!(credentials.cookies.two_factor_auth.as_deref(), Some("full-auth-cookie"));

    let stored = CredentialStore::new().load_session(&username).unwrap();
    assert_eq!(stored.auth, credentials.cookies.auth);
    assert_eq!(stored.two_factor_auth, credentials.cookies.two_factor_auth);
}

#[tokio::test]
async fn blueprint_conflict_surfaces_as_blueprint_id_taken() {
    let mut server = mockito::Server::new_async().await;
    let blueprint_id = "avtr_00000000-0000-0000-0000-000000000004";

    server
        .mock("GET", format!("/avatars/{blueprint_id}").as_str())
        .with_status(404)
        .create_async()
        .await;

    mock_file_lifecycle(&mut server, "file_x", "https://files.example/file_x/1/file").await;

    server.mock("POST", "/avatars").with_status(500).create_async().await;

    let client = test_client(&server.url());
    let archive = build_bundle_archive(blueprint_id);
    let credentials = test_credentials();

    let (sink, mut stream) = progress::channel();
    let cancel = tokio_util::sync::CancellationToken::new();

    let publish_task = tokio::spawn(async move {
        orchestrator::publish(&client, archive.path().to_path_buf(), &credentials, &sink, &cancel).await
    });

    while stream.recv().await.is_some() {}

    let err = publish_task.await.unwrap().unwrap_err();
    assert_eq!(
        err.user_message(),
        "The service rejected the request: blueprint ID already in use"
    );
}
