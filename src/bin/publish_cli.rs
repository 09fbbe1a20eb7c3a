use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use third_uploader_core::client::models::TwoFactorKind;
use third_uploader_core::client::ServiceClient;
use third_uploader_core::orchestrator::{self, LoginOutcome};
use third_uploader_core::{config, progress, ProgressEvent};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .init();

    config::init(env!("CARGO_PKG_VERSION"), "support@example.com");

    let archive_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: publish-cli <bundle.3b>")?;
    let username = env::var("THIRD_UPLOADER_USERNAME").context("THIRD_UPLOADER_USERNAME not set")?;
    let password = env::var("THIRD_UPLOADER_PASSWORD").context("THIRD_UPLOADER_PASSWORD not set")?;

    let client = ServiceClient::new(config::get()).context("failed to build the service client")?;

    let credentials = match orchestrator::login(&client, &username, &password).await? {
        LoginOutcome::Authenticated(credentials) => credentials,
        LoginOutcome::AwaitingTwoFactor { kind, auth_cookie } => {
            let prompt = match kind {
                TwoFactorKind::EmailOtp => "email code",
                TwoFactorKind::Totp => "authenticator code",
            };
            info!("two-factor verification required ({prompt})");
            let code = prompt_for_code()?;
            orchestrator::complete_two_factor(&client, &username, &auth_cookie, kind, &code).await?
        }
    };

    let (sink, mut stream) = progress::channel();
    let cancel = tokio_util::sync::CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let publish_handle = tokio::spawn({
        let client_ref: &'static ServiceClient = Box::leak(Box::new(client));
        let cancel = cancel.clone();
        async move {
            orchestrator::publish(client_ref, archive_path, &credentials, &sink, &cancel).await
        }
    });

    while let Some(event) = stream.recv().await {
        log_event(&event);
    }

    match publish_handle.await.context("publish task panicked")? {
        Ok(avatar) => {
            info!("publication complete: {}", avatar.id);
            Ok(())
        }
        Err(e) => {
            error!("publication failed: {}", e.user_message());
            Err(e.into())
        }
    }
}

fn log_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::Init => info!("starting publication"),
        ProgressEvent::Thumbnail => info!("uploading thumbnail"),
        ProgressEvent::Waiting => info!("waiting for bundle transcodes"),
        ProgressEvent::Bundle {
            part,
            total_parts,
            platform_index,
            total_platforms,
        } => info!(
            "uploading bundle {}/{} (part {}/{})",
            platform_index + 1,
            total_platforms,
            part,
            total_parts
        ),
        ProgressEvent::Completed => info!("publication completed"),
        ProgressEvent::Error { msg } => error!("{msg}"),
    }
}

fn prompt_for_code() -> std::io::Result<String> {
    use std::io::Write;
    print!("Enter 2FA code: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
