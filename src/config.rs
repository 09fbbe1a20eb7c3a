//! Process-wide immutable configuration, populated once at startup.
//!
//! Mirrors the "one-time global config" idiom from the daemon side of the
//! pack (a single record built once and read everywhere afterwards) rather
//! than threading a config struct through every call site.

use std::sync::OnceLock;

pub const SERVICE_BASE_URL: &str = "https://api.vrchat.cloud/api/1";

/// Multipart part size: fixed at 10 MiB per the Service's contract.
pub const MULTIPART_PART_SIZE: u64 = 10 * 1024 * 1024;

/// Credential-store service name used as the first component of the
/// `("ThirdUploader", username)` keyring entry key.
pub const KEYRING_SERVICE: &str = "ThirdUploader";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub user_agent: String,
    pub base_url: String,
    pub control_plane_timeout: std::time::Duration,
}

impl AppConfig {
    fn new(version: &str, contact: &str) -> Self {
        Self {
            user_agent: format!("Third Uploader/{version} {contact}"),
            base_url: SERVICE_BASE_URL.to_string(),
            control_plane_timeout: std::time::Duration::from_secs(60),
        }
    }
}

static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Populate the global config. Safe to call more than once; only the first
/// call takes effect, matching `OnceLock`'s semantics.
pub fn init(version: &str, contact: &str) {
    let _ = APP_CONFIG.set(AppConfig::new(version, contact));
}

/// Read the global config, falling back to build-metadata defaults if
/// [`init`] was never called (e.g. in unit tests that exercise a single
/// component without going through the whole crate's entry point).
pub fn get() -> &'static AppConfig {
    APP_CONFIG.get_or_init(|| AppConfig::new(env!("CARGO_PKG_VERSION"), "support@example.com"))
}
