//! Wire types for the Service's REST surface (SPEC_FULL.md §6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subresource {
    File,
    Signature,
    Delta,
}

impl Subresource {
    pub fn as_path_segment(self) -> &'static str {
        match self {
            Subresource::File => "file",
            Subresource::Signature => "signature",
            Subresource::Delta => "delta",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadCategory {
    Simple,
    Multipart,
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Waiting,
    Complete,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileVersion {
    pub version: u32,
    pub status: VersionStatus,
    pub category: UploadCategory,
    #[serde(default)]
    pub file: Option<FileDescriptor>,
    #[serde(default)]
    pub signature: Option<FileDescriptor>,
    #[serde(default)]
    pub delta: Option<FileDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "md5")]
    pub md5: Option<String>,
    #[serde(default, rename = "sizeInBytes")]
    pub size_in_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub versions: Vec<FileVersion>,
}

impl FileRecord {
    pub fn latest_version(&self) -> Option<&FileVersion> {
        self.versions.last()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateFileBody {
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub extension: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateFileVersionBody {
    #[serde(rename = "fileMd5")]
    pub file_md5: String,
    #[serde(rename = "fileSizeInBytes")]
    pub file_size_in_bytes: u64,
    #[serde(rename = "signatureMd5")]
    pub signature_md5: String,
    #[serde(rename = "signatureSizeInBytes")]
    pub signature_size_in_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartUploadResponse {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinishUploadBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarPlatformPackage {
    pub platform: String,
    pub variant: String,
    #[serde(rename = "assetUrl")]
    pub asset_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Avatar {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "imageUrl")]
    pub image_url: String,
    #[serde(default, rename = "thumbnailImageUrl")]
    pub thumbnail_image_url: String,
    #[serde(default, rename = "unityPackages")]
    pub unity_packages: Vec<AvatarPlatformPackage>,
}

impl Avatar {
    /// Find the standard-variant unity package for a platform, used by the
    /// file-reuse rule in SPEC_FULL.md §4.6 step 5.
    pub fn standard_package_for(&self, platform_token: &str) -> Option<&AvatarPlatformPackage> {
        self.unity_packages
            .iter()
            .find(|p| p.platform == platform_token && p.variant == "standard")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateAvatarBody {
    pub id: String,
    pub name: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    #[serde(rename = "releaseStatus")]
    pub release_status: String,
    #[serde(rename = "unityVersion")]
    pub unity_version: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateAvatarBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "assetUrl")]
    pub asset_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "unityVersion")]
    pub unity_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "assetVersion")]
    pub asset_version: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiresTwoFactorResponse {
    #[serde(rename = "requiresTwoFactorAuth")]
    pub requires_two_factor_auth: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoFactorKind {
    EmailOtp,
    Totp,
}

impl TwoFactorKind {
    pub fn from_api_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "emailotp" => Some(TwoFactorKind::EmailOtp),
            "totp" => Some(TwoFactorKind::Totp),
            _ => None,
        }
    }

    pub fn as_path_segment(self) -> &'static str {
        match self {
            TwoFactorKind::EmailOtp => "emailotp",
            TwoFactorKind::Totp => "totp",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyTwoFactorBody {
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyTwoFactorResponse {
    #[serde(default)]
    pub verified: bool,
}
