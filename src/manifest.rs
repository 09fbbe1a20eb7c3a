//! Bundle manifest schema (`metadata.json` inside a `.3b` archive).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Android,
    Ios,
}

impl Platform {
    /// The Service's platform token, used in `updateAvatar` patches.
    pub fn service_token(self) -> &'static str {
        match self {
            Platform::Windows => "standalonewindows",
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }

    pub fn file_stem(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Performance {
    Excellent,
    Good,
    Medium,
    Poor,
    Verypoor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBundleEntry {
    pub performance: Performance,
    #[serde(rename = "unityVersion")]
    pub unity_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBundles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows: Option<AssetBundleEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android: Option<AssetBundleEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ios: Option<AssetBundleEntry>,
}

impl AssetBundles {
    pub fn get(&self, platform: Platform) -> Option<&AssetBundleEntry> {
        match platform {
            Platform::Windows => self.windows.as_ref(),
            Platform::Android => self.android.as_ref(),
            Platform::Ios => self.ios.as_ref(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Platform, &AssetBundleEntry)> {
        [
            (Platform::Windows, &self.windows),
            (Platform::Android, &self.android),
            (Platform::Ios, &self.ios),
        ]
        .into_iter()
        .filter_map(|(p, e)| e.as_ref().map(|e| (p, e)))
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_none() && self.android.is_none() && self.ios.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub name: String,
    #[serde(rename = "blueprintId")]
    pub blueprint_id: String,
    #[serde(rename = "assetBundles")]
    pub asset_bundles: AssetBundles,
    /// Free-form tags, passed through to `createFile` when present. Not
    /// produced by the reference exporter today but part of the Service's
    /// `createFile` body schema (§6), so kept as an optional field rather
    /// than dropped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestParseError {
    #[error("manifest is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("manifest name must be non-empty")]
    EmptyName,
    #[error("manifest blueprintId must be non-empty")]
    EmptyBlueprintId,
    #[error("manifest declares no platforms in assetBundles")]
    NoPlatforms,
}

impl BundleManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, ManifestParseError> {
        let manifest: BundleManifest = serde_json::from_slice(bytes)?;
        if manifest.name.is_empty() {
            return Err(ManifestParseError::EmptyName);
        }
        if manifest.blueprint_id.is_empty() {
            return Err(ManifestParseError::EmptyBlueprintId);
        }
        if manifest.asset_bundles.is_empty() {
            return Err(ManifestParseError::NoPlatforms);
        }
        Ok(manifest)
    }
}
