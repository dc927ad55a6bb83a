// Wire types for the gallery HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public URL prefix under which stored uploads are served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

/// Public URL of a stored upload.
pub fn upload_url(filename: &str) -> String {
    format!("{UPLOADS_URL_PREFIX}/{filename}")
}

/// One file accepted by `POST /api/upload`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub filename: String,
    pub url: String,
    pub original_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub success: bool,
    pub files: Vec<UploadedFile>,
    pub message: String,
}

impl UploadResponse {
    pub fn new(files: Vec<UploadedFile>) -> Self {
        let message = format!("{} file(s) uploaded successfully", files.len());
        Self { success: true, files, message }
    }
}

/// One entry of `GET /api/images`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageEntry {
    pub filename: String,
    pub url: String,
}

impl ImageEntry {
    pub fn new(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let url = upload_url(&filename);
        Self { filename, url }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageListResponse {
    pub success: bool,
    pub images: Vec<ImageEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResponse {
    pub success: bool,
    pub filename: String,
}

/// Response of the manual save trigger. `success` reports whether the
/// trigger was accepted, not whether a commit happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveTriggerResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AutoSaveStatus {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub environment: Environment,
    pub images: usize,
    pub auto_save: AutoSaveStatus,
    pub interval: String,
    pub storage: String,
    pub timestamp: DateTime<Utc>,
}
