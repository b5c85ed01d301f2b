use serde::{Deserialize, Serialize};

/// Returned once per upload; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileResponse {
    pub file_name: String,
    pub file_download_uri: String,
    /// Content type declared by the client, not verified.
    pub file_type: Option<String>,
    pub size: u64,
}

impl UploadFileResponse {
    pub fn new(
        file_name: impl Into<String>,
        file_download_uri: impl Into<String>,
        file_type: Option<String>,
        size: u64,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            file_download_uri: file_download_uri.into(),
            file_type,
            size,
        }
    }
}
