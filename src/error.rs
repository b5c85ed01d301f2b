use std::io;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("Could not store file {name}")]
    Failure {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    pub fn failure(name: impl Into<String>, source: io::Error) -> Self {
        StorageError::Failure {
            name: name.into(),
            source,
        }
    }
}

impl ResponseError for StorageError {
    fn status_code(&self) -> StatusCode {
        match self {
            StorageError::NotFound(_) => StatusCode::NOT_FOUND,
            StorageError::InvalidFileName(_) => StatusCode::BAD_REQUEST,
            StorageError::Failure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "message": self.to_string(),
        }))
    }
}
