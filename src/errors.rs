use std::path::PathBuf;

use serde::Deserialize;

/// Errors raised while talking to Snowflake or its stage storage
#[derive(thiserror::Error, Debug)]
pub enum SnowflakeError {
    #[error(transparent)]
    Token(#[from] jwt_simple::Error),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error("Snowflake server error: {code}: {message}")]
    ServerError { code: String, message: String },
    #[error(transparent)]
    JSONError(#[from] serde_json::Error),
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error(transparent)]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Target has neither a password nor a private_key_path")]
    MissingCredentials,
    #[error("Stage encryption key has an unsupported length of {0} bytes")]
    EncryptionKey(usize),
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
    #[error("Stage storage rejected upload of {file}: HTTP {status}: {body}")]
    Storage {
        file: String,
        status: reqwest::StatusCode,
        body: String,
    },
}

pub type SnowflakeResult<T> = Result<T, SnowflakeError>;

/// Errors raised by the setup pipeline
#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error("dbt profiles file not found at {}", .0.display())]
    ProfileFileNotFound(PathBuf),
    #[error("Could not parse {}: {source}", .path.display())]
    ProfileParse {
        path: PathBuf,
        source: serde_yaml_ng::Error,
    },
    #[error("Invalid selection {input:?}: {}", selection_hint(.choices))]
    InvalidSelection { input: String, choices: usize },
    #[error("Profile '{profile}' has no target named '{target}'")]
    MissingTarget { profile: String, target: String },
    #[error("Target '{target}' of profile '{profile}' is malformed: {source}")]
    InvalidTarget {
        profile: String,
        target: String,
        source: serde_yaml_ng::Error,
    },
    #[error("Failed to download package from {url}. Status code: {status}")]
    DownloadFailed {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("Failed to connect to Snowflake: {0}")]
    ConnectionFailed(#[source] SnowflakeError),
    #[error("Failed to upload to stage: {0}")]
    UploadFailed(#[source] SnowflakeError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type SetupResult<T> = Result<T, SetupError>;

fn selection_hint(choices: &usize) -> String {
    match choices {
        0 => "there is nothing to choose from".to_owned(),
        n => format!("expected a number from 0 to {}", n - 1),
    }
}

/// The envelope every Snowflake session endpoint wraps its payload in
#[derive(Deserialize, Debug)]
pub struct SnowflakeWireResult<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub success: bool,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl<T> SnowflakeWireResult<T> {
    /// Convert from the custom wire format to a standard result
    ///
    /// A successful envelope without a payload is reported as a server error,
    /// since every endpoint used here answers with data.
    pub fn into_result(self) -> SnowflakeResult<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(SnowflakeError::ServerError {
                code: self.code.unwrap_or_else(|| "unknown".into()),
                message: self.message.unwrap_or_else(|| "no message".into()),
            }),
        }
    }
}
