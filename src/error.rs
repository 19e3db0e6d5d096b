use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Allure report directory not found: {}", .0.display())]
    ReportDirectoryNotFound(PathBuf),

    #[error("Can not generate Allure report, exit code: {}", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Generator { code: Option<i32> },

    #[error(
        "Archive '{name}' did not converge within {timeout:?}: local sha1 {expected}, stored {}",
        .actual.as_deref().unwrap_or("<missing>")
    )]
    DigestTimeout {
        name: String,
        expected: String,
        actual: Option<String>,
        timeout: Duration,
    },

    #[error("Node task failed: {0}")]
    Node(String),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GateError>;
