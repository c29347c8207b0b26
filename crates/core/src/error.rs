use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "E001")]
    Unknown,
    #[serde(rename = "E002")]
    Configuration,
    #[serde(rename = "E101")]
    FileNotFound,
    #[serde(rename = "E102")]
    PermissionDenied,
    #[serde(rename = "E105")]
    UnableToRead,
    #[serde(rename = "E106")]
    UnableToWrite,
    #[serde(rename = "E108")]
    FileFormat,
    #[serde(rename = "E501")]
    Parse,
    #[serde(rename = "E502")]
    Validation,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "E001",
            Self::Configuration => "E002",
            Self::FileNotFound => "E101",
            Self::PermissionDenied => "E102",
            Self::UnableToRead => "E105",
            Self::UnableToWrite => "E106",
            Self::FileFormat => "E108",
            Self::Parse => "E501",
            Self::Validation => "E502",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown error",
            Self::Configuration => "Configuration error",
            Self::FileNotFound => "File not found",
            Self::PermissionDenied => "Permission denied",
            Self::UnableToRead => "Unable to read file",
            Self::UnableToWrite => "Unable to write file",
            Self::FileFormat => "File format error",
            Self::Parse => "Parse error",
            Self::Validation => "Validation error",
        }
    }

    fn from_io(err: &io::Error, fallback: Self) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::FileNotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => fallback,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to snapshot {}: {source}", path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("invalid plan: {0}")]
    Plan(String),

    #[error("cannot rewrite: {0}")]
    Rewrite(String),
}

impl Error {
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Read { source, .. } => ErrorCode::from_io(source, ErrorCode::UnableToRead),
            Self::Write { source, .. } | Self::Backup { source, .. } => {
                ErrorCode::from_io(source, ErrorCode::UnableToWrite)
            }
            Self::Json { .. } => ErrorCode::FileFormat,
            Self::Config(_) => ErrorCode::Configuration,
            Self::Registry(_) => ErrorCode::Parse,
            Self::Plan(_) | Self::Rewrite(_) => ErrorCode::Validation,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub code: ErrorCode,
    pub description: &'static str,
    pub message: String,
    pub context: String,
    pub timestamp: String,
}

/// Persists one JSON file per reported failure under a fixed directory.
#[derive(Debug, Clone)]
pub struct IncidentLog {
    dir: PathBuf,
}

impl IncidentLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record(&self, err: &Error, context: &str) -> io::Result<PathBuf> {
        let now = chrono::Local::now();
        let code = err.code();
        let incident = Incident {
            code,
            description: code.description(),
            message: err.to_string(),
            context: context.to_string(),
            timestamp: now.to_rfc3339(),
        };

        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!(
            "{}_{}_{}.json",
            code.as_str(),
            now.format("%Y%m%d_%H%M%S"),
            now.timestamp_subsec_micros()
        ));
        let json = serde_json::to_string_pretty(&incident).map_err(io::Error::other)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}
