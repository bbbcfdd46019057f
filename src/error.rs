use std::path::PathBuf;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum TleError {
    #[error("invalid catalog id: {0}")]
    InvalidCatalogId(String),

    #[error("invalid owner id: {0:?}")]
    InvalidOwnerId(String),

    #[error("invalid tracked object specifier: {0}")]
    InvalidSpecifier(String),

    #[error("malformed element set: {0}")]
    InvalidElementSet(String),

    #[error("invalid epoch in line 1: {0}")]
    InvalidEpoch(String),

    #[error("orbital parameters could not be derived for catalog id {0}")]
    DerivationFailed(String),

    #[error("catalog credentials missing (set SPACETRACK_USERNAME and SPACETRACK_PASSWORD)")]
    #[diagnostic(help("credentials may also be given in the `credentials` block of tle-sync.json"))]
    MissingCredentials,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("catalog login rejected: {0}")]
    LoginRejected(String),

    #[error("catalog session is not authorized: {0}")]
    Unauthorized(String),

    #[error("catalog throttled the request")]
    Throttled,

    #[error("catalog requests are paused until {until}")]
    CoolingDown { until: DateTime<Utc> },

    #[error("catalog returned no element set for catalog id {0}")]
    NoElementSet(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("tracked object not found: {0}")]
    ObjectNotFound(String),

    #[error("sync abandoned after {attempts} attempts: {error}")]
    SyncAbandoned { attempts: u32, error: String },
}

impl TleError {
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            TleError::CatalogHttp(_)
                | TleError::CatalogStatus { .. }
                | TleError::LoginRejected(_)
                | TleError::Unauthorized(_)
                | TleError::Throttled
                | TleError::CoolingDown { .. }
                | TleError::NoElementSet(_)
        )
    }
}
