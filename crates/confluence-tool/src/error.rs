//! Error kinds raised by the resolver, the page object and the API client
//!
//! They travel inside `anyhow::Error`; callers that care about the kind use
//! `downcast_ref`.

use std::path::PathBuf;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// The profile document was needed but could not be read or parsed.
    /// The underlying failure is kept as the source for `--debug` output.
    #[error("Config file missing: {}", .path.display())]
    Missing {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Profile not found in config file: {0}")]
    ProfileNotFound(String),

    #[error("A base URL is required to save a profile (use --baseurl)")]
    BaseUrlRequired,

    #[error("Empty password not allowed")]
    EmptyPassword,
}

#[derive(Error, Debug)]
pub enum PageError {
    #[error("Field not found: {0}")]
    FieldNotFound(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No base URL configured")]
    MissingBaseUrl,

    #[error("{method} {url} failed with status {status}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
    },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
