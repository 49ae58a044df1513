//! Connection configuration
//!
//! A [`Connection`] is assembled from three layers, field by field:
//!
//! 1. explicit command line values (`--baseurl`, `--username`, `--password`)
//! 2. the named profile in `~/.confluence-tool.yaml` (`default` unless
//!    `--config NAME` is given)
//! 3. the secrets vault, for the password of `username` at `baseurl`
//!
//! The profile document only ever holds `baseurl` and `username`. Passwords
//! are written to the secret store under `("confluence-tool " + baseurl, username)`.

use anyhow::{bail, Context, Result};
use confluence_core::Paths;
use secrets::{SecretStore, Vault};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::error::ConfigError;

/// Profile used when none is named on the command line
pub const DEFAULT_PROFILE: &str = "default";

/// Prefix of the secret store service name; the base URL is appended
pub const SERVICE_PREFIX: &str = "confluence-tool ";

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Connection-related command line values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionArgs {
    pub baseurl: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Explicitly requested profile name
    pub profile: Option<String>,
    /// Alternative location of the profile document
    pub config_file: Option<PathBuf>,
    pub debug: bool,
}

/// One saved profile. There is deliberately no password field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseurl: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// The on-disk document: profile name -> profile
pub type ConfigDocument = BTreeMap<String, Profile>;

/// Effective connection settings after merging all layers
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Connection {
    pub baseurl: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Connection {
    /// Fill fields that are still unset from a saved profile
    fn overlay(&mut self, profile: &Profile) {
        if self.baseurl.is_none() {
            self.baseurl = profile.baseurl.clone();
        }
        if self.username.is_none() {
            self.username = profile.username.clone();
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("baseurl", &self.baseurl)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Secret store service name for a server
pub fn service_name(baseurl: &str) -> String {
    format!("{}{}", SERVICE_PREFIX, baseurl)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

/// Resolves connections and manages the profile document.
///
/// This is also the per-invocation context handed to command dispatch; the
/// top-level error handler asks it whether `--debug` is active.
pub struct Config<S: SecretStore = Vault> {
    args: ConnectionArgs,
    config_file: PathBuf,
    /// Loaded lazily on first need
    document: Option<ConfigDocument>,
    secrets: S,
}

impl Config<Vault> {
    /// Context using the standard paths and the encrypted vault
    pub fn new(args: ConnectionArgs) -> Self {
        let paths = Paths::new();
        let vault = Vault::new(&paths.secrets());
        Self::with_store(args, vault)
    }
}

impl<S: SecretStore> Config<S> {
    pub fn with_store(args: ConnectionArgs, secrets: S) -> Self {
        let config_file = args
            .config_file
            .clone()
            .unwrap_or_else(|| Paths::new().config_file());

        Self {
            args,
            config_file,
            document: None,
            secrets,
        }
    }

    pub fn args(&self) -> &ConnectionArgs {
        &self.args
    }

    pub fn debug(&self) -> bool {
        self.args.debug
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn secrets(&self) -> &S {
        &self.secrets
    }

    /// Name of the profile to read or write
    pub fn profile_name(&self) -> &str {
        self.args
            .profile
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_PROFILE)
    }

    /// The profile document, read from disk on first call.
    ///
    /// Read and parse failures are reported as [`ConfigError::Missing`].
    pub fn load_config_document(&mut self) -> Result<&mut ConfigDocument> {
        let document = match self.document.take() {
            Some(document) => document,
            None => read_document(&self.config_file).map_err(|source| {
                debug!(path = %self.config_file.display(), error = %source, "failed to load config file");
                ConfigError::Missing {
                    path: self.config_file.clone(),
                    source,
                }
            })?,
        };
        Ok(self.document.insert(document))
    }

    /// Merge command line values, the profile document and the secret store
    pub fn resolve_connection(&mut self) -> Result<Connection> {
        let mut connection = Connection {
            baseurl: non_empty(&self.args.baseurl),
            username: non_empty(&self.args.username),
            password: non_empty(&self.args.password),
        };

        // A named profile is read even when --baseurl was given; explicit
        // values still take precedence over it.
        if connection.baseurl.is_none() || non_empty(&self.args.profile).is_some() {
            let name = self.profile_name().to_string();
            let profile = self
                .load_config_document()?
                .get(&name)
                .cloned()
                .ok_or_else(|| ConfigError::ProfileNotFound(name.clone()))?;
            debug!(profile = %name, "using saved profile");
            connection.overlay(&profile);
        }

        if connection.password.is_none() {
            if let (Some(baseurl), Some(username)) = (&connection.baseurl, &connection.username) {
                connection.password = self
                    .secrets
                    .get_secret(&service_name(baseurl), username)
                    .context("Failed to read password from secret store")?;
            }
        }

        debug!(?connection, "resolved connection");
        Ok(connection)
    }

    /// Resolve the connection and build a client for it
    pub fn connect(&mut self) -> Result<ApiClient> {
        let connection = self.resolve_connection()?;
        ApiClient::new(&connection)
    }

    /// Profile names in the document
    pub fn profiles(&mut self) -> Result<Vec<String>> {
        Ok(self.load_config_document()?.keys().cloned().collect())
    }

    /// Save `--baseurl`/`--username` as the target profile.
    ///
    /// When a username is given the password is taken from `--password` or
    /// else from `prompt`, and stored in the secret store. The whole document
    /// is then written back to disk. Returns the path written.
    pub fn save_profile<F>(&mut self, prompt: F) -> Result<PathBuf>
    where
        F: FnOnce() -> Result<String>,
    {
        let Some(baseurl) = non_empty(&self.args.baseurl) else {
            bail!(ConfigError::BaseUrlRequired);
        };

        let profile = Profile {
            baseurl: Some(baseurl.clone()),
            username: non_empty(&self.args.username),
        };

        if let Some(username) = &profile.username {
            let password = match non_empty(&self.args.password) {
                Some(password) => password,
                None => prompt()?,
            };
            if password.is_empty() {
                bail!(ConfigError::EmptyPassword);
            }
            self.secrets
                .set_secret(&service_name(&baseurl), username, &password)
                .context("Failed to store password in secret store")?;
        }

        if self.document.is_none() {
            let document = match read_document(&self.config_file) {
                Ok(document) => document,
                Err(e) => {
                    if self.config_file.exists() {
                        warn!(path = %self.config_file.display(), error = %e, "config file unreadable, replacing it");
                    }
                    ConfigDocument::new()
                }
            };
            self.document = Some(document);
        }

        let name = self.profile_name().to_string();
        let document = self.document.get_or_insert_with(ConfigDocument::new);
        document.insert(name, profile);

        write_document(&self.config_file, document)?;
        Ok(self.config_file.clone())
    }
}

fn read_document(path: &Path) -> std::result::Result<ConfigDocument, BoxError> {
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(ConfigDocument::new());
    }
    Ok(serde_yaml::from_str(&content)?)
}

/// Write via a temp file in the same directory, then rename over the target
fn write_document(path: &Path, document: &ConfigDocument) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create config directory {:?}", dir))?;

    let content = serde_yaml::to_string(document)?;

    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {:?}", dir))?;
    file.write_all(content.as_bytes())?;
    file.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write config file {:?}", path))?;

    debug!(path = %path.display(), "wrote config file");
    Ok(())
}
