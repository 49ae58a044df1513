//! Vault - Encrypted credential storage
//!
//! Each secret is stored as a separate age-encrypted file in the vault directory.
//! Entries are addressed by `(service, account)`; both parts are base64url
//! encoded into a `service/account.age` path so that URLs and user names
//! with arbitrary characters map to safe file names.

use age::secrecy::ExposeSecret;
use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::fs::{self, File, Permissions};
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::store::SecretStore;

/// Vault-specific errors
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Secret not found for {account} at {service}")]
    NotFound { service: String, account: String },

    #[error("Vault not initialized")]
    NotInitialized,

    #[error("Empty value not allowed")]
    EmptyValue,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The secrets vault
pub struct Vault {
    /// Root directory for the vault
    root: PathBuf,
    /// Directory for encrypted secrets
    vault_dir: PathBuf,
    /// Directory for identity keys
    keys_dir: PathBuf,
    /// Path to the identity key file
    identity_path: PathBuf,
}

impl Vault {
    /// Create a new vault instance
    pub fn new(root: &Path) -> Self {
        let vault_dir = root.join("vault");
        let keys_dir = root.join("keys");
        let identity_path = keys_dir.join("identity.key");

        Self {
            root: root.to_path_buf(),
            vault_dir,
            keys_dir,
            identity_path,
        }
    }

    /// Initialize the vault - create directories and generate identity key.
    ///
    /// Returns the public key. Calling this on an initialized vault is a no-op.
    pub fn init(&self) -> Result<String> {
        fs::create_dir_all(&self.vault_dir)?;
        fs::create_dir_all(&self.keys_dir)?;

        fs::set_permissions(&self.root, Permissions::from_mode(0o700))?;
        fs::set_permissions(&self.vault_dir, Permissions::from_mode(0o700))?;
        fs::set_permissions(&self.keys_dir, Permissions::from_mode(0o700))?;

        if self.identity_path.exists() {
            return Ok(self.load_identity()?.to_public().to_string());
        }

        let identity = age::x25519::Identity::generate();
        let identity_str = identity.to_string();

        let mut file = File::create(&self.identity_path)?;
        file.write_all(identity_str.expose_secret().as_bytes())?;
        fs::set_permissions(&self.identity_path, Permissions::from_mode(0o600))?;

        debug!(root = %self.root.display(), "initialized secrets vault");

        Ok(identity.to_public().to_string())
    }

    /// Check if the vault is initialized
    pub fn is_initialized(&self) -> bool {
        self.identity_path.exists()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if !self.is_initialized() {
            bail!(VaultError::NotInitialized);
        }
        Ok(())
    }

    fn load_identity(&self) -> Result<age::x25519::Identity> {
        let content = fs::read_to_string(&self.identity_path)
            .context("Failed to read identity key")?;

        content
            .trim()
            .parse::<age::x25519::Identity>()
            .map_err(|e| anyhow!("Failed to parse identity: {}", e))
    }

    /// Path of the encrypted file for an entry
    fn secret_path(&self, service: &str, account: &str) -> PathBuf {
        self.vault_dir
            .join(URL_SAFE_NO_PAD.encode(service))
            .join(format!("{}.age", URL_SAFE_NO_PAD.encode(account)))
    }

    /// Store a secret, replacing any previous value
    pub fn set(&self, service: &str, account: &str, value: &str) -> Result<()> {
        self.ensure_initialized()?;

        if value.is_empty() {
            bail!(VaultError::EmptyValue);
        }

        let recipient = self.load_identity()?.to_public();

        let secret_path = self.secret_path(service, account);
        if let Some(parent) = secret_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let encryptor = age::Encryptor::with_recipients(vec![Box::new(recipient)])
            .ok_or_else(|| VaultError::Encryption("no recipients".to_string()))?;

        let mut encrypted = vec![];
        let mut writer = encryptor
            .wrap_output(&mut encrypted)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        writer
            .write_all(value.as_bytes())
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        writer
            .finish()
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        let mut file = File::create(&secret_path)?;
        file.write_all(&encrypted)?;
        fs::set_permissions(&secret_path, Permissions::from_mode(0o600))?;

        debug!(service, account, "stored secret");

        Ok(())
    }

    /// Retrieve a secret
    pub fn get(&self, service: &str, account: &str) -> Result<String> {
        self.ensure_initialized()?;

        let secret_path = self.secret_path(service, account);
        if !secret_path.exists() {
            bail!(VaultError::NotFound {
                service: service.to_string(),
                account: account.to_string(),
            });
        }

        let identity = self.load_identity()?;
        let encrypted = fs::read(&secret_path)?;

        let decryptor = match age::Decryptor::new(&encrypted[..])
            .map_err(|e| VaultError::Decryption(e.to_string()))?
        {
            age::Decryptor::Recipients(d) => d,
            _ => bail!(VaultError::Decryption(
                "Unexpected passphrase encryption".to_string()
            )),
        };

        let mut decrypted = vec![];
        let mut reader = decryptor
            .decrypt(std::iter::once(&identity as &dyn age::Identity))
            .map_err(|e| VaultError::Decryption(e.to_string()))?;

        reader
            .read_to_end(&mut decrypted)
            .map_err(|e| VaultError::Decryption(e.to_string()))?;

        String::from_utf8(decrypted).context("Secret is not valid UTF-8")
    }

    /// Check if a secret exists
    pub fn exists(&self, service: &str, account: &str) -> bool {
        self.secret_path(service, account).exists()
    }
}

impl SecretStore for Vault {
    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>> {
        // An uninitialized vault simply has nothing stored yet
        if !self.is_initialized() || !self.exists(service, account) {
            return Ok(None);
        }
        self.get(service, account).map(Some)
    }

    fn set_secret(&self, service: &str, account: &str, value: &str) -> Result<()> {
        if !self.is_initialized() {
            self.init()?;
        }
        self.set(service, account, value)
    }
}
