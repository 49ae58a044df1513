//! Standard paths used by confluence-tool

use std::path::PathBuf;

/// Name of the per-user config document in the home directory
pub const CONFIG_FILE_NAME: &str = ".confluence-tool.yaml";

/// Standard confluence-tool paths
pub struct Paths {
    /// Home directory (~)
    pub home: PathBuf,
    /// Data directory (~/.local/share/confluence-tool)
    pub data: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));

        let data = dirs::data_dir()
            .unwrap_or_else(|| home.join(".local/share"))
            .join("confluence-tool");

        Self { home, data }
    }

    /// Default location of the profile document (~/.confluence-tool.yaml)
    pub fn config_file(&self) -> PathBuf {
        self.home.join(CONFIG_FILE_NAME)
    }

    /// Root of the encrypted secrets vault
    pub fn secrets(&self) -> PathBuf {
        self.data.join("secrets")
    }
}
