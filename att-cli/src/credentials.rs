//! Locally stored API token and Slack ID.
//!
//! Stored as a flat JSON object at `~/.att/config/data.json`, readable only by
//! the owning user.

use anyhow::Context;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const API_TOKEN_KEY: &str = "api-token";
pub const SLACK_ID_KEY: &str = "slack-id";

const DEFAULT_PATH: &str = "~/.att/config/data.json";

#[derive(Debug, Default)]
pub struct Credentials {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl Credentials {
    pub fn default_path() -> PathBuf {
        PathBuf::from(shellexpand::tilde(DEFAULT_PATH).into_owned())
    }

    /// Load from `path`. A missing file is an empty store.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Unable to parse config data in {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Unable to read config file {}", path.display()))
            }
        };
        Ok(Self { path, values })
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// `(slack_id, api_token)` when both are configured.
    pub fn identity(&self) -> Option<(&str, &str)> {
        Some((self.get(SLACK_ID_KEY)?, self.get(API_TOKEN_KEY)?))
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            create_private_dir(dir)
                .with_context(|| format!("Unable to create config directory {}", dir.display()))?;
        }
        let data = serde_json::to_vec(&self.values)?;
        write_private_file(&self.path, &data)
            .with_context(|| format!("Unable to write config file {}", self.path.display()))
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_private_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(data)
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, data)
}
