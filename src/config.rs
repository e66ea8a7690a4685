use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Result, DEFAULT_PATH_PREFIX};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Base URL of the admin UI, needed to build direct download links
    pub admin_ui_url: Option<Url>,
    /// Prefix turning a client path into a VFS path
    pub path_prefix: String,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            admin_ui_url: None,
            path_prefix: DEFAULT_PATH_PREFIX.to_owned(),
        }
    }
}

impl VfsConfig {
    /// Load the configuration from a JSON file.
    /// Missing fields fall back to their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::debug!("loading config from {}", path.as_ref().display());
        let bytes = fs::read(path.as_ref())?;
        let config = serde_json::from_slice(&bytes)?;
        Ok(config)
    }

    pub fn with_admin_ui_url(mut self, url: Url) -> Self {
        self.admin_ui_url = Some(url);
        self
    }

    pub fn vfs_path(&self, path: &str) -> String {
        format!("{}{}", self.path_prefix, path)
    }
}
