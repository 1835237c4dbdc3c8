//! Repository configuration. Loaded from an optional TOML file and
//! overridden by environment variables, the layering convention used by
//! `examples/other_examples/11e34e9b_..._cfg-config.rs` and
//! `examples/other_examples/539ff8b3_..._config.rs`.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub repo_dir: PathBuf,
    pub port: u16,
    pub public_read: bool,
    pub cookie_ttl_secs: u64,
    pub connection_timeout_secs: u64,
    pub tail_timeout_secs: u64,
}

impl Default for RepoConfig {
    fn default() -> Self {
        RepoConfig {
            repo_dir: PathBuf::from("./repo"),
            port: 8001,
            public_read: false,
            cookie_ttl_secs: 60 * 60 * 24 * 365,
            connection_timeout_secs: 30,
            tail_timeout_secs: 30,
        }
    }
}

impl RepoConfig {
    /// Loads `path` if it exists, falling back to defaults; then applies
    /// `SLN_REPO_DIR` / `SLN_PORT` / `SLN_PUBLIC_READ` overrides, in that
    /// priority order (env always wins).
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p)?;
                toml::from_str(&text)?
            }
            _ => RepoConfig::default(),
        };

        if let Ok(dir) = std::env::var("SLN_REPO_DIR") {
            config.repo_dir = PathBuf::from(dir);
        }
        if let Ok(port) = std::env::var("SLN_PORT") {
            config.port = port.parse()?;
        }
        if let Ok(public) = std::env::var("SLN_PUBLIC_READ") {
            config.public_read = public == "1" || public.eq_ignore_ascii_case("true");
        }
        Ok(config)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.repo_dir.join("data")
    }
    pub fn tmp_dir(&self) -> PathBuf {
        self.repo_dir.join("tmp")
    }
    pub fn cache_dir(&self) -> PathBuf {
        self.repo_dir.join("cache").join("blog")
    }
    pub fn db_dir(&self) -> PathBuf {
        self.repo_dir.join("db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RepoConfig::default();
        assert_eq!(config.port, 8001);
        assert!(!config.public_read);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = RepoConfig::load(Some(Path::new("/nonexistent/path.toml"))).unwrap();
        assert_eq!(config.port, RepoConfig::default().port);
    }
}
