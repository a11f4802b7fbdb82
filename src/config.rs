use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use dirs_next::config_dir;
use serde::Deserialize;

use crate::providers::mal::MAL_API_URL;
use crate::storage::{NAMESPACE, default_storage_dir};

pub const ENV_PREFIX: &str = "ANITRACK";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_KEEPALIVE_SECS: u64 = 600;
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] =
    &["https://animetrackerbyz.netlify.app", "http://localhost:3000"];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub mal_api_url: String,
    #[serde(default)]
    pub mal_client_id: Option<String>,
    pub relay_url: String,
    pub allowed_origins: Vec<String>,
    pub keepalive_secs: u64,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Settings {
    /// Loads settings from the process environment and the config file at
    /// `path`, or the default location when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path(),
        };
        Self::from_sources(path.as_deref(), &env)
    }

    /// Layers defaults, the TOML file, `ANITRACK_*` variables and finally the
    /// bare `PORT` / `MAL_CLIENT_ID` variables. A missing file is skipped.
    pub fn from_sources(path: Option<&Path>, env: &HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", i64::from(DEFAULT_PORT))?
            .set_default("mal_api_url", MAL_API_URL)?
            .set_default("relay_url", format!("http://localhost:{DEFAULT_PORT}"))?
            .set_default(
                "allowed_origins",
                DEFAULT_ALLOWED_ORIGINS
                    .iter()
                    .map(|origin| origin.to_string())
                    .collect::<Vec<_>>(),
            )?
            .set_default("keepalive_secs", DEFAULT_KEEPALIVE_SECS as i64)?;

        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let prefixed: HashMap<String, String> = env
            .iter()
            .filter(|(key, _)| key.starts_with(&format!("{ENV_PREFIX}_")))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        builder = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("allowed_origins")
                    .source(Some(prefixed)),
            )
            .set_override_option("port", env.get("PORT").cloned())?
            .set_override_option("mal_client_id", env.get("MAL_CLIENT_ID").cloned())?;

        let settings: Settings = builder
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        Ok(settings)
    }

    pub fn storage_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_storage_dir(),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(NAMESPACE).join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let settings = Settings::from_sources(None, &HashMap::new()).unwrap();
        assert_eq!(settings.port, 3001);
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.mal_api_url, MAL_API_URL);
        assert_eq!(settings.relay_url, "http://localhost:3001");
        assert_eq!(settings.mal_client_id, None);
        assert_eq!(settings.keepalive_secs, 600);
        assert_eq!(settings.allowed_origins.len(), 2);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "port = 4000\nrelay_url = \"http://relay.local:4000\"\nallowed_origins = [\"https://a.example\"]\n",
        )
        .unwrap();

        let settings = Settings::from_sources(Some(&path), &HashMap::new()).unwrap();
        assert_eq!(settings.port, 4000);
        assert_eq!(settings.relay_url, "http://relay.local:4000");
        assert_eq!(settings.allowed_origins, vec!["https://a.example"]);
    }

    #[test]
    fn missing_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let settings =
            Settings::from_sources(Some(&dir.path().join("absent.toml")), &HashMap::new())
                .unwrap();
        assert_eq!(settings.port, 3001);
    }

    #[test]
    fn prefixed_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "keepalive_secs = 30\n").unwrap();

        let settings = Settings::from_sources(
            Some(&path),
            &env(&[
                ("ANITRACK_KEEPALIVE_SECS", "90"),
                ("ANITRACK_ALLOWED_ORIGINS", "https://a.example,https://b.example"),
                ("ANITRACK_DATA_DIR", "/tmp/anitrack-data"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.keepalive_secs, 90);
        assert_eq!(
            settings.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(
            settings.storage_dir().unwrap(),
            PathBuf::from("/tmp/anitrack-data")
        );
    }

    #[test]
    fn bare_port_and_client_id_win() {
        let settings = Settings::from_sources(
            None,
            &env(&[
                ("ANITRACK_PORT", "5000"),
                ("PORT", "8080"),
                ("MAL_CLIENT_ID", "abc123"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.mal_client_id.as_deref(), Some("abc123"));
    }
}
