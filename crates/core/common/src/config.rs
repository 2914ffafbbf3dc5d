use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use fs_err as fs;
use serde::Deserialize;

use crate::{BoxError, Repository};

/// Process-wide configuration, loaded once at startup and injected into
/// every component from there.
#[derive(Debug)]
pub struct Config {
    pub repository: Repository,
    /// Address to bind the Flight server to.
    pub flight_addr: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_repository_dir")]
    pub repository_dir: PathBuf,
    #[serde(default = "default_flight_addr")]
    pub flight_addr: SocketAddr,
}

fn default_repository_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_flight_addr() -> SocketAddr {
    ([0, 0, 0, 0], 8815).into()
}

impl Config {
    /// Loads configuration from an optional TOML file. Env vars prefixed
    /// with `HANGARD_CONFIG_` override file values, and an explicit
    /// repository override (the CLI flag) wins over both.
    pub fn load(
        file: Option<impl Into<PathBuf>>,
        repository_override: Option<String>,
    ) -> Result<Self, BoxError> {
        let mut figment = Figment::new();
        let mut base: Option<PathBuf> = None;
        if let Some(file) = file {
            let config_path: PathBuf = fs::canonicalize(file.into())?;
            let contents = fs::read_to_string(&config_path)?;
            figment = figment.merge(Toml::string(&contents));
            base = config_path.parent().map(Path::to_path_buf);
        }
        figment = figment.merge(Env::prefixed("HANGARD_CONFIG_"));
        if let Some(repository_dir) = repository_override {
            figment = figment.merge(Serialized::default("repository_dir", repository_dir));
        }
        let config_file: ConfigFile = figment.extract()?;

        // Resolve a relative repository root against the config file's
        // directory rather than the process working directory.
        let mut root = config_file.repository_dir;
        if root.is_relative()
            && let Some(base) = base
        {
            root = base.join(root);
        }

        let repository = Repository::create(root)?;
        Ok(Self {
            repository,
            flight_addr: config_file.flight_addr,
        })
    }
}
