use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "ONT_DATA_DIR";

#[derive(Debug)]
pub enum ConfigError {
    NoDataDir,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NoDataDir => write!(
                f,
                "no data directory: pass --data-dir or set {DATA_DIR_ENV}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Flag first, then the environment, then the platform default. Blank values are skipped.
pub fn resolve_data_dir_from(
    flag: Option<&str>,
    env: Option<&str>,
    platform: Option<PathBuf>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigError> {
    let explicit = [flag, env]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty());
    match explicit {
        Some(value) => Ok(expand_home(value, home)),
        None => platform.ok_or(ConfigError::NoDataDir),
    }
}

/// Expands a leading `~/` against `home`.
pub fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(feature = "app")]
pub fn platform_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "ont", "ont-dashboard")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

#[cfg(feature = "app")]
pub fn resolve_data_dir(flag: Option<&str>) -> Result<PathBuf, ConfigError> {
    let env = std::env::var(DATA_DIR_ENV).ok();
    let home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
    resolve_data_dir_from(flag, env.as_deref(), platform_data_dir(), home.as_deref())
}
