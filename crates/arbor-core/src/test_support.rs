//! Test-data location resolution: `ARBOR_TEST_DATA_DIR` env var, else an
//! `arbor.toml` config file in the current directory, else the current
//! directory itself. A narrow, single-purpose surface, not a general
//! settings system.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Default)]
struct Config {
    test_data_dir: Option<PathBuf>,
}

fn read_config_file() -> Option<Config> {
    let text = std::fs::read_to_string("arbor.toml").ok()?;
    toml::from_str(&text).ok()
}

/// Where fixture catalogs for integration tests live.
pub fn test_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ARBOR_TEST_DATA_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = read_config_file().and_then(|config| config.test_data_dir) {
        return dir;
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_wins_over_cwd_fallback() {
        std::env::set_var("ARBOR_TEST_DATA_DIR", "/tmp/arbor-fixtures");
        assert_eq!(test_data_dir(), PathBuf::from("/tmp/arbor-fixtures"));
        std::env::remove_var("ARBOR_TEST_DATA_DIR");
    }
}
