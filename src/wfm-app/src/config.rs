// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "wfm-rs.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Default search paths for `wfm-rs.toml`: current directory, then the
/// user config directory, then `/etc`.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("wfm-rs").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc/wfm-rs").join(CONFIG_FILE_NAME));
    paths
}

/// `Ok(None)` when the file parses but has no `[key]` table.
fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
    let table: toml::Table = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;

    let Some(section) = table.get(key) else {
        return Ok(None);
    };

    // Round-trip through text so serde defaults fill missing keys.
    let section_toml = toml::to_string(section)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
    toml::from_str::<T>(&section_toml)
        .map(Some)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
}

fn load_first_section<T: DeserializeOwned>(
    paths: &[PathBuf],
    key: &str,
) -> Result<Option<(T, PathBuf)>, ConfigError> {
    for path in paths {
        if !path.exists() {
            continue;
        }
        if let Some(cfg) = load_section_from_file::<T>(path, key)? {
            return Ok(Some((cfg, path.clone())));
        }
        tracing::debug!("{} has no [{}] section, skipping", path.display(), key);
    }
    Ok(None)
}

/// A section of `wfm-rs.toml`.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    /// Table name, e.g. `"wfm-rx"`.
    fn section_key() -> &'static str;

    /// Load from an explicit path. A file without the section is an error.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(
                path.to_path_buf(),
                format!("missing [{}] section", Self::section_key()),
            )
        })
    }

    /// First file among `paths` that exists and carries the section, or
    /// `(Default::default(), None)`.
    fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Option<PathBuf>), ConfigError> {
        Ok(match load_first_section::<Self>(paths, Self::section_key())? {
            Some((cfg, path)) => (cfg, Some(path)),
            None => (Self::default(), None),
        })
    }

    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        Self::load_from_paths(&config_search_paths())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Probe {
        rate: u32,
        name: Option<String>,
    }

    impl ConfigFile for Probe {
        fn section_key() -> &'static str {
            "probe"
        }
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_section_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.toml", "[probe]\nrate = 7\n\n[other]\nx = 1\n");
        let cfg = Probe::load_from_file(&path).unwrap();
        assert_eq!(
            cfg,
            Probe {
                rate: 7,
                name: None
            }
        );
    }

    #[test]
    fn missing_section_is_error_for_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.toml", "[other]\nx = 1\n");
        let err = Probe::load_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_, ref msg) if msg.contains("[probe]")));
    }

    #[test]
    fn unreadable_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Probe::load_from_file(&missing),
            Err(ConfigError::ReadError(..))
        ));

        let bad = write_file(&dir, "bad.toml", "[probe\nrate = ");
        assert!(matches!(
            Probe::load_from_file(&bad),
            Err(ConfigError::ParseError(..))
        ));

        let wrong_type = write_file(&dir, "type.toml", "[probe]\nrate = \"fast\"\n");
        assert!(matches!(
            Probe::load_from_file(&wrong_type),
            Err(ConfigError::ParseError(..))
        ));
    }

    #[test]
    fn search_skips_absent_files_and_sections() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent.toml");
        let without = write_file(&dir, "without.toml", "[other]\nx = 1\n");
        let with = write_file(&dir, "with.toml", "[probe]\nname = \"b\"\n");

        let (cfg, found) = Probe::load_from_paths(&[absent, without, with.clone()]).unwrap();
        assert_eq!(found, Some(with));
        assert_eq!(cfg.name.as_deref(), Some("b"));
    }

    #[test]
    fn search_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, found) = Probe::load_from_paths(&[dir.path().join("absent.toml")]).unwrap();
        assert_eq!(cfg, Probe::default());
        assert!(found.is_none());
    }

    #[test]
    fn search_paths_end_in_config_file_name() {
        let paths = config_search_paths();
        assert_eq!(paths[0], PathBuf::from(CONFIG_FILE_NAME));
        assert!(paths.iter().all(|p| p.ends_with(CONFIG_FILE_NAME)));
        assert_eq!(
            paths.last().unwrap(),
            &PathBuf::from("/etc/wfm-rs/wfm-rs.toml")
        );
    }
}
