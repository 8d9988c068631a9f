//! Config file helpers shared by the CLI and the server.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::utils::error::{Result, StyleSyncError};

/// Load a TOML config file into `T`
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path).map_err(|e| {
        StyleSyncError::Config(format!("Failed to read config {}: {e}", path.display()))
    })?;

    toml::from_str(&content).map_err(|e| {
        StyleSyncError::Config(format!("Failed to parse config {}: {e}", path.display()))
    })
}

/// Write `value` as pretty JSON, creating parent directories
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Read a JSON file into `T`
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(StyleSyncError::PathNotFound(path.to_path_buf()));
    }
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        epochs: usize,
    }

    #[test]
    fn test_load_toml_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, "name = \"baseline\"\nepochs = 12\n").unwrap();

        let loaded: Sample = load_toml_config(&path).unwrap();
        assert_eq!(loaded, Sample { name: "baseline".into(), epochs: 12 });
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "epochs = = 3").unwrap();

        let result: Result<Sample> = load_toml_config(&path);
        assert!(matches!(result, Err(StyleSyncError::Config(_))));
    }

    #[test]
    fn test_json_round_trip_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out/sample.json");
        let sample = Sample { name: "x".into(), epochs: 3 };

        save_json(&sample, &path).unwrap();
        let loaded: Sample = load_json(&path).unwrap();
        assert_eq!(loaded, sample);
    }

    #[test]
    fn test_load_json_missing_file() {
        let result: Result<Sample> = load_json(Path::new("/nonexistent/sample.json"));
        assert!(matches!(result, Err(StyleSyncError::PathNotFound(_))));
    }
}
