use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{builder, ranker};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("LOOKALIKE_CONFIG_PATH").unwrap_or("lookalike.toml"))
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serialized embedding database.
    pub database: PathBuf,
    /// Root directory of per-identity reference image folders.
    pub reference_dir: PathBuf,
    /// Most reference images embedded per identity.
    pub max_images_per_identity: usize,
    /// Default number of identities returned per query.
    pub top_k: usize,
    pub detector_model: PathBuf,
    pub encoder_model: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("embeddings.db"),
            reference_dir: PathBuf::from("actors"),
            max_images_per_identity: builder::DEFAULT_PER_IDENTITY_CAP,
            top_k: ranker::DEFAULT_TOP_K,
            detector_model: PathBuf::from("models/face_detection_yunet_2023mar.onnx"),
            encoder_model: PathBuf::from("models/face_recognition_sface_2021dec.onnx"),
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg.max_images_per_identity, 5);
        assert_eq!(cfg.top_k, 5);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lookalike.toml");

        let mut cfg = Config::default();
        cfg.top_k = 3;
        cfg.reference_dir = PathBuf::from("people");

        save_config(&cfg, Some(&path)).unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.top_k, 3);
        assert_eq!(loaded.reference_dir, PathBuf::from("people"));
    }

    #[test]
    fn partial_config_files_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "top_k = 2\n").unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.top_k, 2);
        assert_eq!(cfg.database, PathBuf::from("embeddings.db"));
    }
}
