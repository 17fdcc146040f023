use anyhow::{Context, Result};
use device_registry::Verbosity;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extra YAML catalogs merged over the built-in families.
    pub catalog_dir: Option<String>,
    pub output_dir: String,
    pub verbosity: Verbosity,
    /// Simulated fleet used when `--sim` is not given.
    pub simulation: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_dir: None,
            output_dir: "./backups".to_string(),
            verbosity: Verbosity::Normal,
            simulation: None,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            let contents = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            serde_json::from_str(&contents).with_context(|| format!("parsing {path}"))
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing {path}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"verbosity":"quiet"}"#).unwrap();
        assert_eq!(cfg.verbosity, Verbosity::Quiet);
        assert_eq!(cfg.output_dir, "./backups");
        assert!(cfg.catalog_dir.is_none());
    }

    #[test]
    fn test_missing_file_is_created() {
        let path = std::env::temp_dir().join(format!("dbk-config-{}.json", std::process::id()));
        let p = path.display().to_string();
        let _ = fs::remove_file(&path);
        let cfg = Config::load(&p).unwrap();
        assert_eq!(cfg.verbosity, Verbosity::Normal);
        assert!(path.exists());
        let _ = fs::remove_file(&path);
    }
}
