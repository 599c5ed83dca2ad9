//! Configuration loading

use anyhow::Result;
use serde::{Deserialize, Serialize};
use simdet_core::{TemplateDefaults, Variant};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub template: TemplateDefaults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Variant used for declarations that do not name one
    #[serde(default)]
    pub variant: Variant,
    /// Startup script path (stdout when unset)
    #[serde(default)]
    pub output: Option<String>,
    /// Substitutions file path (not written when unset)
    #[serde(default)]
    pub substitutions: Option<String>,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        build: BuildConfig {
            variant: Variant::Extended,
            output: Some("st.cmd".to_string()),
            substitutions: Some("simdet.substitutions".to_string()),
        },
        template: TemplateDefaults {
            p: Some("SIM:".to_string()),
            r: Some("CAM:".to_string()),
            ..TemplateDefaults::default()
        },
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.build.variant, Variant::Simple);
        assert!(config.build.output.is_none());
        assert_eq!(config.template.timeout, 1);
    }

    #[test]
    fn test_default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simdet.toml");
        save_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.build.variant, Variant::Extended);
        assert_eq!(config.template.p.as_deref(), Some("SIM:"));
    }

    #[test]
    fn test_partial_config() {
        let config: Config = toml::from_str(
            r#"
[build]
variant = "extended"

[template]
p = "BL02:"
"#,
        )
        .unwrap();
        assert_eq!(config.build.variant, Variant::Extended);
        assert_eq!(config.template.p.as_deref(), Some("BL02:"));
        assert_eq!(config.template.r, None);
        assert_eq!(config.template.addr, 0);
    }
}
