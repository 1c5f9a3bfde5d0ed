use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use easel_contracts::styles::StyleCatalog;

use crate::providers::{default_provider_registry, ImageProviderRegistry};

pub const DEFAULT_MODEL: &str = "black-forest-labs/FLUX.1-schnell";
pub const DEFAULT_API_BASE: &str = "https://router.huggingface.co/hf-inference/models";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub const TOKEN_ENV: &str = "HUGGINGFACE_TOKEN";
pub const MODEL_ENV: &str = "EASEL_MODEL";
pub const API_BASE_ENV: &str = "HF_INFERENCE_API_BASE";
pub const TIMEOUT_ENV: &str = "EASEL_TIMEOUT_SECS";
pub const STYLES_PATH_ENV: &str = "EASEL_STYLES_PATH";

pub const SETUP_INSTRUCTIONS: &[&str] = &[
    "Go to https://huggingface.co/settings/tokens",
    "Create a new token with Write permissions",
    "Create a .env file in the project directory",
    "Add: HUGGINGFACE_TOKEN=your_token_here",
    "Restart the application",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("HuggingFace API token not found! Set HUGGINGFACE_TOKEN in the environment or a .env file")]
    MissingCredential,

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub token: String,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
    pub styles_path: Option<PathBuf>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("token", &"<redacted>")
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .field("styles_path", &self.styles_path)
            .finish()
    }
}

impl Settings {
    /// Reads `.env` (if present) into the process environment, then the
    /// environment itself. Call once at startup.
    pub fn load() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup(TOKEN_ENV).ok_or(ConfigError::MissingCredential)?;
        let timeout = match lookup(TIMEOUT_ENV) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: TIMEOUT_ENV,
                        value: raw,
                    })
                }
            },
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };
        Ok(Self {
            token,
            model: lookup(MODEL_ENV).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: lookup(API_BASE_ENV)
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            timeout,
            styles_path: styles_path(&lookup),
        })
    }

    pub fn style_catalog(&self) -> anyhow::Result<StyleCatalog> {
        catalog_with_overrides(self.styles_path.as_deref())
    }

    pub fn provider_registry(&self) -> anyhow::Result<ImageProviderRegistry> {
        default_provider_registry(&self.api_base, &self.token, self.timeout)
    }
}

/// Style catalog for commands that need no credential: `.env` and
/// `EASEL_STYLES_PATH` apply exactly as they do for [`Settings::load`].
pub fn load_style_catalog() -> anyhow::Result<StyleCatalog> {
    load_dotenv();
    style_catalog_from_lookup(non_empty_env)
}

pub fn style_catalog_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<StyleCatalog> {
    catalog_with_overrides(styles_path(&lookup).as_deref())
}

fn styles_path(lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    lookup(STYLES_PATH_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn catalog_with_overrides(path: Option<&Path>) -> anyhow::Result<StyleCatalog> {
    let catalog = StyleCatalog::default();
    match path {
        Some(path) => catalog
            .with_override_file(path)
            .with_context(|| format!("failed loading styles from {}", path.display())),
        None => Ok(catalog),
    }
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => log::debug!("loaded environment from {}", path.display()),
        Err(err) if err.not_found() => {}
        Err(err) => log::warn!("ignoring unreadable .env file: {err}"),
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn missing_token_is_fatal() {
        let err = Settings::from_lookup(lookup_from(&[(MODEL_ENV, "some/model")]));
        assert_eq!(err, Err(ConfigError::MissingCredential));
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() -> anyhow::Result<()> {
        let settings = Settings::from_lookup(lookup_from(&[(TOKEN_ENV, "hf_abc")]))?;
        assert_eq!(settings.token, "hf_abc");
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.api_base, DEFAULT_API_BASE);
        assert_eq!(settings.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(settings.styles_path, None);
        Ok(())
    }

    #[test]
    fn overrides_are_read() -> anyhow::Result<()> {
        let settings = Settings::from_lookup(lookup_from(&[
            (TOKEN_ENV, "hf_abc"),
            (MODEL_ENV, "stabilityai/stable-diffusion-xl-base-1.0"),
            (API_BASE_ENV, "http://localhost:8080/models/"),
            (TIMEOUT_ENV, "30"),
            (STYLES_PATH_ENV, "/etc/easel/styles.json"),
        ]))?;
        assert_eq!(settings.model, "stabilityai/stable-diffusion-xl-base-1.0");
        assert_eq!(settings.api_base, "http://localhost:8080/models");
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(
            settings.styles_path,
            Some(PathBuf::from("/etc/easel/styles.json"))
        );
        Ok(())
    }

    #[test]
    fn bad_timeout_is_rejected() {
        for raw in ["0", "soon", "-5"] {
            let err = Settings::from_lookup(lookup_from(&[(TOKEN_ENV, "hf_abc"), (TIMEOUT_ENV, raw)]));
            assert_eq!(
                err,
                Err(ConfigError::InvalidValue {
                    key: TIMEOUT_ENV,
                    value: raw.to_string(),
                })
            );
        }
    }

    #[test]
    fn debug_output_hides_token() -> anyhow::Result<()> {
        let settings = Settings::from_lookup(lookup_from(&[(TOKEN_ENV, "hf_secret")]))?;
        assert!(!format!("{settings:?}").contains("hf_secret"));
        Ok(())
    }

    #[test]
    fn style_override_file_extends_catalog() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("styles.json");
        std::fs::write(&path, r#"{"Noir": "film noir, high contrast"}"#)?;
        let mut settings = Settings::from_lookup(lookup_from(&[(TOKEN_ENV, "hf_abc")]))?;
        settings.styles_path = Some(path);
        let catalog = settings.style_catalog()?;
        assert_eq!(catalog.lookup("Noir")?, "film noir, high contrast");

        settings.styles_path = Some(temp.path().join("missing.json"));
        assert!(settings.style_catalog().is_err());
        Ok(())
    }

    #[test]
    fn style_catalog_lookup_needs_no_token() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("styles.json");
        std::fs::write(&path, r#"{"Noir": "film noir, high contrast"}"#)?;
        let path_text = path.to_string_lossy().to_string();

        let catalog = style_catalog_from_lookup(lookup_from(&[(STYLES_PATH_ENV, path_text.as_str())]))?;
        assert_eq!(catalog.lookup("Noir")?, "film noir, high contrast");
        assert_eq!(catalog.default_style(), Some("Realistic"));

        for blank in ["", "   "] {
            let catalog = style_catalog_from_lookup(lookup_from(&[(STYLES_PATH_ENV, blank)]))?;
            assert_eq!(catalog.len(), StyleCatalog::default().len());
        }
        Ok(())
    }
}
