//! Pool configuration
//!
//! ```toml
//! mirror_namespace = "retargetmirror"
//! generator_prefix = "m"
//! open_prefix = "o"
//! proxy_prefix = "p"
//! dump_dir = "target/mirrors"
//! ```

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed but unusable
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Naming and debugging settings of a [`UnitPool`](crate::UnitPool)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Package every synthesized unit is defined in
    pub mirror_namespace: String,
    /// Name prefix of generator mirrors
    pub generator_prefix: String,
    /// Name prefix of open mirrors
    pub open_prefix: String,
    /// Name prefix of proxy subtypes
    pub proxy_prefix: String,
    /// Directory receiving a copy of every synthesized unit
    pub dump_dir: Option<PathBuf>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            mirror_namespace: "retargetmirror".to_string(),
            generator_prefix: "m".to_string(),
            open_prefix: "o".to_string(),
            proxy_prefix: "p".to_string(),
            dump_dir: None,
        }
    }
}

impl PoolConfig {
    /// Load from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse from TOML text; missing keys take their defaults
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: PoolConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every name part is a plain identifier fragment
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parts = [
            ("mirror_namespace", &self.mirror_namespace, true),
            ("generator_prefix", &self.generator_prefix, false),
            ("open_prefix", &self.open_prefix, false),
            ("proxy_prefix", &self.proxy_prefix, false),
        ];
        for (key, value, allow_slash) in parts {
            let valid = !value.is_empty()
                && !value.starts_with('/')
                && !value.ends_with('/')
                && value
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || (allow_slash && c == '/'));
            if !valid {
                return Err(ConfigError::Invalid(format!("{key} = {value:?}")));
            }
        }
        if self.generator_prefix == self.open_prefix
            || self.generator_prefix == self.proxy_prefix
            || self.open_prefix == self.proxy_prefix
        {
            return Err(ConfigError::Invalid("name prefixes must differ".into()));
        }
        Ok(())
    }

    /// Whether `name` lives in the synthesized namespace
    pub fn is_synthesized(&self, name: &str) -> bool {
        name.strip_prefix(self.mirror_namespace.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Deterministic synthesized name `<namespace>/<prefix><digest>`
    ///
    /// The digest covers every part, so equal inputs always give equal names
    /// and different inputs practically never collide.
    pub fn synthesized_name(&self, prefix: &str, parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prefix.as_bytes());
        for part in parts {
            hasher.update([0u8]);
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        format!(
            "{}/{}{}",
            self.mirror_namespace,
            prefix,
            hex::encode(&digest[..16])
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.mirror_namespace, "retargetmirror");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = PoolConfig::from_toml("generator_prefix = \"gen\"\n").unwrap();
        assert_eq!(config.generator_prefix, "gen");
        assert_eq!(config.open_prefix, "o");
        assert_eq!(config.dump_dir, None);
    }

    #[test]
    fn test_invalid_prefix() {
        assert!(matches!(
            PoolConfig::from_toml("open_prefix = \"a$b\"\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PoolConfig::from_toml("open_prefix = \"m\"\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PoolConfig::from_toml("open_prefix = 3\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_synthesized_names() {
        let config = PoolConfig::default();
        let a = config.synthesized_name("m", &["pkg/R", "sub/S"]);
        let b = config.synthesized_name("m", &["pkg/R", "sub/S"]);
        let c = config.synthesized_name("m", &["pkg/RS", "ub/S"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("retargetmirror/m"));
        assert_eq!(a.len(), "retargetmirror/m".len() + 32);
        assert!(config.is_synthesized(&a));
        assert!(!config.is_synthesized("retargetmirrorx/Foo"));
    }
}
