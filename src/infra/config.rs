//! Configuration management infrastructure.
//!
//! Verifier defaults may be kept in a TOML file so automation does not have
//! to repeat the trust store location and policy on every invocation.
//! Command line options always win over file values.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::constants::DEFAULT_CHUNK_SIZE;
use crate::domain::types::{CertUsage, ChunkSize};
use crate::infra::error::{P7vError, P7vResult};

/// Verifier preferences loaded from the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifierConfiguration {
    /// Directory of trusted certificates; OpenSSL defaults when unset
    pub trust_store_dir: Option<PathBuf>,

    /// Input block size fed to the decoder
    pub chunk_size: usize,

    /// Whether to print progress lines on stderr
    pub verbose: bool,

    /// Usage signer certificates must allow
    pub certificate_usage: CertUsage,

    /// Reject messages without any signed-data level
    pub require_signed: bool,
}

impl Default for VerifierConfiguration {
    fn default() -> Self {
        Self {
            trust_store_dir: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            verbose: false,
            certificate_usage: CertUsage::default(),
            require_signed: false,
        }
    }
}

impl VerifierConfiguration {
    /// Validated chunk size.
    pub fn chunk_size(&self) -> P7vResult<ChunkSize> {
        ChunkSize::new(self.chunk_size)
    }
}

/// Configuration manager for handling config files
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new configuration manager with default path
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a configuration manager with custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("p7verify").join("config.toml")
        } else {
            PathBuf::from("p7verify-config.toml")
        }
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(&self) -> P7vResult<VerifierConfiguration> {
        if self.config_path.exists() {
            self.load()
        } else {
            log::debug!(
                "Configuration file not found, using defaults: {}",
                self.config_path.display()
            );
            Ok(VerifierConfiguration::default())
        }
    }

    /// Load configuration from file
    pub fn load(&self) -> P7vResult<VerifierConfiguration> {
        log::info!("Loading configuration from: {}", self.config_path.display());

        let content = fs::read_to_string(&self.config_path).map_err(|e| {
            P7vError::ConfigurationError(format!(
                "Failed to read config file {}: {e}",
                self.config_path.display()
            ))
        })?;

        let config: VerifierConfiguration = toml::from_str(&content).map_err(|e| {
            P7vError::ConfigurationError(format!("Failed to parse config file: {e}"))
        })?;

        Self::validate_config(&config)?;
        Ok(config)
    }

    fn validate_config(config: &VerifierConfiguration) -> P7vResult<()> {
        config.chunk_size()?;
        if let Some(dir) = &config.trust_store_dir {
            if dir.as_os_str().is_empty() {
                return Err(P7vError::ConfigurationError(
                    "trust_store_dir must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Get the configuration file path
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
