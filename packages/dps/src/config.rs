//! Configuration constants and the validator engine configuration.

use std::time::Duration;

use crate::error::{DpsError, Result};

/// Default namespace of the national NFS-e schema.
pub const NFSE_NAMESPACE: &str = "http://www.sped.fazenda.gov.br/nfse";

/// XML-DSig namespace bound to the `ds` prefix on signed documents.
pub const XMLDSIG_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Layout version written to the `versao` attribute of `DPS`.
pub const DPS_VERSION: &str = "1.00";

/// Document type sent to the validation engine when the caller gives none.
pub const DEFAULT_TIPO: &str = "DPS";

/// Element the external signer is asked to sign.
pub const SIGNED_ELEMENT: &str = "infDPS";

/// Application version reported in `verAplic`.
pub const APP_VERSION: &str = concat!("nfse-dps/", env!("CARGO_PKG_VERSION"));

/// Validation engine used when `XSD_VALIDATOR_URL` is not set.
pub const DEFAULT_VALIDATOR_URL: &str = "http://127.0.0.1:8085/validate";

/// Validation engine timeout in seconds.
///
/// The check is advisory, so a slow engine must not hold up emission for long.
pub const DEFAULT_VALIDATOR_TIMEOUT_SECS: u64 = 10;

/// Engine name reported when the engine does not name itself.
pub const DEFAULT_ENGINE_NAME: &str = "xsd-service";

/// Configuration for the external XSD validation engine.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub engine_name: String,
}

impl ValidatorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let endpoint =
            std::env::var("XSD_VALIDATOR_URL").unwrap_or_else(|_| DEFAULT_VALIDATOR_URL.into());

        let timeout_secs = match std::env::var("XSD_VALIDATOR_TIMEOUT_SECS") {
            Ok(v) => v.parse().map_err(|_| {
                DpsError::Config(format!("XSD_VALIDATOR_TIMEOUT_SECS is not a number: '{v}'"))
            })?,
            Err(_) => DEFAULT_VALIDATOR_TIMEOUT_SECS,
        };

        let engine_name =
            std::env::var("XSD_VALIDATOR_ENGINE").unwrap_or_else(|_| DEFAULT_ENGINE_NAME.into());

        Self::builder(endpoint)
            .timeout_secs(timeout_secs)
            .engine_name(engine_name)
            .try_build()
    }

    /// Create a config builder.
    pub fn builder(endpoint: impl Into<String>) -> ValidatorConfigBuilder {
        ValidatorConfigBuilder {
            endpoint: endpoint.into(),
            timeout_secs: DEFAULT_VALIDATOR_TIMEOUT_SECS,
            engine_name: DEFAULT_ENGINE_NAME.into(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Builder for `ValidatorConfig`.
pub struct ValidatorConfigBuilder {
    endpoint: String,
    timeout_secs: u64,
    engine_name: String,
}

impl ValidatorConfigBuilder {
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn engine_name(mut self, name: impl Into<String>) -> Self {
        self.engine_name = name.into();
        self
    }

    /// Build without checks. Suitable for tests with known-good values.
    pub fn build(self) -> ValidatorConfig {
        ValidatorConfig {
            endpoint: self.endpoint,
            timeout_secs: self.timeout_secs,
            engine_name: self.engine_name,
        }
    }

    /// Build, rejecting an empty endpoint or a zero timeout.
    pub fn try_build(self) -> Result<ValidatorConfig> {
        if self.endpoint.trim().is_empty() {
            return Err(DpsError::Config("validator endpoint is empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(DpsError::Config(
                "validator timeout must be at least one second".into(),
            ));
        }
        Ok(self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ValidatorConfig::builder("http://localhost:9000/validate").build();
        assert_eq!(config.endpoint, "http://localhost:9000/validate");
        assert_eq!(config.timeout_secs, DEFAULT_VALIDATOR_TIMEOUT_SECS);
        assert_eq!(config.engine_name, DEFAULT_ENGINE_NAME);
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_try_build_rejects_empty_endpoint() {
        let result = ValidatorConfig::builder("  ").try_build();
        assert!(matches!(result, Err(DpsError::Config(_))));
    }

    #[test]
    fn test_try_build_rejects_zero_timeout() {
        let result = ValidatorConfig::builder("http://localhost/validate")
            .timeout_secs(0)
            .try_build();
        assert!(result.is_err());
    }

    #[test]
    fn test_app_version_prefix() {
        assert!(APP_VERSION.starts_with("nfse-dps/"));
    }
}
