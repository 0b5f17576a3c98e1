//! Registry configuration types.

use crate::error::CoreError;
use transport_host::OutputSink;

/// Configuration for a [`SessionRegistry`](crate::SessionRegistry).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Guest user to log in as (default: `root`).
    pub guest_user: String,
    /// Maximum number of guests receiving a payload at once (default: 4).
    pub max_concurrent: usize,
    /// Where remote stdout/stderr of the install command goes (default: forward).
    pub output: OutputSink,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            guest_user: "root".to_string(),
            max_concurrent: 4,
            output: OutputSink::Forward,
        }
    }
}

impl RegistryConfig {
    /// Create a new config builder.
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.guest_user.trim().is_empty() {
            return Err(CoreError::InvalidConfig("guest_user is required".into()));
        }
        if self.max_concurrent == 0 {
            return Err(CoreError::InvalidConfig("max_concurrent must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for RegistryConfig.
#[derive(Debug, Default)]
pub struct RegistryConfigBuilder {
    config: RegistryConfig,
}

impl RegistryConfigBuilder {
    /// Set the guest login user.
    pub fn guest_user(mut self, user: impl Into<String>) -> Self {
        self.config.guest_user = user.into();
        self
    }

    /// Set the delivery concurrency limit.
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = max;
        self
    }

    /// Set the sink for remote command output.
    pub fn output(mut self, output: OutputSink) -> Self {
        self.config.output = output;
        self
    }

    /// Build the configuration, validating all fields.
    pub fn build(self) -> Result<RegistryConfig, CoreError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.guest_user, "root");
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.output, OutputSink::Forward);
    }

    #[test]
    fn test_builder_rejects_zero_concurrency() {
        let result = RegistryConfig::builder().max_concurrent(0).build();
        assert!(matches!(result, Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_rejects_empty_user() {
        let result = RegistryConfig::builder().guest_user("  ").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_success() {
        let config = RegistryConfig::builder()
            .guest_user("admin")
            .max_concurrent(8)
            .output(OutputSink::Null)
            .build()
            .expect("should build successfully");

        assert_eq!(config.guest_user, "admin");
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.output, OutputSink::Null);
    }
}
