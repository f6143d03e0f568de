//! Tunables for the PipeWire stream pipeline (§4.3).

use crate::error::{PipeWireError, Result};

/// The Buffers param's upper bound (§4.3: "a Buffers param (1..MAX blocks,
/// MAX=16...)").
pub const MAX_BUFFERS: u32 = 16;

#[derive(Debug, Clone)]
pub struct PipeWireConfig {
    /// Number of buffers proposed in the stream's Buffers param.
    pub buffer_count: u32,
    /// Timeout for the initial core connection.
    pub connection_timeout_ms: u64,
    /// Whether the control plane retries core connection on failure.
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
}

impl Default for PipeWireConfig {
    fn default() -> Self {
        Self {
            buffer_count: 4,
            connection_timeout_ms: 5_000,
            auto_reconnect: true,
            max_reconnect_attempts: 3,
        }
    }
}

impl PipeWireConfig {
    #[must_use]
    pub fn builder() -> PipeWireConfigBuilder {
        PipeWireConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.buffer_count == 0 || self.buffer_count > MAX_BUFFERS {
            errors.push(format!(
                "buffer_count must be in 1..={MAX_BUFFERS}, got {}",
                self.buffer_count
            ));
        }
        if self.connection_timeout_ms < 100 {
            errors.push("connection_timeout_ms must be >= 100".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PipeWireError::InvalidConfig(errors))
        }
    }
}

#[derive(Debug, Default)]
pub struct PipeWireConfigBuilder {
    buffer_count: Option<u32>,
    connection_timeout_ms: Option<u64>,
    auto_reconnect: Option<bool>,
    max_reconnect_attempts: Option<u32>,
}

impl PipeWireConfigBuilder {
    #[must_use]
    pub fn buffer_count(mut self, count: u32) -> Self {
        self.buffer_count = Some(count);
        self
    }

    #[must_use]
    pub fn connection_timeout_ms(mut self, ms: u64) -> Self {
        self.connection_timeout_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = Some(enabled);
        self
    }

    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    #[must_use]
    pub fn build(self) -> PipeWireConfig {
        let default = PipeWireConfig::default();
        PipeWireConfig {
            buffer_count: self.buffer_count.unwrap_or(default.buffer_count),
            connection_timeout_ms: self
                .connection_timeout_ms
                .unwrap_or(default.connection_timeout_ms),
            auto_reconnect: self.auto_reconnect.unwrap_or(default.auto_reconnect),
            max_reconnect_attempts: self
                .max_reconnect_attempts
                .unwrap_or(default.max_reconnect_attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PipeWireConfig::default().validate().is_ok());
    }

    #[test]
    fn buffer_count_out_of_range_is_rejected() {
        let config = PipeWireConfig::builder().buffer_count(0).build();
        assert!(config.validate().is_err());
        let config = PipeWireConfig::builder().buffer_count(MAX_BUFFERS + 1).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_overrides_only_set_fields() {
        let config = PipeWireConfig::builder().buffer_count(8).build();
        assert_eq!(config.buffer_count, 8);
        assert_eq!(config.connection_timeout_ms, 5_000);
    }
}
