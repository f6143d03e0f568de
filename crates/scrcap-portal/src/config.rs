//! Portal session configuration.

/// Cursor handling requested from the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    Hidden,
    Embedded,
    Metadata,
}

impl Default for CursorMode {
    fn default() -> Self {
        Self::Metadata
    }
}

/// Tunables for [`crate::session::PortalSessionMachine`].
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub cursor_mode: CursorMode,
    /// Prefix used when generating `handle_token`/`session_handle_token`
    /// values (§4.2 "Request tokens").
    pub token_prefix: String,
    /// How long to wait for a portal `Response` signal before treating the
    /// call as failed.
    pub response_timeout: std::time::Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            cursor_mode: CursorMode::default(),
            token_prefix: "scrcap".to_string(),
            response_timeout: std::time::Duration::from_secs(30),
        }
    }
}

impl PortalConfig {
    #[must_use]
    pub fn builder() -> PortalConfigBuilder {
        PortalConfigBuilder::default()
    }
}

/// Builder for [`PortalConfig`].
#[derive(Debug, Default)]
pub struct PortalConfigBuilder {
    cursor_mode: Option<CursorMode>,
    token_prefix: Option<String>,
    response_timeout: Option<std::time::Duration>,
}

impl PortalConfigBuilder {
    #[must_use]
    pub fn cursor_mode(mut self, mode: CursorMode) -> Self {
        self.cursor_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn token_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.token_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn response_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn build(self) -> PortalConfig {
        let default = PortalConfig::default();
        PortalConfig {
            cursor_mode: self.cursor_mode.unwrap_or(default.cursor_mode),
            token_prefix: self.token_prefix.unwrap_or(default.token_prefix),
            response_timeout: self.response_timeout.unwrap_or(default.response_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = PortalConfig::default();
        assert_eq!(config.cursor_mode, CursorMode::Metadata);
        assert_eq!(config.token_prefix, "scrcap");
    }

    #[test]
    fn builder_overrides_only_set_fields() {
        let config = PortalConfig::builder().cursor_mode(CursorMode::Hidden).build();
        assert_eq!(config.cursor_mode, CursorMode::Hidden);
        assert_eq!(config.token_prefix, "scrcap");
    }
}
