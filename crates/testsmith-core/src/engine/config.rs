use std::time::Duration;

use secrecy::SecretString;

/// Connection and sampling settings for an [`super::AnthropicEngine`].
///
/// Built explicitly by the caller; nothing here is read from the process
/// environment, which keeps engines constructible in tests.
#[derive(Debug)]
pub struct EngineConfig {
    /// API key sent as `x-api-key`.
    pub api_key: SecretString,
    /// Model identifier.
    pub model: String,
    /// Upper bound on completion tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Base URL without the `/v1` suffix.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl EngineConfig {
    pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
    pub const DEFAULT_MAX_TOKENS: u32 = 2048;
    pub const DEFAULT_TEMPERATURE: f32 = 0.1;
    pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Build a config with the given key and defaults for everything else.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            model: Self::DEFAULT_MODEL.to_owned(),
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            temperature: Self::DEFAULT_TEMPERATURE,
            base_url: Self::DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of the Messages endpoint.
    pub fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn new_sets_defaults() {
        let cfg = EngineConfig::new("sk-test");
        assert_eq!(cfg.api_key.expose_secret(), "sk-test");
        assert_eq!(cfg.model, EngineConfig::DEFAULT_MODEL);
        assert_eq!(cfg.max_tokens, 2048);
        assert_eq!(cfg.base_url, "https://api.anthropic.com");
        assert_eq!(cfg.timeout, Duration::from_secs(120));
    }

    #[test]
    fn messages_url_strips_trailing_slash() {
        let cfg = EngineConfig::new("k").base_url("http://localhost:9999/");
        assert_eq!(cfg.messages_url(), "http://localhost:9999/v1/messages");
    }

    #[test]
    fn debug_does_not_leak_key() {
        let cfg = EngineConfig::new("sk-very-secret");
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("sk-very-secret"), "key leaked: {debug}");
    }
}
