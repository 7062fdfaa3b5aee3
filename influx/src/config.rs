use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub retention_policy: Option<String>,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8086".to_string(),
            username: Some("root".to_string()),
            password: Some("root".to_string()),
            timeout: Duration::from_secs(30),
            retention_policy: None,
        }
    }
}

impl InfluxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn without_credentials(mut self) -> Self {
        self.username = None;
        self.password = None;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retention_policy(mut self, retention_policy: impl Into<String>) -> Self {
        self.retention_policy = Some(retention_policy.into());
        self
    }

    /// Port of the configured endpoint, falling back to the scheme default.
    pub fn port(&self) -> Option<u16> {
        reqwest::Url::parse(&self.base_url)
            .ok()?
            .port_or_known_default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("Base URL cannot be empty".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("Base URL must start with http:// or https://".to_string());
        }

        if reqwest::Url::parse(&self.base_url).is_err() {
            return Err(format!("Base URL is not a valid URL: {}", self.base_url));
        }

        if self.password.is_some() && self.username.is_none() {
            return Err("Password requires a username".to_string());
        }

        if let Some(username) = &self.username {
            if username.is_empty() {
                return Err("Username cannot be empty".to_string());
            }
        }

        if let Some(retention_policy) = &self.retention_policy {
            if retention_policy.is_empty() {
                return Err("Retention policy cannot be empty".to_string());
            }
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}
