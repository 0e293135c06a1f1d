//! Connection settings and TOML profiles

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::engine::SyncOptions;
use crate::error::{Result, SyncError};
use crate::filter::FilterSet;

/// Environment variable consulted when a profile carries no password
pub const PASSWORD_ENV: &str = "SFTPSYNC_PASSWORD";

/// How to reach and authenticate against the SFTP server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Limit for establishing and authenticating one session
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Accepted SHA-256 host key fingerprints; any key is accepted when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_fingerprints: Option<Vec<String>>,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: username.into(),
            password: None,
            timeout: default_timeout(),
            max_attempts: default_max_attempts(),
            allowed_fingerprints: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SyncError::Config("host cannot be empty".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(SyncError::Config("username cannot be empty".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(SyncError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Fill in the password from the environment when none is configured
    pub fn with_env_password(mut self) -> Self {
        if self.password.is_none() {
            self.password = std::env::var(PASSWORD_ENV).ok();
        }
        self
    }
}

/// A saved connection plus default sync options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub sync: SyncOptions,
}

impl Profile {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            SyncError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let profile = Self::parse(&content)?;
        Ok(Self {
            connection: profile.connection.with_env_password(),
            sync: profile.sync,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(content)
            .map_err(|e| SyncError::Config(format!("Invalid profile: {}", e)))?;
        profile.validate()?;
        Ok(profile)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SyncError::Config(format!("Failed to serialize profile: {}", e)))?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;
        FilterSet::new(&self.sync.includes, &self.sync.excludes)
            .map_err(|e| SyncError::Config(e.to_string()))?;
        Ok(())
    }
}

fn default_port() -> u16 {
    22
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_attempts() -> u32 {
    3
}
