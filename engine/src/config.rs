//! Access configuration for remote accessors.

use std::env;
use std::fmt;

/// Scope requested when none is configured.
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Family of remote call, each with its own shared-drive parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallClass {
    Get,
    List,
    Write,
}

/// How an accessor authenticates and which drives it reaches.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessConfig {
    /// Opaque credential material (token or credential file contents)
    credentials: String,
    /// Requested authorization scopes
    scopes: Vec<String>,
    /// Include shared drives in every request
    pub supports_all_drives: bool,
}

impl AccessConfig {
    /// Create a config with the default scope and shared drives enabled.
    pub fn new(credentials: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_scopes(credentials, [DEFAULT_SCOPE])
    }

    pub fn with_scopes<S: Into<String>>(
        credentials: impl Into<String>,
        scopes: impl IntoIterator<Item = S>,
    ) -> Result<Self, ConfigError> {
        let credentials = credentials.into();
        if credentials.trim().is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        let scopes: Vec<String> = scopes.into_iter().map(Into::into).collect();
        if scopes.is_empty() {
            return Err(ConfigError::NoScopes);
        }
        if scopes.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::BlankScope);
        }

        Ok(Self {
            credentials,
            scopes,
            supports_all_drives: true,
        })
    }

    pub fn with_all_drives(mut self, supports_all_drives: bool) -> Self {
        self.supports_all_drives = supports_all_drives;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// `CANOPY_CREDENTIALS` is required. `CANOPY_SCOPES` is a comma-separated
    /// list and `CANOPY_SUPPORTS_ALL_DRIVES` defaults to true.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load a `.env` file if one exists, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let credentials = lookup("CANOPY_CREDENTIALS").ok_or(ConfigError::MissingCredentials)?;

        let config = match lookup("CANOPY_SCOPES") {
            Some(raw) => Self::with_scopes(credentials, raw.split(',').map(str::trim))?,
            None => Self::new(credentials)?,
        };

        let supports_all_drives = match lookup("CANOPY_SUPPORTS_ALL_DRIVES") {
            Some(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidFlag(raw))?,
            None => true,
        };

        Ok(config.with_all_drives(supports_all_drives))
    }

    pub fn credentials(&self) -> &str {
        &self.credentials
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Extra request parameters for a call of the given class.
    ///
    /// Empty when shared drives are disabled.
    pub fn request_params(&self, class: CallClass) -> Vec<(&'static str, &'static str)> {
        if !self.supports_all_drives {
            return Vec::new();
        }
        match class {
            CallClass::Get | CallClass::Write => vec![("supportsAllDrives", "true")],
            CallClass::List => vec![
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ],
        }
    }
}

impl fmt::Debug for AccessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessConfig")
            .field("credentials", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("supports_all_drives", &self.supports_all_drives)
            .finish()
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("CANOPY_CREDENTIALS is required and must not be blank")]
    MissingCredentials,

    #[error("at least one scope is required")]
    NoScopes,

    #[error("scopes must not be blank")]
    BlankScope,

    #[error("invalid CANOPY_SUPPORTS_ALL_DRIVES value: {0}")]
    InvalidFlag(String),
}
