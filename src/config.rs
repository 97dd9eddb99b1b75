use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::form::FormError;

pub const DEFAULT_INSTITUTION: &str = "KIIT";
pub const DEFAULT_EMAIL_DOMAIN: &str = "kiit.ac.in";
pub const DEFAULT_MIN_PASSWORD_LEN: usize = 6;
pub const DEFAULT_SUBMIT_DELAY_MS: u64 = 1000;

/// How much the signup form asks of the user.
///
/// `Lenient` has no confirmation field, clears only the edited field's error
/// and offers a password visibility toggle. `Strict` adds `confirmPassword`
/// and clears every error on any edit.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    #[default]
    Lenient,
    Strict,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SignupConfig {
    pub institution: String,
    pub email_domain: String,
    pub min_password_len: usize,
    pub strictness: Strictness,
    pub submit_delay_ms: u64,
    pub success_message: Option<String>,
}

impl Default for SignupConfig {
    fn default() -> Self {
        Self {
            institution: DEFAULT_INSTITUTION.to_string(),
            email_domain: DEFAULT_EMAIL_DOMAIN.to_string(),
            min_password_len: DEFAULT_MIN_PASSWORD_LEN,
            strictness: Strictness::default(),
            submit_delay_ms: DEFAULT_SUBMIT_DELAY_MS,
            success_message: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid(&'static str),
    EmailPattern(regex::Error),
    Form(FormError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read signup config at {}: {source}", path.display())
            }
            ConfigError::Parse(error) => write!(f, "failed to parse signup config: {error}"),
            ConfigError::Invalid(reason) => write!(f, "invalid signup config: {reason}"),
            ConfigError::EmailPattern(error) => {
                write!(f, "failed to build email pattern: {error}")
            }
            ConfigError::Form(error) => write!(f, "failed to set up signup form: {error}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse(error) => Some(error),
            ConfigError::EmailPattern(error) => Some(error),
            ConfigError::Form(error) => Some(error),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl SignupConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Loads `path`, falling back to the defaults when the file is missing
    /// or unusable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no signup config, using defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "ignoring signup config");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.institution.trim().is_empty() {
            return Err(ConfigError::Invalid("institution must not be empty"));
        }
        if self.email_domain.trim().is_empty() {
            return Err(ConfigError::Invalid("email_domain must not be empty"));
        }
        if self.email_domain.contains('@') {
            return Err(ConfigError::Invalid("email_domain must not contain '@'"));
        }
        if self.min_password_len == 0 {
            return Err(ConfigError::Invalid("min_password_len must be at least 1"));
        }
        Ok(())
    }

    pub fn submit_delay(&self) -> Duration {
        Duration::from_millis(self.submit_delay_ms)
    }

    pub fn success_message(&self) -> String {
        self.success_message.clone().unwrap_or_else(|| {
            format!("Signup successful. {} email verified.", self.institution)
        })
    }

    pub fn email_placeholder(&self) -> String {
        format!("yourroll@{}", self.email_domain)
    }

    pub fn email_description(&self) -> String {
        format!("Use your official {} email", self.institution)
    }
}
