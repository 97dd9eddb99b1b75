use regex::Regex;

use super::{SignupErrors, SignupField, SignupFieldError, SignupForm};
use crate::config::{ConfigError, SignupConfig, Strictness};

/// Field rules for one institution. Each check is independent of the others,
/// so a form can fail on every field at once.
#[derive(Clone, Debug)]
pub struct SignupRules {
    institution: String,
    email_domain: String,
    min_password_len: usize,
    requires_confirmation: bool,
    email_pattern: Regex,
}

impl SignupRules {
    pub fn from_config(config: &SignupConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pattern = format!(
            "^[A-Za-z0-9._%+-]+@{}$",
            regex::escape(&config.email_domain)
        );
        let email_pattern = Regex::new(&pattern).map_err(ConfigError::EmailPattern)?;
        Ok(Self {
            institution: config.institution.clone(),
            email_domain: config.email_domain.clone(),
            min_password_len: config.min_password_len,
            requires_confirmation: config.strictness == Strictness::Strict,
            email_pattern,
        })
    }

    pub fn requires_confirmation(&self) -> bool {
        self.requires_confirmation
    }

    pub fn min_password_len(&self) -> usize {
        self.min_password_len
    }

    pub fn check_username(&self, value: &str) -> Result<(), SignupFieldError> {
        if value.is_empty() {
            return Err(SignupFieldError::EmailRequired);
        }
        if !self.email_pattern.is_match(value) {
            return Err(SignupFieldError::EmailDomain {
                institution: self.institution.clone(),
                domain: self.email_domain.clone(),
            });
        }
        Ok(())
    }

    pub fn check_password(&self, value: &str) -> Result<(), SignupFieldError> {
        if value.is_empty() {
            return Err(SignupFieldError::PasswordRequired);
        }
        // UTF-16 code units, so "😀😀😀" is six long.
        if value.encode_utf16().count() < self.min_password_len {
            return Err(SignupFieldError::PasswordTooShort {
                min_len: self.min_password_len,
            });
        }
        Ok(())
    }

    // Compared even when both are empty; the password rule reports emptiness.
    pub fn check_confirmation(password: &str, confirm: &str) -> Result<(), SignupFieldError> {
        if password == confirm {
            Ok(())
        } else {
            Err(SignupFieldError::PasswordMismatch)
        }
    }

    pub fn validate(&self, form: &SignupForm) -> SignupErrors {
        let mut errors = SignupErrors::new();
        if let Err(error) = self.check_username(&form.username) {
            errors.insert(SignupField::Username.key(), error);
        }
        if let Err(error) = self.check_password(&form.password) {
            errors.insert(SignupField::Password.key(), error);
        }
        if self.requires_confirmation
            && let Err(error) = Self::check_confirmation(&form.password, &form.confirm_password)
        {
            errors.insert(SignupField::ConfirmPassword.key(), error);
        }
        errors
    }
}
