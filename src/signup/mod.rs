mod rules;
mod service;
mod validator;


use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use crate::form::{ErrorMap, FieldKey, FieldLens, FormError, FormModel, SubmissionError, SubmitState};

pub use crate::config::Strictness;
pub use rules::SignupRules;
pub use service::{AccountService, BoxedSubmitFuture, SignupRequest, SimulatedAccountService};
pub use validator::{SignupSnapshot, SignupValidator};

pub type SubmissionStatus = SubmitState;
pub type SignupErrors = ErrorMap<SignupFieldError>;

#[derive(Clone, Default, Eq, PartialEq, crate::form::FormModel)]
pub struct SignupForm {
    pub username: String,
    pub password: String,
    #[form(key = "confirmPassword")]
    pub confirm_password: String,
}

impl SignupForm {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            confirm_password: String::new(),
        }
    }

    pub fn with_confirmation(mut self, confirm_password: impl Into<String>) -> Self {
        self.confirm_password = confirm_password.into();
        self
    }
}

impl Debug for SignupForm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupForm")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("confirm_password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SignupField {
    Username,
    Password,
    ConfirmPassword,
}

impl SignupField {
    pub const ALL: [SignupField; 3] = [
        SignupField::Username,
        SignupField::Password,
        SignupField::ConfirmPassword,
    ];

    pub fn key(self) -> FieldKey {
        let fields = SignupForm::fields();
        match self {
            SignupField::Username => fields.username().key(),
            SignupField::Password => fields.password().key(),
            SignupField::ConfirmPassword => fields.confirm_password().key(),
        }
    }

    pub fn name(self) -> &'static str {
        self.key().as_str()
    }

    pub fn from_key(key: FieldKey) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }
}

impl Display for SignupField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignupField {
    type Err = FormError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.name() == name)
            .ok_or_else(|| FormError::UnknownField(name.to_string()))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SignupFieldError {
    EmailRequired,
    EmailDomain { institution: String, domain: String },
    PasswordRequired,
    PasswordTooShort { min_len: usize },
    PasswordMismatch,
}

impl Display for SignupFieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SignupFieldError::EmailRequired => f.write_str("Email is required"),
            SignupFieldError::EmailDomain {
                institution,
                domain,
            } => write!(f, "Use your {institution} email (@{domain})"),
            SignupFieldError::PasswordRequired => f.write_str("Password is required"),
            SignupFieldError::PasswordTooShort { min_len } => {
                write!(f, "Minimum {min_len} characters required")
            }
            SignupFieldError::PasswordMismatch => f.write_str("Passwords do not match"),
        }
    }
}

impl crate::form::ValidationError for SignupFieldError {
    fn message(&self) -> String {
        self.to_string()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubmitResult {
    Rejected(SignupErrors),
    Failed(SubmissionError),
    Succeeded { message: String },
}

impl SubmitResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmitResult::Succeeded { .. })
    }
}

/// Flattens an error map into wire field names and display messages.
pub fn error_messages(errors: &SignupErrors) -> BTreeMap<&'static str, String> {
    errors
        .iter()
        .map(|(key, error)| (key.as_str(), error.to_string()))
        .collect()
}
