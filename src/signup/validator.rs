use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{
    AccountService, SignupErrors, SignupField, SignupFieldError, SignupForm, SignupRequest,
    SignupRules, SimulatedAccountService, Strictness, SubmissionStatus, SubmitResult,
};
use crate::config::{ConfigError, SignupConfig};
use crate::form::{
    ErrorClearing, FormController, FormError, FormModel, FormOptions, FormResult,
    FormSnapshot, SubmissionError, SubmitOutcome, SubscriptionId, ValidationMode,
};

const SUBMIT_LABEL: &str = "Create Account";
const SUBMIT_LABEL_LOADING: &str = "Creating account...";
const PASSWORD_SHOW_LABEL: &str = "Show";
const PASSWORD_HIDE_LABEL: &str = "Hide";

/// Everything a presentation layer needs to draw the signup form.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignupSnapshot {
    pub form: SignupForm,
    pub errors: SignupErrors,
    pub status: SubmissionStatus,
    pub success_message: Option<String>,
    pub submission_error: Option<SubmissionError>,
    pub password_visible: bool,
    pub strictness: Strictness,
}

impl SignupSnapshot {
    fn compose(
        snapshot: &FormSnapshot<SignupForm, SignupFieldError>,
        password_visible: bool,
        strictness: Strictness,
    ) -> Self {
        Self {
            form: snapshot.model.clone(),
            errors: snapshot.errors(),
            status: snapshot.submit_state,
            success_message: snapshot.success_message.clone(),
            submission_error: snapshot.submission_error.clone(),
            password_visible,
            strictness,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == SubmissionStatus::Submitting
    }

    pub fn can_submit(&self) -> bool {
        !matches!(
            self.status,
            SubmissionStatus::Validating | SubmissionStatus::Submitting
        )
    }

    pub fn submit_label(&self) -> &'static str {
        if self.is_loading() {
            SUBMIT_LABEL_LOADING
        } else {
            SUBMIT_LABEL
        }
    }

    pub fn password_toggle_label(&self) -> &'static str {
        if self.password_visible {
            PASSWORD_HIDE_LABEL
        } else {
            PASSWORD_SHOW_LABEL
        }
    }

    pub fn error_message(&self, field: SignupField) -> Option<String> {
        self.errors.get(&field.key()).map(ToString::to_string)
    }
}

/// Signup form state holder: email, password and, in the strict variant, a
/// confirmation, validated on submit and handed to an [`AccountService`].
#[derive(Clone)]
pub struct SignupValidator {
    config: Arc<SignupConfig>,
    rules: Arc<SignupRules>,
    controller: FormController<SignupForm, SignupFieldError>,
    service: Arc<dyn AccountService>,
    password_visible: Arc<AtomicBool>,
}

impl SignupValidator {
    pub fn new(config: SignupConfig) -> Result<Self, ConfigError> {
        let service = SimulatedAccountService::new(config.submit_delay());
        Self::with_service(config, service)
    }

    pub fn with_service(
        config: SignupConfig,
        service: impl AccountService,
    ) -> Result<Self, ConfigError> {
        let rules = Arc::new(SignupRules::from_config(&config)?);
        let options = FormOptions {
            validate_mode: ValidationMode::OnSubmit,
            error_clearing: match config.strictness {
                Strictness::Lenient => ErrorClearing::Field,
                Strictness::Strict => ErrorClearing::All,
            },
            validate_first_error_only: true,
            reset_on_success: true,
            success_message: Some(config.success_message()),
        };
        let controller = FormController::new(SignupForm::default(), options);
        register_rules(&controller, &rules, &config).map_err(ConfigError::Form)?;

        tracing::debug!(
            institution = %config.institution,
            strictness = ?config.strictness,
            "signup validator ready"
        );
        Ok(Self {
            config: Arc::new(config),
            rules,
            controller,
            service: Arc::new(service),
            password_visible: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &SignupConfig {
        &self.config
    }

    pub fn strictness(&self) -> Strictness {
        self.config.strictness
    }

    pub fn rules(&self) -> &SignupRules {
        &self.rules
    }

    pub fn controller(&self) -> &FormController<SignupForm, SignupFieldError> {
        &self.controller
    }

    pub fn fields(&self) -> Vec<SignupField> {
        SignupField::ALL
            .into_iter()
            .filter(|field| self.is_enabled(*field))
            .collect()
    }

    pub fn is_enabled(&self, field: SignupField) -> bool {
        field != SignupField::ConfirmPassword || self.rules.requires_confirmation()
    }

    pub fn on_field_change(&self, field: SignupField, value: impl Into<String>) -> FormResult<()> {
        if !self.is_enabled(field) {
            return Err(FormError::UnknownField(field.name().to_string()));
        }
        let fields = SignupForm::fields();
        let value = value.into();
        tracing::debug!(field = field.name(), "signup field changed");
        match field {
            SignupField::Username => self.controller.set(fields.username(), value),
            SignupField::Password => self.controller.set(fields.password(), value),
            SignupField::ConfirmPassword => self.controller.set(fields.confirm_password(), value),
        }
    }

    pub fn on_named_field_change(&self, name: &str, value: impl Into<String>) -> FormResult<()> {
        let field = name.parse::<SignupField>()?;
        self.on_field_change(field, value)
    }

    /// Checks `form` against the rules without touching the held state.
    pub fn validate(&self, form: &SignupForm) -> SignupErrors {
        self.rules.validate(form)
    }

    pub async fn submit(&self) -> FormResult<SubmitResult> {
        let service = self.service.clone();
        let outcome = self
            .controller
            .submit_async(move |form| async move {
                let request = SignupRequest::from(form);
                service.create_account(&request).await
            })
            .await?;

        Ok(match outcome {
            SubmitOutcome::Rejected(errors) => SubmitResult::Rejected(errors),
            SubmitOutcome::Failed(error) => SubmitResult::Failed(error),
            SubmitOutcome::Succeeded => SubmitResult::Succeeded {
                message: self.config.success_message(),
            },
        })
    }

    pub fn snapshot(&self) -> FormResult<SignupSnapshot> {
        let snapshot = self.controller.snapshot()?;
        Ok(SignupSnapshot::compose(
            &snapshot,
            self.is_password_visible(),
            self.strictness(),
        ))
    }

    pub fn subscribe(
        &self,
        observer: impl Fn(&SignupSnapshot) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId> {
        let password_visible = self.password_visible.clone();
        let strictness = self.strictness();
        self.controller.subscribe(move |snapshot| {
            observer(&SignupSnapshot::compose(
                snapshot,
                password_visible.load(Ordering::SeqCst),
                strictness,
            ))
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> FormResult<bool> {
        self.controller.unsubscribe(id)
    }

    pub fn is_password_visible(&self) -> bool {
        self.password_visible.load(Ordering::SeqCst)
    }

    /// Flips password visibility and returns the new value. The strict
    /// variant has no toggle, so the password stays masked there.
    pub fn toggle_password_visibility(&self) -> FormResult<bool> {
        if self.strictness() == Strictness::Strict {
            return Ok(false);
        }
        let visible = !self.password_visible.fetch_xor(true, Ordering::SeqCst);
        self.controller.notify()?;
        Ok(visible)
    }

    pub fn email_placeholder(&self) -> String {
        self.config.email_placeholder()
    }

    pub fn field_description(&self, field: SignupField) -> FormResult<Option<String>> {
        let fields = SignupForm::fields();
        match field {
            SignupField::Username => self.controller.field_description(fields.username()),
            SignupField::Password => self.controller.field_description(fields.password()),
            SignupField::ConfirmPassword => {
                self.controller.field_description(fields.confirm_password())
            }
        }
    }

    pub fn is_required(&self, field: SignupField) -> FormResult<bool> {
        let fields = SignupForm::fields();
        match field {
            SignupField::Username => self.controller.is_required(fields.username()),
            SignupField::Password => self.controller.is_required(fields.password()),
            SignupField::ConfirmPassword => self.controller.is_required(fields.confirm_password()),
        }
    }
}

fn register_rules(
    controller: &FormController<SignupForm, SignupFieldError>,
    rules: &Arc<SignupRules>,
    config: &SignupConfig,
) -> FormResult<()> {
    let fields = SignupForm::fields();

    let username_rules = rules.clone();
    controller.register_field_validator(
        fields.username(),
        move |_form: &SignupForm, value: &String| username_rules.check_username(value),
    )?;
    controller.register_required_field(fields.username())?;
    controller.register_field_description(fields.username(), config.email_description())?;

    let password_rules = rules.clone();
    controller.register_field_validator(
        fields.password(),
        move |_form: &SignupForm, value: &String| password_rules.check_password(value),
    )?;
    controller.register_required_field(fields.password())?;

    if rules.requires_confirmation() {
        controller.register_field_validator(
            fields.confirm_password(),
            |form: &SignupForm, value: &String| {
                SignupRules::check_confirmation(&form.password, value)
            },
        )?;
        controller.register_required_field(fields.confirm_password())?;
    }
    Ok(())
}
