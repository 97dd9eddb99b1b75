use crate::form::{FieldLens as _, FormModel as _};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn prelude_exports_signup_surface() {
    use crate::prelude::*;

    assert_send_sync::<SignupValidator>();
    assert_send_sync::<FormController<SignupForm, SignupFieldError>>();
    assert_send_sync::<SimulatedAccountService>();

    let _ = SignupConfig::default();
    let _ = FormOptions::default();
    let _ = ValidationMode::OnSubmit;
    let _ = ErrorClearing::Field;
    let _ = Strictness::Strict;
    let _ = SubmissionStatus::Idle;
    let _ = SignupField::ConfirmPassword;
}

#[test]
fn signup_form_lenses_use_wire_names() {
    let fields = crate::signup::SignupForm::fields();
    assert_eq!(fields.username().key().as_str(), "username");
    assert_eq!(fields.password().key().as_str(), "password");
    assert_eq!(fields.confirm_password().key().as_str(), "confirmPassword");
    assert_eq!(
        crate::signup::SignupFormFields::KEYS,
        &["username", "password", "confirmPassword"]
    );
}

#[test]
fn root_reexports_build_a_validator() {
    let validator = crate::SignupValidator::new(crate::SignupConfig::default())
        .expect("default config is valid");
    assert_eq!(validator.strictness(), crate::Strictness::Lenient);
}
