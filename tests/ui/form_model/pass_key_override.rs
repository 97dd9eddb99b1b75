use signup_form::form::{FieldLens, FormModel};

#[derive(Clone, FormModel)]
pub struct RegisterForm {
    pub username: String,
    #[form(key = "confirmPassword")]
    pub confirm_password: String,
    #[form(key = "acceptTerms")]
    pub accept_terms: bool,
}

fn main() {
    let fields = RegisterForm::fields();
    assert_eq!(fields.confirm_password().key().as_str(), "confirmPassword");
    assert_eq!(
        RegisterFormFields::KEYS,
        &["username", "confirmPassword", "acceptTerms"]
    );

    let mut form = RegisterForm {
        username: String::new(),
        confirm_password: String::new(),
        accept_terms: false,
    };
    fields.accept_terms().set(&mut form, true);
    assert!(*fields.accept_terms().get(&form));
}
