use signup_form::form::{FieldLens, FormModel};

#[derive(Clone, FormModel)]
struct LoginForm {
    email: String,
    password: String,
}

fn main() {
    let fields = LoginForm::fields();
    assert_eq!(fields.email().key().as_str(), "email");
    assert_eq!(fields.password().key().as_str(), "password");

    let mut form = LoginForm {
        email: String::new(),
        password: String::new(),
    };
    fields.email().set(&mut form, "a@kiit.ac.in".to_string());
    assert_eq!(fields.email().get(&form), "a@kiit.ac.in");
    assert!(fields.password().get(&form).is_empty());
}
