use super::*;
use futures::channel::oneshot;
use futures::executor::block_on;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;

#[derive(Clone, Debug, Eq, PartialEq)]
struct TestError(&'static str);

impl ValidationError for TestError {
    fn message(&self) -> String {
        self.0.to_string()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, FormModel)]
struct ProfileForm {
    email: String,
    password: String,
    #[form(key = "confirmPassword")]
    confirm_password: String,
}

fn base_form() -> ProfileForm {
    ProfileForm {
        email: "user@example.com".into(),
        password: "pass".into(),
        confirm_password: "pass".into(),
    }
}

fn required(_model: &ProfileForm, value: &String) -> Result<(), TestError> {
    if value.is_empty() {
        Err(TestError("required"))
    } else {
        Ok(())
    }
}

#[derive(Clone)]
struct PerfForm {
    values: BTreeMap<&'static str, String>,
}

impl FormModel for PerfForm {
    type Fields = ();

    fn fields() -> Self::Fields {}
}

#[derive(Clone, Copy)]
struct MapLens {
    key: &'static str,
}

impl FieldLens<PerfForm> for MapLens {
    type Value = String;

    fn key(self) -> FieldKey {
        FieldKey::new(self.key)
    }

    fn get<'a>(self, model: &'a PerfForm) -> &'a Self::Value {
        model
            .values
            .get(self.key)
            .expect("perf key must exist in model values")
    }

    fn set(self, model: &mut PerfForm, value: Self::Value) {
        model.values.insert(self.key, value);
    }
}

#[test]
fn field_lens_updates_model_and_dirty_state() {
    let controller =
        FormController::<ProfileForm, TestError>::new(base_form(), FormOptions::default());
    let fields = ProfileForm::fields();

    controller
        .set(fields.email(), "changed@example.com".into())
        .expect("set must succeed");
    let snapshot = controller.snapshot().expect("snapshot must succeed");
    assert!(snapshot.is_dirty);
    assert_eq!(snapshot.model.email, "changed@example.com");
    assert!(
        snapshot
            .field_meta
            .get(&fields.email().key())
            .is_some_and(|meta| meta.dirty)
    );

    controller
        .set(fields.email(), "user@example.com".into())
        .expect("restore original value");
    assert!(!controller.snapshot().expect("snapshot").is_dirty);
}

#[test]
fn validation_mode_controls_when_errors_appear() {
    let fields = ProfileForm::fields();
    let on_change = FormController::<ProfileForm, TestError>::new(
        base_form(),
        FormOptions {
            validate_mode: ValidationMode::OnChange,
            error_clearing: ErrorClearing::None,
            ..FormOptions::default()
        },
    );
    on_change
        .register_field_validator(fields.email(), required)
        .expect("register validator");
    on_change
        .set(fields.email(), "".into())
        .expect("set should trigger validation");
    assert_eq!(
        on_change.errors().expect("errors").get(&fields.email().key()),
        Some(&TestError("required"))
    );

    let on_submit = FormController::<ProfileForm, TestError>::new(
        base_form(),
        FormOptions {
            validate_mode: ValidationMode::OnSubmit,
            ..FormOptions::default()
        },
    );
    on_submit
        .register_field_validator(fields.email(), required)
        .expect("register validator");
    on_submit
        .set(fields.email(), "".into())
        .expect("set should not trigger validation immediately");
    assert!(on_submit.errors().expect("errors").is_empty());
    assert!(!on_submit.validate_form().expect("validate form"));
}

#[test]
fn touch_validates_in_blur_mode() {
    let fields = ProfileForm::fields();
    let controller = FormController::<ProfileForm, TestError>::new(
        base_form(),
        FormOptions {
            validate_mode: ValidationMode::OnBlur,
            ..FormOptions::default()
        },
    );
    controller
        .register_field_validator(fields.password(), required)
        .expect("register validator");

    controller
        .set(fields.password(), "".into())
        .expect("set password");
    assert_eq!(
        controller
            .field_error_for_display(fields.password())
            .expect("display error"),
        None
    );

    controller.touch(fields.password()).expect("touch field");
    let meta = controller
        .field_meta(fields.password())
        .expect("meta")
        .expect("meta exists");
    assert!(meta.touched);
    assert_eq!(
        controller
            .field_error_for_display(fields.password())
            .expect("display error"),
        Some("required".to_string())
    );
}

#[test]
fn field_clearing_keeps_other_field_errors() {
    let fields = ProfileForm::fields();
    let controller = FormController::<ProfileForm, TestError>::new(
        ProfileForm::default(),
        FormOptions {
            error_clearing: ErrorClearing::Field,
            ..FormOptions::default()
        },
    );
    controller
        .register_field_validator(fields.email(), required)
        .expect("register email validator");
    controller
        .register_field_validator(fields.password(), required)
        .expect("register password validator");

    assert!(!controller.validate_form().expect("validate"));
    controller
        .set(fields.email(), "a".into())
        .expect("edit email");

    let errors = controller.errors().expect("errors");
    assert_eq!(errors.get(&fields.email().key()), None);
    assert_eq!(
        errors.get(&fields.password().key()),
        Some(&TestError("required"))
    );
}

#[test]
fn all_clearing_wipes_every_error_on_edit() {
    let fields = ProfileForm::fields();
    let controller = FormController::<ProfileForm, TestError>::new(
        ProfileForm::default(),
        FormOptions {
            error_clearing: ErrorClearing::All,
            ..FormOptions::default()
        },
    );
    controller
        .register_field_validator(fields.email(), required)
        .expect("register email validator");
    controller
        .register_field_validator(fields.password(), required)
        .expect("register password validator");

    assert!(!controller.validate_form().expect("validate"));
    assert_eq!(controller.errors().expect("errors").len(), 2);
    controller
        .set(fields.confirm_password(), "x".into())
        .expect("edit confirm");
    assert!(controller.errors().expect("errors").is_empty());
}

#[test]
fn first_error_only_stops_at_first_failing_rule() {
    let fields = ProfileForm::fields();
    let strict_rule = |_model: &ProfileForm, value: &String| {
        if value.len() < 6 {
            Err(TestError("too short"))
        } else {
            Ok(())
        }
    };

    let first_only =
        FormController::<ProfileForm, TestError>::new(ProfileForm::default(), FormOptions::default());
    first_only
        .register_field_validator(fields.password(), required)
        .expect("register required");
    first_only
        .register_field_validator(fields.password(), strict_rule)
        .expect("register length");
    first_only.validate_form().expect("validate");
    let meta = first_only
        .field_meta(fields.password())
        .expect("meta")
        .expect("meta exists");
    assert_eq!(meta.errors, vec![TestError("required")]);

    let every_error = FormController::<ProfileForm, TestError>::new(
        ProfileForm::default(),
        FormOptions {
            validate_first_error_only: false,
            ..FormOptions::default()
        },
    );
    every_error
        .register_field_validator(fields.password(), required)
        .expect("register required");
    every_error
        .register_field_validator(fields.password(), strict_rule)
        .expect("register length");
    every_error.validate_form().expect("validate");
    let meta = every_error
        .field_meta(fields.password())
        .expect("meta")
        .expect("meta exists");
    assert_eq!(meta.errors, vec![TestError("required"), TestError("too short")]);
}

#[test]
fn form_validator_reports_cross_field_errors() {
    let fields = ProfileForm::fields();
    let controller = FormController::<ProfileForm, TestError>::new(
        ProfileForm {
            confirm_password: "other".into(),
            ..base_form()
        },
        FormOptions::default(),
    );
    controller
        .register_form_validator(|model: &ProfileForm| {
            if model.password == model.confirm_password {
                Vec::new()
            } else {
                vec![(
                    ProfileForm::fields().confirm_password().key(),
                    TestError("mismatch"),
                )]
            }
        })
        .expect("register form validator");

    assert!(!controller.validate_form().expect("validate"));
    let errors = controller.errors().expect("errors");
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.get(&fields.confirm_password().key()),
        Some(&TestError("mismatch"))
    );

    controller
        .set(fields.confirm_password(), "pass".into())
        .expect("fix confirm");
    assert!(controller.validate_form().expect("validate again"));
}

#[test]
fn evaluate_leaves_state_untouched() {
    let fields = ProfileForm::fields();
    let controller =
        FormController::<ProfileForm, TestError>::new(base_form(), FormOptions::default());
    controller
        .register_field_validator(fields.email(), required)
        .expect("register validator");

    let errors = controller
        .evaluate(&ProfileForm::default())
        .expect("evaluate");
    assert_eq!(
        errors.get(&fields.email().key()),
        Some(&vec![TestError("required")])
    );
    let snapshot = controller.snapshot().expect("snapshot");
    assert!(snapshot.field_meta.is_empty());
    assert_eq!(snapshot.model, base_form());
}

#[test]
fn rejected_submit_keeps_model_and_returns_to_idle() {
    let fields = ProfileForm::fields();
    let controller =
        FormController::<ProfileForm, TestError>::new(base_form(), FormOptions::default());
    controller
        .register_field_validator(fields.email(), required)
        .expect("register validator");
    controller
        .set(fields.email(), "".into())
        .expect("set invalid email");

    let submit_count = Arc::new(AtomicUsize::new(0));
    let outcome = {
        let submit_count = submit_count.clone();
        block_on(controller.submit_async(move |_model| async move {
            submit_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .expect("submit should return an outcome")
    };

    assert_eq!(submit_count.load(Ordering::SeqCst), 0);
    let mut expected = ErrorMap::new();
    expected.insert(fields.email().key(), TestError("required"));
    assert_eq!(outcome, SubmitOutcome::Rejected(expected));

    let snapshot = controller.snapshot().expect("snapshot");
    assert_eq!(snapshot.submit_state, SubmitState::Idle);
    assert_eq!(snapshot.submit_count, 1);
    assert_eq!(snapshot.model.email, "");
    assert!(!snapshot.is_valid);
}

#[test]
fn successful_submit_resets_model_and_sets_message() {
    let fields = ProfileForm::fields();
    let controller = FormController::<ProfileForm, TestError>::new(
        ProfileForm::default(),
        FormOptions {
            reset_on_success: true,
            success_message: Some("done".into()),
            ..FormOptions::default()
        },
    );
    controller
        .register_field_validator(fields.email(), required)
        .expect("register validator");
    controller
        .set(fields.email(), "valid@example.com".into())
        .expect("set email");

    let submitted = Arc::new(Mutex::new(None));
    let outcome = {
        let submitted = submitted.clone();
        block_on(controller.submit_async(move |model| async move {
            *submitted.lock().expect("submitted lock") = Some(model.email);
            Ok(())
        }))
        .expect("submit")
    };

    assert_eq!(outcome, SubmitOutcome::Succeeded);
    assert_eq!(
        submitted.lock().expect("submitted lock").as_deref(),
        Some("valid@example.com")
    );
    let snapshot = controller.snapshot().expect("snapshot");
    assert_eq!(snapshot.submit_state, SubmitState::Succeeded);
    assert_eq!(snapshot.model, ProfileForm::default());
    assert_eq!(snapshot.success_message.as_deref(), Some("done"));
    assert!(!snapshot.is_dirty);

    controller
        .set(fields.password(), "p".into())
        .expect("edit after success");
    let snapshot = controller.snapshot().expect("snapshot");
    assert_eq!(snapshot.submit_state, SubmitState::Idle);
    assert_eq!(snapshot.success_message, None);
}

#[test]
fn failed_submit_returns_to_idle_and_can_retry() {
    let controller =
        FormController::<ProfileForm, TestError>::new(base_form(), FormOptions::default());

    let outcome = block_on(
        controller.submit_async(|_model| async { Err(SubmissionError::new("service down")) }),
    )
    .expect("submit");
    assert_eq!(
        outcome,
        SubmitOutcome::Failed(SubmissionError::new("service down"))
    );
    let snapshot = controller.snapshot().expect("snapshot");
    assert_eq!(snapshot.submit_state, SubmitState::Idle);
    assert!(snapshot.can_submit());
    assert_eq!(
        snapshot.submission_error.as_ref().map(SubmissionError::message),
        Some("service down")
    );
    assert_eq!(snapshot.model, base_form());

    let retry = block_on(controller.submit_async(|_model| async { Ok(()) })).expect("retry");
    assert_eq!(retry, SubmitOutcome::Succeeded);
    assert_eq!(controller.snapshot().expect("snapshot").submission_error, None);
}

#[test]
fn second_submit_while_pending_is_refused() {
    let controller =
        FormController::<ProfileForm, TestError>::new(base_form(), FormOptions::default());
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let pending = {
        let controller = controller.clone();
        thread::spawn(move || {
            block_on(controller.submit_async(move |_model| async move {
                started_tx.send(()).expect("signal submit start");
                release_rx
                    .await
                    .map_err(|_| SubmissionError::new("release dropped"))
            }))
            .expect("first submit")
        })
    };

    started_rx.recv().expect("submit started");
    let snapshot = controller.snapshot().expect("snapshot");
    assert!(snapshot.is_submitting());
    assert!(!snapshot.can_submit());

    let second = block_on(controller.submit_async(|_model| async { Ok(()) }));
    assert_eq!(second, Err(FormError::AlreadySubmitting));

    release_tx.send(()).expect("release submit");
    assert_eq!(pending.join().expect("submit thread joins"), SubmitOutcome::Succeeded);
    assert_eq!(
        controller.submit_state().expect("state"),
        SubmitState::Succeeded
    );
}

#[test]
fn edit_during_validation_is_not_submitted() {
    let fields = ProfileForm::fields();
    let controller = FormController::<ProfileForm, TestError>::new(
        ProfileForm::default(),
        FormOptions::default(),
    );
    controller
        .set(fields.email(), "valid@example.com".into())
        .expect("set email");
    {
        let editor = controller.clone();
        let edited = Arc::new(AtomicUsize::new(0));
        controller
            .register_field_validator(fields.email(), move |model: &ProfileForm, value: &String| {
                if edited.fetch_add(1, Ordering::SeqCst) == 0 {
                    editor
                        .set(fields.email(), String::new())
                        .expect("edit while validating");
                }
                required(model, value)
            })
            .expect("register validator");
    }

    let submitted = Arc::new(Mutex::new(None));
    let outcome = {
        let submitted = submitted.clone();
        block_on(controller.submit_async(move |model| async move {
            *submitted.lock().expect("submitted lock") = Some(model.email);
            Ok(())
        }))
        .expect("submit")
    };

    assert_eq!(outcome, SubmitOutcome::Succeeded);
    assert_eq!(
        submitted.lock().expect("submitted lock").as_deref(),
        Some("valid@example.com")
    );
    assert_eq!(controller.snapshot().expect("snapshot").model.email, "");
}

#[test]
fn panicking_observer_does_not_leave_submit_pending() {
    let controller =
        FormController::<ProfileForm, TestError>::new(base_form(), FormOptions::default());
    let panicked = Arc::new(AtomicUsize::new(0));
    {
        let panicked = panicked.clone();
        controller
            .subscribe(move |snapshot| {
                if snapshot.submit_state == SubmitState::Submitting
                    && panicked.fetch_add(1, Ordering::SeqCst) == 0
                {
                    panic!("observer failed");
                }
            })
            .expect("subscribe");
    }

    let interrupted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        block_on(controller.submit_async(|_model| async { Ok(()) }))
    }));
    assert!(interrupted.is_err());
    assert_eq!(panicked.load(Ordering::SeqCst), 1);
    assert_eq!(controller.submit_state().expect("state"), SubmitState::Idle);

    let retry = block_on(controller.submit_async(|_model| async { Ok(()) })).expect("retry");
    assert_eq!(retry, SubmitOutcome::Succeeded);
}

#[test]
fn dropped_submit_returns_to_idle() {
    let controller =
        FormController::<ProfileForm, TestError>::new(base_form(), FormOptions::default());
    let (release_tx, release_rx) = oneshot::channel::<()>();
    {
        let mut pending = Box::pin(controller.submit_async(move |_model| async move {
            release_rx
                .await
                .map_err(|_| SubmissionError::new("release dropped"))
        }));
        let waker = futures::task::noop_waker();
        let mut cx = std::task::Context::from_waker(&waker);
        assert!(pending.as_mut().poll(&mut cx).is_pending());
        assert_eq!(
            controller.submit_state().expect("state"),
            SubmitState::Submitting
        );
    }
    drop(release_tx);

    assert_eq!(controller.submit_state().expect("state"), SubmitState::Idle);
    let retry = block_on(controller.submit_async(|_model| async { Ok(()) })).expect("retry");
    assert_eq!(retry, SubmitOutcome::Succeeded);
}

#[test]
fn observers_see_each_mutation_until_unsubscribed() {
    let fields = ProfileForm::fields();
    let controller =
        FormController::<ProfileForm, TestError>::new(base_form(), FormOptions::default());
    let seen = Arc::new(Mutex::new(Vec::<(String, SubmitState)>::new()));

    let id = {
        let seen = seen.clone();
        controller
            .subscribe(move |snapshot| {
                seen.lock()
                    .expect("seen lock")
                    .push((snapshot.model.email.clone(), snapshot.submit_state));
            })
            .expect("subscribe")
    };

    controller
        .set(fields.email(), "a@example.com".into())
        .expect("set email");
    block_on(controller.submit_async(|_model| async { Ok(()) })).expect("submit");

    assert_eq!(
        *seen.lock().expect("seen lock"),
        vec![
            ("a@example.com".to_string(), SubmitState::Idle),
            ("a@example.com".to_string(), SubmitState::Submitting),
            ("a@example.com".to_string(), SubmitState::Succeeded),
        ]
    );

    assert!(controller.unsubscribe(id).expect("unsubscribe"));
    assert!(!controller.unsubscribe(id).expect("unsubscribe twice"));
    controller
        .set(fields.email(), "b@example.com".into())
        .expect("set email");
    assert_eq!(seen.lock().expect("seen lock").len(), 3);
}

#[test]
fn observer_can_read_controller_during_notification() {
    let fields = ProfileForm::fields();
    let controller =
        FormController::<ProfileForm, TestError>::new(base_form(), FormOptions::default());
    let observed = Arc::new(AtomicUsize::new(0));
    {
        let reader = controller.clone();
        let observed = observed.clone();
        controller
            .subscribe(move |_snapshot| {
                if reader.snapshot().is_ok() {
                    observed.fetch_add(1, Ordering::SeqCst);
                }
            })
            .expect("subscribe");
    }

    controller
        .set(fields.password(), "changed".into())
        .expect("set password");
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[test]
fn reset_field_and_clear_errors_are_consistent() {
    let fields = ProfileForm::fields();
    let controller = FormController::<ProfileForm, TestError>::new(
        base_form(),
        FormOptions {
            validate_mode: ValidationMode::OnChange,
            ..FormOptions::default()
        },
    );
    controller
        .register_field_validator(fields.email(), required)
        .expect("register validator");
    controller
        .set(fields.email(), "".into())
        .expect("set invalid value");
    controller
        .clear_field_errors(fields.email())
        .expect("clear field errors");
    assert!(
        controller
            .field_meta(fields.email())
            .expect("meta")
            .expect("meta exists")
            .errors
            .is_empty()
    );

    controller
        .set(fields.email(), "dirty@example.com".into())
        .expect("set dirty value");
    controller.reset_field(fields.email()).expect("reset field");
    let snapshot = controller.snapshot().expect("snapshot");
    assert_eq!(snapshot.model.email, "user@example.com");
    assert!(
        snapshot
            .field_meta
            .get(&fields.email().key())
            .is_some_and(|meta| !meta.dirty)
    );

    controller.set(fields.email(), "".into()).expect("set invalid");
    controller.clear_errors().expect("clear all errors");
    assert!(controller.snapshot().expect("snapshot").is_valid);

    controller.reset_to_initial().expect("reset form");
    assert_eq!(controller.snapshot().expect("snapshot").model, base_form());
}

#[test]
fn required_and_description_registry_roundtrip() {
    let fields = ProfileForm::fields();
    let controller =
        FormController::<ProfileForm, TestError>::new(base_form(), FormOptions::default());

    controller
        .register_required_field(fields.email())
        .expect("register required");
    controller
        .register_field_description(fields.email(), "Enter a valid email")
        .expect("register description");

    assert!(controller.is_required(fields.email()).expect("is required"));
    assert_eq!(
        controller
            .field_description(fields.email())
            .expect("field description"),
        Some("Enter a valid email".to_string())
    );

    controller
        .unregister_required_field(fields.email())
        .expect("unregister required");
    controller
        .clear_field_description(fields.email())
        .expect("clear description");
    assert!(!controller.is_required(fields.email()).expect("is required"));
    assert_eq!(
        controller
            .field_description(fields.email())
            .expect("field description"),
        None
    );
}

#[test]
fn invalid_transition_is_reported() {
    let controller =
        FormController::<ProfileForm, TestError>::new(base_form(), FormOptions::default());
    let mut state = controller.state.write().expect("state lock");
    let error = super::controller::transition_submit_state(&mut state, SubmitState::Submitting)
        .expect_err("idle cannot jump to submitting");
    assert_eq!(
        error,
        FormError::InvalidStateTransition {
            from: SubmitState::Idle,
            to: SubmitState::Submitting,
        }
    );
}

#[test]
fn single_field_update_invokes_single_validator_path() {
    let keys = (0..200)
        .map(|index| Box::leak(format!("field-{index}").into_boxed_str()) as &'static str)
        .collect::<Vec<_>>();

    let model = PerfForm {
        values: keys.iter().map(|key| (*key, String::new())).collect(),
    };

    let invoke_count = Arc::new(AtomicUsize::new(0));
    let controller = FormController::<PerfForm, TestError>::new(
        model,
        FormOptions {
            validate_mode: ValidationMode::OnChange,
            ..FormOptions::default()
        },
    );

    for key in &keys {
        let counter = invoke_count.clone();
        controller
            .register_field_validator(
                MapLens { key: *key },
                move |_model: &PerfForm, _value: &String| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .expect("register validator");
    }

    let target = keys[137];
    controller
        .set(MapLens { key: target }, "changed".into())
        .expect("update single field");

    let snapshot = controller.snapshot().expect("snapshot");
    assert_eq!(invoke_count.load(Ordering::SeqCst), 1);
    assert_eq!(snapshot.field_meta.len(), 1);
    assert!(snapshot.is_valid);
}

#[test]
fn derive_macro_generates_field_lenses() {
    let fields = ProfileForm::fields();
    assert_eq!(fields.email().key().as_str(), "email");
    assert_eq!(fields.confirm_password().key().as_str(), "confirmPassword");
    assert_eq!(
        ProfileFormFields::KEYS,
        &["email", "password", "confirmPassword"]
    );
}
