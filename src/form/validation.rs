use std::collections::BTreeMap;

use super::controller::{
    ErrorClearing, FieldKey, FormController, FormResult, SyncFieldValidatorFn,
    SyncFormValidatorFn, ValidationMode, apply_field_errors, read_lock, write_lock,
};

pub trait ValidationError: Clone + Send + Sync + 'static {
    fn message(&self) -> String;
}

pub trait FieldLens<T>: Copy + Send + Sync + 'static {
    type Value: Clone + PartialEq + Send + Sync + 'static;

    fn key(self) -> FieldKey;
    fn get<'a>(self, model: &'a T) -> &'a Self::Value;
    fn set(self, model: &mut T, value: Self::Value);
}

pub trait FormModel: Clone + Send + Sync + 'static {
    type Fields;

    fn fields() -> Self::Fields;
}

pub trait FieldValidator<T, L, E>: Send + Sync
where
    L: FieldLens<T>,
    E: ValidationError,
{
    fn validate(&self, model: &T, value: &L::Value) -> Result<(), E>;
}

impl<T, L, E, F> FieldValidator<T, L, E> for F
where
    L: FieldLens<T>,
    E: ValidationError,
    F: for<'a> Fn(&'a T, &'a L::Value) -> Result<(), E> + Send + Sync,
{
    fn validate(&self, model: &T, value: &L::Value) -> Result<(), E> {
        (self)(model, value)
    }
}

pub trait FormValidator<T, E>: Send + Sync
where
    E: ValidationError,
{
    fn validate(&self, model: &T) -> Vec<(FieldKey, E)>;
}

impl<T, E, F> FormValidator<T, E> for F
where
    E: ValidationError,
    F: Fn(&T) -> Vec<(FieldKey, E)> + Send + Sync,
{
    fn validate(&self, model: &T) -> Vec<(FieldKey, E)> {
        (self)(model)
    }
}

impl<T, E> FormController<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    pub fn register_field_validator<L, V>(&self, lens: L, validator: V) -> FormResult<()>
    where
        L: FieldLens<T>,
        V: FieldValidator<T, L, E> + 'static,
    {
        let key = lens.key();
        let validator = std::sync::Arc::new(validator);
        let wrapped: SyncFieldValidatorFn<T, E> =
            std::sync::Arc::new(move |model: &T| validator.validate(model, lens.get(model)));
        let mut validators =
            write_lock(&self.sync_field_validators, "registering field validator")?;
        validators.entry(key).or_default().push(wrapped);
        Ok(())
    }

    pub fn register_form_validator<V>(&self, validator: V) -> FormResult<()>
    where
        V: FormValidator<T, E> + 'static,
    {
        let validator = std::sync::Arc::new(validator);
        let wrapped: SyncFormValidatorFn<T, E> =
            std::sync::Arc::new(move |model: &T| validator.validate(model));
        let mut validators = write_lock(&self.form_validators, "registering form validator")?;
        validators.push(wrapped);
        Ok(())
    }

    /// Writes `value` into the field and applies the configured error
    /// clearing. Any success or submission message is dropped, and a
    /// succeeded form goes back to `Idle`.
    pub fn set<L>(&self, lens: L, value: L::Value) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        {
            let mut state = write_lock(&self.state, "writing form model")?;
            lens.set(&mut state.model, value);
            let is_dirty = lens.get(&state.model) != lens.get(&state.initial_model);
            if is_dirty {
                state.dirty_fields.insert(key);
            } else {
                state.dirty_fields.remove(&key);
            }
            state.ensure_meta(key).dirty = is_dirty;
            match self.options.error_clearing {
                ErrorClearing::None => {}
                ErrorClearing::Field => state.ensure_meta(key).errors.clear(),
                ErrorClearing::All => {
                    for meta in state.field_meta.values_mut() {
                        meta.errors.clear();
                    }
                }
            }
            state.clear_feedback();
        }

        if self.options.validate_mode == ValidationMode::OnChange {
            let _ = self.validate_field_by_key(key)?;
        }
        self.notify()
    }

    pub fn touch<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        {
            let mut state = write_lock(&self.state, "touching field")?;
            state.ensure_meta(key).touched = true;
        }

        if self.options.validate_mode == ValidationMode::OnBlur {
            let _ = self.validate_field_by_key(key)?;
        }
        self.notify()
    }

    pub fn validate_field<L>(&self, lens: L) -> FormResult<bool>
    where
        L: FieldLens<T>,
    {
        let is_valid = self.validate_field_by_key(lens.key())?;
        self.notify()?;
        Ok(is_valid)
    }

    /// Runs every registered validator against `model` without touching the
    /// controller state.
    pub fn evaluate(&self, model: &T) -> FormResult<BTreeMap<FieldKey, Vec<E>>> {
        let field_validators = read_lock(
            &self.sync_field_validators,
            "reading field validators for evaluation",
        )?
        .clone();
        let form_validators =
            read_lock(&self.form_validators, "reading form validators for evaluation")?.clone();

        let mut field_errors = BTreeMap::<FieldKey, Vec<E>>::new();
        for (key, validators) in field_validators {
            let errors = run_field_validators(
                &validators,
                model,
                self.options.validate_first_error_only,
            );
            field_errors.insert(key, errors);
        }

        for validator in form_validators {
            for (key, error) in validator(model) {
                let errors = field_errors.entry(key).or_default();
                if !(self.options.validate_first_error_only && !errors.is_empty()) {
                    errors.push(error);
                }
            }
        }

        Ok(field_errors)
    }

    pub fn validate_form(&self) -> FormResult<bool> {
        let is_valid = self.validate_form_quiet()?;
        self.notify()?;
        Ok(is_valid)
    }

    /// Replaces every field's errors with a fresh validation pass.
    fn validate_form_quiet(&self) -> FormResult<bool> {
        let model = {
            read_lock(&self.state, "reading model for form validation")?
                .model
                .clone()
        };
        let field_errors = self.evaluate(&model)?;

        let mut state = write_lock(&self.state, "applying form validation result")?;
        let is_valid = apply_field_errors(&mut state, field_errors);
        tracing::debug!(form_id = state.id.0, is_valid, "form validated");
        Ok(is_valid)
    }

    pub(super) fn validate_field_by_key(&self, key: FieldKey) -> FormResult<bool> {
        let model = {
            read_lock(&self.state, "reading model for field validation")?
                .model
                .clone()
        };
        let validators = {
            read_lock(
                &self.sync_field_validators,
                "reading field validators for key validation",
            )?
            .get(&key)
            .cloned()
            .unwrap_or_default()
        };

        let errors =
            run_field_validators(&validators, &model, self.options.validate_first_error_only);

        let mut state = write_lock(&self.state, "writing field validation result")?;
        let meta = state.ensure_meta(key);
        meta.errors = errors;
        Ok(meta.errors.is_empty())
    }
}

fn run_field_validators<T, E>(
    validators: &[SyncFieldValidatorFn<T, E>],
    model: &T,
    first_error_only: bool,
) -> Vec<E> {
    let mut errors = Vec::new();
    for validator in validators {
        if let Err(error) = validator(model) {
            errors.push(error);
            if first_error_only {
                break;
            }
        }
    }
    errors
}
