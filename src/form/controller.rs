use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::validation::{FieldLens, ValidationError};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(&'static str);

impl FieldKey {
    pub const fn new(value: &'static str) -> Self {
        Self(value)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriptionId(u64);

/// Lifecycle of a submit attempt.
///
/// `Validating` only exists while the rules run inside a submit call; a
/// rejected or failed attempt lands back on `Idle`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitState {
    Idle,
    Validating,
    Submitting,
    Succeeded,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationMode {
    OnChange,
    OnBlur,
    OnSubmit,
}

/// Which errors an edit wipes before the next validation pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClearing {
    None,
    Field,
    All,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FormOptions {
    pub validate_mode: ValidationMode,
    pub error_clearing: ErrorClearing,
    pub validate_first_error_only: bool,
    pub reset_on_success: bool,
    pub success_message: Option<String>,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validate_mode: ValidationMode::OnSubmit,
            error_clearing: ErrorClearing::Field,
            validate_first_error_only: true,
            reset_on_success: false,
            success_message: None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldMeta<E> {
    pub dirty: bool,
    pub touched: bool,
    pub errors: Vec<E>,
}

impl<E> Default for FieldMeta<E> {
    fn default() -> Self {
        Self {
            dirty: false,
            touched: false,
            errors: Vec::new(),
        }
    }
}

/// Field key to the first error reported for that field.
pub type ErrorMap<E> = BTreeMap<FieldKey, E>;

#[derive(Clone, Debug)]
pub struct FormSnapshot<T, E> {
    pub id: FormId,
    pub model: T,
    pub submit_state: SubmitState,
    pub submit_count: u32,
    pub is_dirty: bool,
    pub is_valid: bool,
    pub field_meta: BTreeMap<FieldKey, FieldMeta<E>>,
    pub success_message: Option<String>,
    pub submission_error: Option<SubmissionError>,
}

impl<T, E: Clone> FormSnapshot<T, E> {
    pub fn errors(&self) -> ErrorMap<E> {
        collect_errors(&self.field_meta)
    }

    pub fn is_submitting(&self) -> bool {
        self.submit_state == SubmitState::Submitting
    }

    pub fn can_submit(&self) -> bool {
        !matches!(
            self.submit_state,
            SubmitState::Validating | SubmitState::Submitting
        )
    }
}

/// Non-field failure reported by whatever the form submits to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubmissionError {
    message: String,
}

impl SubmissionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for SubmissionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SubmissionError {}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubmitOutcome<E> {
    Rejected(ErrorMap<E>),
    Failed(SubmissionError),
    Succeeded,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FormError {
    StatePoisoned(&'static str),
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    AlreadySubmitting,
    UnknownField(String),
}

impl Display for FormError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::StatePoisoned(context) => {
                write!(f, "form state lock poisoned while {context}")
            }
            FormError::InvalidStateTransition { from, to } => {
                write!(f, "invalid submit state transition: {from:?} -> {to:?}")
            }
            FormError::AlreadySubmitting => f.write_str("form submit is already in progress"),
            FormError::UnknownField(name) => write!(f, "unknown form field `{name}`"),
        }
    }
}

impl std::error::Error for FormError {}

pub type FormResult<T> = Result<T, FormError>;

pub(super) type SyncFieldValidatorFn<T, E> = Arc<dyn Fn(&T) -> Result<(), E> + Send + Sync>;
pub(super) type SyncFormValidatorFn<T, E> = Arc<dyn Fn(&T) -> Vec<(FieldKey, E)> + Send + Sync>;
pub(super) type ObserverFn<T, E> = Arc<dyn Fn(&FormSnapshot<T, E>) + Send + Sync>;

pub(super) struct FormState<T, E> {
    pub(super) id: FormId,
    pub(super) initial_model: T,
    pub(super) model: T,
    pub(super) submit_state: SubmitState,
    pub(super) submit_count: u32,
    pub(super) dirty_fields: BTreeSet<FieldKey>,
    pub(super) field_meta: BTreeMap<FieldKey, FieldMeta<E>>,
    pub(super) success_message: Option<String>,
    pub(super) submission_error: Option<SubmissionError>,
}

impl<T, E> FormState<T, E> {
    pub(super) fn ensure_meta(&mut self, key: FieldKey) -> &mut FieldMeta<E> {
        self.field_meta.entry(key).or_default()
    }

    pub(super) fn clear_feedback(&mut self) {
        self.success_message = None;
        self.submission_error = None;
        if self.submit_state == SubmitState::Succeeded {
            self.submit_state = SubmitState::Idle;
        }
    }
}

#[derive(Clone)]
pub struct FormController<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    pub(super) options: FormOptions,
    pub(super) state: Arc<RwLock<FormState<T, E>>>,
    pub(super) sync_field_validators:
        Arc<RwLock<BTreeMap<FieldKey, Vec<SyncFieldValidatorFn<T, E>>>>>,
    pub(super) form_validators: Arc<RwLock<Vec<SyncFormValidatorFn<T, E>>>>,
    pub(super) required_fields: Arc<RwLock<BTreeSet<FieldKey>>>,
    pub(super) field_descriptions: Arc<RwLock<BTreeMap<FieldKey, String>>>,
    pub(super) observers: Arc<RwLock<BTreeMap<SubscriptionId, ObserverFn<T, E>>>>,
    pub(super) next_subscription: Arc<AtomicU64>,
}

impl<T, E> FormController<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: ValidationError,
{
    pub fn new(initial: T, options: FormOptions) -> Self {
        Self {
            options,
            state: Arc::new(RwLock::new(FormState {
                id: FormId::next(),
                initial_model: initial.clone(),
                model: initial,
                submit_state: SubmitState::Idle,
                submit_count: 0,
                dirty_fields: BTreeSet::new(),
                field_meta: BTreeMap::new(),
                success_message: None,
                submission_error: None,
            })),
            sync_field_validators: Arc::new(RwLock::new(BTreeMap::new())),
            form_validators: Arc::new(RwLock::new(Vec::new())),
            required_fields: Arc::new(RwLock::new(BTreeSet::new())),
            field_descriptions: Arc::new(RwLock::new(BTreeMap::new())),
            observers: Arc::new(RwLock::new(BTreeMap::new())),
            next_subscription: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    pub fn form_id(&self) -> FormResult<FormId> {
        Ok(read_lock(&self.state, "reading form id")?.id)
    }

    /// Registers a callback that receives a fresh snapshot after every
    /// mutating operation. Callbacks run after the state lock is released.
    pub fn subscribe(
        &self,
        observer: impl Fn(&FormSnapshot<T, E>) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        let mut observers = write_lock(&self.observers, "registering observer")?;
        observers.insert(id, Arc::new(observer));
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> FormResult<bool> {
        let mut observers = write_lock(&self.observers, "removing observer")?;
        Ok(observers.remove(&id).is_some())
    }

    pub fn register_required_field<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let mut required = write_lock(&self.required_fields, "registering required field")?;
        required.insert(lens.key());
        Ok(())
    }

    pub fn unregister_required_field<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let mut required = write_lock(&self.required_fields, "unregistering required field")?;
        required.remove(&lens.key());
        Ok(())
    }

    pub fn register_field_description<L>(
        &self,
        lens: L,
        description: impl Into<String>,
    ) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let mut descriptions =
            write_lock(&self.field_descriptions, "registering field description")?;
        descriptions.insert(lens.key(), description.into());
        Ok(())
    }

    pub fn clear_field_description<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let mut descriptions = write_lock(&self.field_descriptions, "clearing field description")?;
        descriptions.remove(&lens.key());
        Ok(())
    }

    /// Validates the model and, when it passes, hands a copy of it to `f`.
    ///
    /// A rejected model keeps its values and returns to `Idle` with the
    /// errors stored. A failed `f` also returns to `Idle` and records the
    /// submission error so the form can be submitted again.
    pub async fn submit_async<F, Fut>(&self, f: F) -> FormResult<SubmitOutcome<E>>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<(), SubmissionError>>,
    {
        let (form_id, model) = {
            let mut state = write_lock(&self.state, "preparing async submit")?;
            if matches!(
                state.submit_state,
                SubmitState::Validating | SubmitState::Submitting
            ) {
                return Err(FormError::AlreadySubmitting);
            }
            transition_submit_state(&mut state, SubmitState::Validating)?;
            state.submit_count = state.submit_count.saturating_add(1);
            state.success_message = None;
            state.submission_error = None;
            (state.id, state.model.clone())
        };
        let mut guard = SubmitGuard::new(&*self.state);

        // `model` is validated and submitted as one value; edits made while
        // validation runs stay in the form but are not sent.
        let field_errors = self.evaluate(&model)?;
        {
            let mut state = write_lock(&self.state, "moving async submit state to submitting")?;
            if !apply_field_errors(&mut state, field_errors) {
                let errors = collect_errors(&state.field_meta);
                transition_submit_state(&mut state, SubmitState::Idle)?;
                guard.disarm();
                drop(state);
                tracing::debug!(
                    form_id = form_id.0,
                    invalid_fields = errors.len(),
                    "submit rejected by validation"
                );
                self.notify()?;
                return Ok(SubmitOutcome::Rejected(errors));
            }
            transition_submit_state(&mut state, SubmitState::Submitting)?;
        }
        tracing::debug!(form_id = form_id.0, "submitting form");
        self.notify()?;

        let submit_result = f(model).await;

        let outcome = {
            let mut state = write_lock(&self.state, "completing async submit")?;
            let outcome = match submit_result {
                Ok(()) => {
                    transition_submit_state(&mut state, SubmitState::Succeeded)?;
                    if self.options.reset_on_success {
                        reset_state(&mut state);
                    }
                    state.success_message = self.options.success_message.clone();
                    tracing::info!(form_id = form_id.0, "form submitted");
                    SubmitOutcome::Succeeded
                }
                Err(error) => {
                    transition_submit_state(&mut state, SubmitState::Idle)?;
                    state.submission_error = Some(error.clone());
                    tracing::warn!(form_id = form_id.0, %error, "form submission failed");
                    SubmitOutcome::Failed(error)
                }
            };
            guard.disarm();
            outcome
        };
        self.notify()?;
        Ok(outcome)
    }

    pub fn reset_to_initial(&self) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "resetting form")?;
            reset_state(&mut state);
            state.submit_state = SubmitState::Idle;
            state.success_message = None;
            state.submission_error = None;
        }
        self.notify()
    }

    pub fn reset_field<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        {
            let mut state = write_lock(&self.state, "resetting field")?;
            let initial_value = lens.get(&state.initial_model).clone();
            lens.set(&mut state.model, initial_value);
            state.dirty_fields.remove(&key);
            let meta = state.ensure_meta(key);
            meta.dirty = false;
            meta.touched = false;
            meta.errors.clear();
        }
        self.notify()
    }

    pub fn clear_errors(&self) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "clearing all field errors")?;
            for meta in state.field_meta.values_mut() {
                meta.errors.clear();
            }
        }
        self.notify()
    }

    pub fn clear_field_errors<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        {
            let mut state = write_lock(&self.state, "clearing field errors")?;
            if let Some(meta) = state.field_meta.get_mut(&key) {
                meta.errors.clear();
            }
        }
        self.notify()
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot<T, E>> {
        let state = read_lock(&self.state, "creating form snapshot")?;
        let is_valid = state.field_meta.values().all(|meta| meta.errors.is_empty());
        Ok(FormSnapshot {
            id: state.id,
            model: state.model.clone(),
            submit_state: state.submit_state,
            submit_count: state.submit_count,
            is_dirty: !state.dirty_fields.is_empty(),
            is_valid,
            field_meta: state.field_meta.clone(),
            success_message: state.success_message.clone(),
            submission_error: state.submission_error.clone(),
        })
    }

    pub fn errors(&self) -> FormResult<ErrorMap<E>> {
        Ok(collect_errors(
            &read_lock(&self.state, "reading error map")?.field_meta,
        ))
    }

    pub fn submit_state(&self) -> FormResult<SubmitState> {
        Ok(read_lock(&self.state, "reading submit state")?.submit_state)
    }

    pub fn field_meta<L>(&self, lens: L) -> FormResult<Option<FieldMeta<E>>>
    where
        L: FieldLens<T>,
    {
        Ok(read_lock(&self.state, "reading field meta")?
            .field_meta
            .get(&lens.key())
            .cloned())
    }

    pub fn field_error_for_display<L>(&self, lens: L) -> FormResult<Option<String>>
    where
        L: FieldLens<T>,
    {
        let state = read_lock(&self.state, "reading display error message")?;
        Ok(state
            .field_meta
            .get(&lens.key())
            .and_then(|meta| meta.errors.first())
            .map(ValidationError::message))
    }

    pub fn field_description<L>(&self, lens: L) -> FormResult<Option<String>>
    where
        L: FieldLens<T>,
    {
        Ok(
            read_lock(&self.field_descriptions, "reading field description")?
                .get(&lens.key())
                .cloned(),
        )
    }

    pub fn is_required<L>(&self, lens: L) -> FormResult<bool>
    where
        L: FieldLens<T>,
    {
        Ok(read_lock(&self.required_fields, "reading required fields")?.contains(&lens.key()))
    }

    /// Pushes the current snapshot to every observer. Mutating operations
    /// call this themselves; owners of extra view state call it after
    /// changing that state.
    pub fn notify(&self) -> FormResult<()> {
        let observers = read_lock(&self.observers, "reading observers")?
            .values()
            .cloned()
            .collect::<Vec<_>>();
        if observers.is_empty() {
            return Ok(());
        }
        let snapshot = self.snapshot()?;
        for observer in observers {
            observer(&snapshot);
        }
        Ok(())
    }
}

/// Sends a submit that stops early, by error, panic or a dropped future,
/// back to `Idle`.
struct SubmitGuard<'a, T, E> {
    state: &'a RwLock<FormState<T, E>>,
    armed: bool,
}

impl<'a, T, E> SubmitGuard<'a, T, E> {
    fn new(state: &'a RwLock<FormState<T, E>>) -> Self {
        Self { state, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<T, E> Drop for SubmitGuard<'_, T, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(
            state.submit_state,
            SubmitState::Validating | SubmitState::Submitting
        ) {
            tracing::warn!(
                form_id = state.id.0,
                from = ?state.submit_state,
                "submit interrupted, returning form to idle"
            );
            state.submit_state = SubmitState::Idle;
        }
    }
}

/// Replaces every field's errors with `field_errors` and reports whether the
/// form is now free of errors.
pub(super) fn apply_field_errors<T, E>(
    state: &mut FormState<T, E>,
    mut field_errors: BTreeMap<FieldKey, Vec<E>>,
) -> bool {
    let mut keys = state
        .field_meta
        .keys()
        .copied()
        .collect::<BTreeSet<FieldKey>>();
    keys.extend(field_errors.keys().copied());
    for key in keys {
        state.ensure_meta(key).errors = field_errors.remove(&key).unwrap_or_default();
    }
    state.field_meta.values().all(|meta| meta.errors.is_empty())
}

fn reset_state<T: Clone, E>(state: &mut FormState<T, E>) {
    state.model = state.initial_model.clone();
    state.dirty_fields.clear();
    for meta in state.field_meta.values_mut() {
        meta.dirty = false;
        meta.touched = false;
        meta.errors.clear();
    }
}

pub(super) fn transition_submit_state<T, E>(
    state: &mut FormState<T, E>,
    next: SubmitState,
) -> FormResult<()> {
    let current = state.submit_state;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitState::Idle, SubmitState::Validating)
            | (SubmitState::Succeeded, SubmitState::Validating)
            | (SubmitState::Validating, SubmitState::Submitting)
            | (SubmitState::Submitting, SubmitState::Succeeded)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.submit_state = next;
    Ok(())
}

pub(super) fn collect_errors<E: Clone>(
    field_meta: &BTreeMap<FieldKey, FieldMeta<E>>,
) -> ErrorMap<E> {
    field_meta
        .iter()
        .filter_map(|(key, meta)| meta.errors.first().map(|error| (*key, error.clone())))
        .collect()
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
