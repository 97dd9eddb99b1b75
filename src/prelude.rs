pub use crate::config::{ConfigError, SignupConfig, Strictness};
pub use crate::form::{
    ErrorClearing, ErrorMap, FieldKey, FieldLens, FormController, FormError, FormModel,
    FormOptions, FormResult, FormSnapshot, SubmissionError, SubmitOutcome, SubmitState,
    SubscriptionId, ValidationError, ValidationMode,
};
pub use crate::signup::{
    AccountService, BoxedSubmitFuture, SignupErrors, SignupField, SignupFieldError, SignupForm,
    SignupRequest, SignupRules, SignupSnapshot, SignupValidator, SimulatedAccountService,
    SubmissionStatus, SubmitResult, error_messages,
};
