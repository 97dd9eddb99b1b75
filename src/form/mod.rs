mod controller;
mod validation;

#[cfg(test)]
mod tests;

pub use controller::{
    ErrorClearing, ErrorMap, FieldKey, FieldMeta, FormController, FormError, FormId, FormOptions,
    FormResult, FormSnapshot, SubmissionError, SubmitOutcome, SubmitState, SubscriptionId,
    ValidationMode,
};
pub use signup_form_derive::FormModel;
pub use validation::{FieldLens, FieldValidator, FormModel, FormValidator, ValidationError};
