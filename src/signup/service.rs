use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_timer::Delay;

use super::SignupForm;
use crate::form::SubmissionError;

pub type BoxedSubmitFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), SubmissionError>> + Send + 'a>>;

#[derive(Clone, Eq, PartialEq)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

impl From<SignupForm> for SignupRequest {
    fn from(form: SignupForm) -> Self {
        Self {
            email: form.username,
            password: form.password,
        }
    }
}

impl Debug for SignupRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Whatever creates the account once the form passes validation.
///
/// Failures surface to the user as one form-level message and leave the form
/// ready for another attempt.
pub trait AccountService: Send + Sync + 'static {
    fn create_account<'a>(&'a self, request: &'a SignupRequest) -> BoxedSubmitFuture<'a>;
}

impl<F> AccountService for F
where
    F: for<'a> Fn(&'a SignupRequest) -> BoxedSubmitFuture<'a> + Send + Sync + 'static,
{
    fn create_account<'a>(&'a self, request: &'a SignupRequest) -> BoxedSubmitFuture<'a> {
        (self)(request)
    }
}

/// Stands in for a real backend: waits out a fixed delay and always succeeds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SimulatedAccountService {
    delay: Duration,
}

impl SimulatedAccountService {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl AccountService for SimulatedAccountService {
    fn create_account<'a>(&'a self, _request: &'a SignupRequest) -> BoxedSubmitFuture<'a> {
        Box::pin(async move {
            if !self.delay.is_zero() {
                Delay::new(self.delay).await;
            }
            Ok(())
        })
    }
}
