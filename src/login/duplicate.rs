//! Duplicate-login confirmation state.
//!
//! When the backend reports that the account is already signed in elsewhere,
//! the submitted credentials are parked here (memory only) until the user
//! either confirms, which re-submits them with `confirmTerminate`, or cancels.

use std::sync::{Mutex, PoisonError};

use crate::error::Error;
use crate::types::Credentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingConfirmation,
    /// The forced re-submission is in flight.
    ReAuthenticating,
}

#[derive(Debug)]
struct Pending {
    phase: Phase,
    credentials: Option<Credentials>,
    message: Option<String>,
    redirect: Option<String>,
}

impl Pending {
    const IDLE: Self = Self {
        phase: Phase::Idle,
        credentials: None,
        message: None,
        redirect: None,
    };
}

#[derive(Debug)]
pub struct DuplicateLogin {
    state: Mutex<Pending>,
}

impl Default for DuplicateLogin {
    fn default() -> Self {
        Self {
            state: Mutex::new(Pending::IDLE),
        }
    }
}

impl DuplicateLogin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// True while a confirmation is awaited or being processed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.phase() != Phase::Idle
    }

    /// Notice shown to the user, as sent by the backend.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        self.lock().message.clone()
    }

    pub(crate) fn open(
        &self,
        credentials: Credentials,
        message: Option<String>,
        redirect: Option<String>,
    ) {
        let mut state = self.lock();
        *state = Pending {
            phase: Phase::AwaitingConfirmation,
            credentials: Some(credentials),
            message,
            redirect,
        };
    }

    /// Move to [`Phase::ReAuthenticating`] and hand out the parked credentials.
    ///
    /// A retry while already re-authenticating is allowed; the caller's
    /// sequencer drops the earlier attempt.
    pub(crate) fn begin_confirm(&self) -> Result<(Credentials, Option<String>), Error> {
        let mut state = self.lock();
        match (state.phase, &state.credentials) {
            (Phase::AwaitingConfirmation | Phase::ReAuthenticating, Some(credentials)) => {
                let credentials = credentials.clone();
                state.phase = Phase::ReAuthenticating;
                Ok((credentials, state.redirect.clone()))
            }
            _ => Err(Error::InvalidState("no duplicate-login confirmation pending")),
        }
    }

    /// Return to [`Phase::AwaitingConfirmation`] after a retryable failure.
    pub(crate) fn reopen(&self) {
        let mut state = self.lock();
        if state.phase == Phase::ReAuthenticating {
            state.phase = Phase::AwaitingConfirmation;
        }
    }

    /// Drop the parked credentials. Returns whether anything was pending.
    pub(crate) fn reset(&self) -> bool {
        let mut state = self.lock();
        let was_open = state.phase != Phase::Idle;
        *state = Pending::IDLE;
        was_open
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
