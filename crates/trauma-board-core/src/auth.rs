//! Session gating for the board views.
//!
//! The identity service itself lives outside this crate; an [`AuthProvider`]
//! only has to report the current session and end it on request. Providers
//! whose sign-in happens elsewhere (a hosted login page, platform SSO) keep
//! the default [`AuthProvider::sign_in`], which refuses. [`MemoryAuth`] is the
//! stand-in used when no external provider is plugged in.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no active session")]
    Unauthenticated,

    #[error("identity provider error: {0}")]
    Provider(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
        }
    }
}

/// External identity service.
pub trait AuthProvider: Send {
    fn current_session(&self) -> AuthResult<Option<Session>>;

    fn sign_out(&self) -> AuthResult<()>;

    /// Start a session directly.
    fn sign_in(&self, user_id: &str) -> AuthResult<Session> {
        tracing::debug!(user_id, "direct sign-in refused");
        Err(AuthError::Provider(
            "sign-in is handled by the identity provider".into(),
        ))
    }
}

impl<A: AuthProvider + ?Sized> AuthProvider for Box<A> {
    fn current_session(&self) -> AuthResult<Option<Session>> {
        (**self).current_session()
    }

    fn sign_out(&self) -> AuthResult<()> {
        (**self).sign_out()
    }

    fn sign_in(&self, user_id: &str) -> AuthResult<Session> {
        (**self).sign_in(user_id)
    }
}

/// Provider holding its session in memory.
#[derive(Debug, Default)]
pub struct MemoryAuth {
    session: Mutex<Option<Session>>,
    fail_sign_out: Mutex<Option<String>>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next sign-out fail with `message`.
    pub fn fail_next_sign_out(&self, message: impl Into<String>) {
        *lock(&self.fail_sign_out) = Some(message.into());
    }
}

impl AuthProvider for MemoryAuth {
    fn current_session(&self) -> AuthResult<Option<Session>> {
        Ok(lock(&self.session).clone())
    }

    fn sign_out(&self) -> AuthResult<()> {
        if let Some(message) = lock(&self.fail_sign_out).take() {
            return Err(AuthError::Provider(message));
        }
        *lock(&self.session) = None;
        Ok(())
    }

    fn sign_in(&self, user_id: &str) -> AuthResult<Session> {
        let session = Session::new(user_id);
        *lock(&self.session) = Some(session.clone());
        Ok(session)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Guards view access behind an authenticated session.
pub struct SessionGate<A: AuthProvider> {
    provider: A,
}

impl<A: AuthProvider> SessionGate<A> {
    pub fn new(provider: A) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &A {
        &self.provider
    }

    /// The active session, or `Unauthenticated` when the caller must go
    /// to the login entry point.
    pub fn require_session(&self) -> AuthResult<Session> {
        match self.provider.current_session()? {
            Some(session) => Ok(session),
            None => {
                tracing::debug!("view requested without a session");
                Err(AuthError::Unauthenticated)
            }
        }
    }

    /// End the session. A provider failure is logged and returned, and
    /// the session stays active.
    pub fn sign_out(&self) -> AuthResult<()> {
        match self.provider.sign_out() {
            Ok(()) => {
                tracing::info!("signed out");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "sign-out failed");
                Err(e)
            }
        }
    }
}
