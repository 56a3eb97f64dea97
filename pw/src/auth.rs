//! Signed-in identity
//!
//! A [`UserContext`] is built once at sign-in and handed to the session
//! runtime. There is no ambient "current user"; shutting the runtime down is
//! sign-out.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::UserConfig;

/// Identity failures; surfaced as-is and never retried
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Invalid user: {0}")]
    Validation(String),
}

/// Identity handed to the session at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserContext {
    /// Build a context, rejecting blank ids and malformed emails
    pub fn new(user_id: impl Into<String>, name: Option<String>, email: Option<String>) -> Result<Self, AuthError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(AuthError::Validation("user id must not be empty".to_string()));
        }
        if let Some(bad) = email.as_deref().filter(|e| !is_plausible_email(e)) {
            return Err(AuthError::Validation(format!("malformed email: {}", bad)));
        }
        Ok(Self { user_id, name, email })
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.user_id)
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

/// Source of the signed-in identity
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Result<UserContext, AuthError>;
}

/// Resolves the identity from the `user` config section
#[derive(Debug, Clone, Default)]
pub struct ConfigAuthProvider {
    user: UserConfig,
    override_id: Option<String>,
}

impl ConfigAuthProvider {
    pub fn new(user: UserConfig) -> Self {
        Self { user, override_id: None }
    }

    /// Use this id instead of `user.id` (the `--user` flag)
    pub fn with_override(mut self, user_id: Option<String>) -> Self {
        self.override_id = user_id;
        self
    }
}

impl AuthProvider for ConfigAuthProvider {
    fn current_user(&self) -> Result<UserContext, AuthError> {
        let id = self.override_id.clone().or_else(|| self.user.id.clone());
        debug!(?id, "current_user: called");
        let id = id.ok_or(AuthError::NotSignedIn)?;
        UserContext::new(id, self.user.name.clone(), self.user.email.clone())
    }
}
