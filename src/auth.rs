//! Authentication Module
//!
//! Provides the `AuthProvider` capability consumed by claims, plus `MemoryAuth`,
//! an in-memory email/password account service.
//!
//! This module provides:
//! - Email and password validation
//! - Account registration, sign-in and sign-out
//! - Password reset requests
//!
//! Operations that act on behalf of a user take the user id explicitly;
//! `AuthProvider` only answers "who is signed in right now".

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

/// The signed-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Source of the current user
pub trait AuthProvider: Send + Sync {
    /// The signed-in user, `None` when signed out
    fn current_user(&self) -> Option<AuthUser>;
}

/// Authentication error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Malformed email address
    InvalidEmail(String),
    /// Password shorter than the minimum length
    WeakPassword,
    /// Registration with an email that already has an account
    EmailAlreadyInUse(String),
    /// Unknown email or wrong password
    InvalidCredential,
    /// No account for this email
    UserNotFound(String),
    /// Other authentication errors
    Internal(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidEmail(email) => write!(f, "Invalid email address: {email}"),
            AuthError::WeakPassword => write!(
                f,
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            ),
            AuthError::EmailAlreadyInUse(email) => {
                write!(f, "Email address already in use: {email}")
            }
            AuthError::InvalidCredential => write!(f, "Invalid email or password"),
            AuthError::UserNotFound(email) => write!(f, "No account found for {email}"),
            AuthError::Internal(s) => write!(f, "Authentication error: {s}"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Validates an email address format
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if !EMAIL_RE.is_match(email) {
        return Err(AuthError::InvalidEmail(email.to_string()));
    }
    Ok(())
}

/// Validates password strength
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

struct Account {
    uid: String,
    email: String,
    salt: String,
    password_digest: String,
}

impl Account {
    fn user(&self) -> AuthUser {
        AuthUser {
            id: self.uid.clone(),
            email: self.email.clone(),
            display_name: None,
        }
    }
}

/// In-memory email/password accounts with a single signed-in session
#[derive(Default)]
pub struct MemoryAuth {
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<AuthUser>>,
    reset_requests: Mutex<Vec<String>>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account and sign it in
    pub fn register(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = normalize(email);
        validate_email(&email)?;
        validate_password(password)?;

        let mut accounts = self
            .accounts
            .lock()
            .map_err(|_| AuthError::Internal("account table lock poisoned".to_string()))?;
        if accounts.contains_key(&email) {
            return Err(AuthError::EmailAlreadyInUse(email));
        }

        let salt = Uuid::new_v4().simple().to_string();
        let account = Account {
            uid: Uuid::new_v4().simple().to_string(),
            email: email.clone(),
            password_digest: digest(&salt, password),
            salt,
        };
        let user = account.user();
        accounts.insert(email, account);
        drop(accounts);

        log::info!("registered user {}", user.id);
        self.set_current(Some(user.clone()))?;
        Ok(user)
    }

    /// Sign in with email and password
    pub fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = normalize(email);
        validate_email(&email)?;

        let user = {
            let accounts = self
                .accounts
                .lock()
                .map_err(|_| AuthError::Internal("account table lock poisoned".to_string()))?;
            match accounts.get(&email) {
                Some(account) if account.password_digest == digest(&account.salt, password) => {
                    account.user()
                }
                _ => {
                    log::debug!("rejected sign-in for {email}");
                    return Err(AuthError::InvalidCredential);
                }
            }
        };

        log::info!("user {} signed in", user.id);
        self.set_current(Some(user.clone()))?;
        Ok(user)
    }

    pub fn sign_out(&self) -> Result<(), AuthError> {
        self.set_current(None)
    }

    /// Record a password reset request for an existing account
    pub fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize(email);
        validate_email(&email)?;

        let known = self
            .accounts
            .lock()
            .map_err(|_| AuthError::Internal("account table lock poisoned".to_string()))?
            .contains_key(&email);
        if !known {
            return Err(AuthError::UserNotFound(email));
        }

        self.reset_requests
            .lock()
            .map_err(|_| AuthError::Internal("reset outbox lock poisoned".to_string()))?
            .push(email);
        Ok(())
    }

    /// Emails with pending password reset requests, oldest first
    pub fn password_reset_requests(&self) -> Vec<String> {
        self.reset_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn set_current(&self, user: Option<AuthUser>) -> Result<(), AuthError> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| AuthError::Internal("session lock poisoned".to_string()))?;
        *current = user;
        Ok(())
    }
}

impl AuthProvider for MemoryAuth {
    fn current_user(&self) -> Option<AuthUser> {
        self.current.lock().ok().and_then(|c| c.clone())
    }
}
