//! Authentication boundary and an in-process implementation.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use hashbrown::HashMap;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::broadcast;

/// Shortest password accepted by [`LocalAuth::sign_up`].
pub const MIN_PASSWORD_LEN: usize = 6;

/// Authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Unknown email or wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,
    /// Sign-up with an email that already has an account.
    #[error("email already registered")]
    EmailTaken,
    /// Email without a local part or domain.
    #[error("malformed email address")]
    InvalidEmail,
    /// Password shorter than [`MIN_PASSWORD_LEN`].
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,
    /// Account state could not be reached.
    #[error("auth state unavailable: {0}")]
    Unavailable(String),
}

/// Signed-in account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Stable account id.
    pub id: String,
    /// Normalized email.
    pub email: String,
    /// Name shown in the editor.
    pub display_name: String,
}

/// Session change broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A user signed in or signed up.
    SignedIn(User),
    /// The session ended.
    SignedOut,
}

/// Authentication service the editor signs in through.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Signs in with an existing account.
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError>;

    /// Registers and signs in a new account.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<User, AuthError>;

    /// Ends the current session, if any.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// User of the current session.
    async fn current_user(&self) -> Option<User>;

    /// Receives every later session change.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

struct Account {
    user: User,
    password_hash: String,
}

#[derive(Default)]
struct AuthState {
    accounts: HashMap<String, Account>,
    session: Option<User>,
    next_id: u64,
}

/// Accounts held in memory with salted SHA-256 password digests.
pub struct LocalAuth {
    state: Mutex<AuthState>,
    events_tx: broadcast::Sender<AuthEvent>,
}

impl LocalAuth {
    /// Empty account table. `event_capacity` bounds the event backlog.
    pub fn new(event_capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: Mutex::new(AuthState::default()),
            events_tx,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, AuthState>, AuthError> {
        self.state
            .lock()
            .map_err(|_| AuthError::Unavailable("auth lock poisoned".to_string()))
    }

    fn sign_in_as(&self, state: &mut AuthState, user: User) -> User {
        state.session = Some(user.clone());
        tracing::info!(user_id = %user.id, "signed in");
        let _ = self.events_tx.send(AuthEvent::SignedIn(user.clone()));
        user
    }
}

impl Default for LocalAuth {
    fn default() -> Self {
        Self::new(16)
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AuthError::InvalidEmail),
    }
}

fn hash_password(email: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl AuthClient for LocalAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        let mut state = self.lock()?;
        let user = match state.accounts.get(&email) {
            Some(account) if account.password_hash == hash_password(&email, password) => {
                account.user.clone()
            }
            _ => {
                tracing::debug!("rejected sign-in");
                return Err(AuthError::InvalidCredentials);
            }
        };
        Ok(self.sign_in_as(&mut state, user))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<User, AuthError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        let mut state = self.lock()?;
        if state.accounts.contains_key(&email) {
            return Err(AuthError::EmailTaken);
        }

        state.next_id += 1;
        let display_name = match display_name.trim() {
            "" => email.split('@').next().unwrap_or_default().to_string(),
            name => name.to_string(),
        };
        let user = User {
            id: format!("user-{}", state.next_id),
            email: email.clone(),
            display_name,
        };
        state.accounts.insert(
            email.clone(),
            Account {
                user: user.clone(),
                password_hash: hash_password(&email, password),
            },
        );
        Ok(self.sign_in_as(&mut state, user))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let mut state = self.lock()?;
        if let Some(user) = state.session.take() {
            tracing::info!(user_id = %user.id, "signed out");
            let _ = self.events_tx.send(AuthEvent::SignedOut);
        }
        Ok(())
    }

    async fn current_user(&self) -> Option<User> {
        self.lock().ok().and_then(|s| s.session.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events_tx.subscribe()
    }
}
