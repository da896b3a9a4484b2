//! In-process backend implementing every repository trait.
//!
//! All records live behind one mutex, so the multi-record units
//! (`create_superseding`, `redeem`, `rotate_tokens`) are atomic for free.
//! The lock is never held across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{
    Identity, NewIdentity, NewPasswordResetToken, NewSession, NewUser, PasswordResetToken,
    Session, SessionTokens, User, UserUpdate,
};
use super::new_id;
use super::repository::{
    IdentityRepository, PasswordResetTokenRepository, Redemption, SessionRepository, StoreError,
    UserRepository,
};

#[derive(Default)]
struct State {
    users: HashMap<String, User>,
    identities: Vec<Identity>,
    /// Insertion order doubles as creation order
    sessions: Vec<Session>,
    reset_tokens: HashMap<String, PasswordResetToken>,
}

impl State {
    fn email_taken(&self, email: &str, except_id: Option<&str>) -> bool {
        self.users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email) && Some(u.id.as_str()) != except_id)
    }

    fn invalidate_unused(&mut self, user_id: &str, now: DateTime<Utc>) -> u64 {
        let mut count = 0;
        for token in self.reset_tokens.values_mut() {
            if token.user_id == user_id && !token.used {
                token.used = true;
                token.updated_at = now;
                count += 1;
            }
        }
        count
    }

    fn insert_token(
        &mut self,
        token: NewPasswordResetToken,
        now: DateTime<Utc>,
    ) -> Result<PasswordResetToken, StoreError> {
        if self.reset_tokens.contains_key(&token.jti) {
            return Err(StoreError::Duplicate);
        }
        let record = PasswordResetToken {
            id: new_id(),
            user_id: token.user_id,
            jti: token.jti,
            email: token.email,
            used: false,
            expires_at: token.expires_at,
            created_at: now,
            updated_at: now,
        };
        self.reset_tokens
            .insert(record.jti.clone(), record.clone());
        Ok(record)
    }

    fn session_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }
}

fn stamp(session: &mut Session, tokens: SessionTokens, now: DateTime<Utc>) {
    session.access_token = tokens.access_token;
    session.access_token_expires_at = Some(tokens.access_token_expires_at);
    session.refresh_token = tokens.refresh_token;
    session.refresh_token_expires_at = Some(tokens.refresh_token_expires_at);
    session.updated_at = now;
}

/// Cloning shares the underlying records.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn identity_count(&self) -> usize {
        self.lock().identities.len()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Every reset token of the user, oldest first.
    pub fn reset_tokens_for_user(&self, user_id: &str) -> Vec<PasswordResetToken> {
        let mut tokens: Vec<_> = self
            .lock()
            .reset_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tokens.sort_by_key(|t| t.created_at);
        tokens
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut state = self.lock();
        if state.email_taken(&user.email, None) {
            return Err(StoreError::Duplicate);
        }
        let now = Utc::now();
        let record = User {
            id: new_id(),
            email: user.email,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.get(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_user(&self, id: &str, update: UserUpdate) -> Result<User, StoreError> {
        let mut state = self.lock();
        if update
            .email
            .as_deref()
            .is_some_and(|email| state.email_taken(email, Some(id)))
        {
            return Err(StoreError::Duplicate);
        }
        let user = state.users.get_mut(id).ok_or(StoreError::NotFound)?;
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(hash) = update.password_hash {
            user.password_hash = hash;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[async_trait]
impl IdentityRepository for MemoryStore {
    async fn create_identity(&self, identity: NewIdentity) -> Result<Identity, StoreError> {
        let mut state = self.lock();
        let taken = state
            .identities
            .iter()
            .any(|i| i.provider == identity.provider && i.provider_id == identity.provider_id);
        if taken {
            return Err(StoreError::Duplicate);
        }
        let now = Utc::now();
        let record = Identity {
            id: new_id(),
            user_id: identity.user_id,
            provider: identity.provider,
            provider_id: identity.provider_id,
            email: identity.email,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        state.identities.push(record.clone());
        Ok(record)
    }

    async fn get_identities_by_user_id(&self, user_id: &str) -> Result<Vec<Identity>, StoreError> {
        Ok(self
            .lock()
            .identities
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_identity_by_provider(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .lock()
            .identities
            .iter()
            .find(|i| i.provider == provider && i.provider_id == provider_id)
            .cloned())
    }

    async fn update_last_login(&self, user_id: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        for identity in self
            .lock()
            .identities
            .iter_mut()
            .filter(|i| i.user_id == user_id)
        {
            identity.last_login_at = Some(now);
            identity.updated_at = now;
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError> {
        let now = Utc::now();
        let record = Session {
            id: new_id(),
            user_id: session.user_id,
            access_token: String::new(),
            access_token_expires_at: None,
            refresh_token: String::new(),
            refresh_token_expires_at: None,
            client: session.client,
            created_at: now,
            updated_at: now,
        };
        self.lock().sessions.push(record.clone());
        Ok(record)
    }

    async fn get_session_by_id(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.lock().sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn get_session_by_user_id(&self, user_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .rev()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn update_tokens(
        &self,
        session_id: &str,
        tokens: SessionTokens,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let session = state.session_mut(session_id).ok_or(StoreError::NotFound)?;
        stamp(session, tokens, Utc::now());
        Ok(())
    }

    async fn rotate_tokens(
        &self,
        session_id: &str,
        expected_refresh_token: &str,
        tokens: SessionTokens,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        match state.session_mut(session_id) {
            Some(session) if session.refresh_token == expected_refresh_token => {
                stamp(session, tokens, Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl PasswordResetTokenRepository for MemoryStore {
    async fn create_token(
        &self,
        token: NewPasswordResetToken,
    ) -> Result<PasswordResetToken, StoreError> {
        self.lock().insert_token(token, Utc::now())
    }

    async fn get_token_by_jti(&self, jti: &str) -> Result<Option<PasswordResetToken>, StoreError> {
        Ok(self.lock().reset_tokens.get(jti).cloned())
    }

    async fn mark_used(&self, jti: &str) -> Result<bool, StoreError> {
        let mut state = self.lock();
        match state.reset_tokens.get_mut(jti) {
            Some(token) if !token.used => {
                token.used = true;
                token.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn invalidate_all_unused_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        Ok(self.lock().invalidate_unused(user_id, Utc::now()))
    }

    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut state = self.lock();
        let before = state.reset_tokens.len();
        state.reset_tokens.retain(|_, t| !t.is_expired_at(now));
        Ok((before - state.reset_tokens.len()) as u64)
    }

    async fn create_superseding(
        &self,
        token: NewPasswordResetToken,
    ) -> Result<PasswordResetToken, StoreError> {
        let now = Utc::now();
        let mut state = self.lock();
        if state.reset_tokens.contains_key(&token.jti) {
            return Err(StoreError::Duplicate);
        }
        state.invalidate_unused(&token.user_id, now);
        state.insert_token(token, now)
    }

    async fn redeem(
        &self,
        jti: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Redemption, StoreError> {
        let mut state = self.lock();

        let (user_id, used, expired) = match state.reset_tokens.get(jti) {
            Some(token) => (token.user_id.clone(), token.used, token.is_expired_at(now)),
            None => return Err(StoreError::NotFound),
        };
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        if used {
            return Ok(Redemption::AlreadyUsed);
        }
        if expired {
            return Ok(Redemption::Expired);
        }

        if let Some(user) = state.users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = now;
        }
        if let Some(token) = state.reset_tokens.get_mut(jti) {
            token.used = true;
            token.updated_at = now;
        }
        Ok(Redemption::Redeemed)
    }
}
