use crate::api_client::RecruiterApiClient;
use crate::errors::AppError;
use crate::models::{RegisterRequest, Session, TokenResponse, User};
use crate::session_store::{PersistedSession, SessionStore};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Holds who is logged in.
///
/// The in-memory session is the source of truth for this process; the
/// session store mirrors the token and recruiter id so the next process
/// can pick them up with [`AuthStore::restore`] or
/// [`AuthStore::check_session`].
pub struct AuthStore {
    client: RecruiterApiClient,
    storage: Arc<dyn SessionStore>,
    session: RwLock<Option<Session>>,
    /// Token restored from storage whose profile has not been fetched yet.
    pending_token: RwLock<Option<String>>,
}

impl AuthStore {
    pub fn new(client: RecruiterApiClient, storage: Arc<dyn SessionStore>) -> Self {
        Self {
            client,
            storage,
            session: RwLock::new(None),
            pending_token: RwLock::new(None),
        }
    }

    /// Logs in with an identity string.
    ///
    /// # Errors
    ///
    /// * `Validation` if the identity is blank.
    /// * `InvalidCredentials` if the backend refuses it.
    /// * `Network` / `Api` for transport or server failures.
    pub async fn login(&self, identity: &str) -> Result<User, AppError> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(AppError::Validation("identity cannot be empty".to_string()));
        }

        let response = self.client.login_by_identity(identity).await?;
        Ok(self.start_session(response).await)
    }

    /// Creates an account and logs straight into it.
    ///
    /// # Errors
    ///
    /// * `Validation` for a blank email, password or name, or when the
    ///   backend refuses the registration (e.g. the email is taken).
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
        company: Option<&str>,
    ) -> Result<User, AppError> {
        let email = email.trim();
        let full_name = full_name.trim();
        if email.is_empty() || password.is_empty() || full_name.is_empty() {
            return Err(AppError::Validation(
                "email, password and name are required".to_string(),
            ));
        }

        let request = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            full_name: full_name.to_string(),
            company: company
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        };
        let response = self.client.register(&request).await?;
        Ok(self.start_session(response).await)
    }

    /// Installs a fresh token: client, persisted store, then memory.
    async fn start_session(&self, response: TokenResponse) -> User {
        let session = Session {
            token: response.access_token,
            user: response.user,
        };

        self.client.set_token(Some(session.token.clone()));
        let persisted = PersistedSession {
            auth_token: Some(session.token.clone()),
            recruiter_id: Some(session.user.recruiter_id()),
        };
        if let Err(e) = self.storage.save(&persisted) {
            // The login itself worked; only the next process will notice.
            tracing::warn!("Logged in but could not persist session: {}", e);
        }

        let user = session.user.clone();
        *self.pending_token.write().await = None;
        *self.session.write().await = Some(session);
        tracing::info!("Session started for {}", user.email);
        user
    }

    /// Ends the session. Always succeeds.
    pub async fn logout(&self) {
        *self.session.write().await = None;
        *self.pending_token.write().await = None;
        self.client.set_token(None);

        if let Err(e) = self.storage.clear() {
            tracing::warn!("Could not clear persisted session: {}", e);
        }
        tracing::info!("Logged out");
    }

    /// Loads a persisted token into the client without contacting the
    /// backend. Returns whether a token was found.
    pub async fn restore(&self) -> bool {
        if self.session.read().await.is_some() {
            return true;
        }

        let persisted = match self.storage.load() {
            Ok(persisted) => persisted,
            Err(e) => {
                tracing::warn!("Could not read persisted session: {}", e);
                return false;
            }
        };

        match persisted.auth_token {
            Some(token) => {
                tracing::debug!("Restored persisted session token");
                self.client.set_token(Some(token.clone()));
                *self.pending_token.write().await = Some(token);
                true
            }
            None => false,
        }
    }

    /// Confirms the session with the backend and refreshes the profile.
    ///
    /// A failed check keeps whatever session is held, even if it may be
    /// stale; only [`AuthStore::logout`] ends a session.
    pub async fn check_session(&self) -> Option<User> {
        if !self.restore().await {
            return None;
        }

        match self.client.get_profile().await {
            Ok(user) => {
                let token = match self.session.read().await.as_ref() {
                    Some(session) => Some(session.token.clone()),
                    None => self.pending_token.read().await.clone(),
                };
                if let Some(token) = token {
                    *self.session.write().await = Some(Session {
                        token,
                        user: user.clone(),
                    });
                    *self.pending_token.write().await = None;
                }
                Some(user)
            }
            Err(e) => {
                tracing::warn!("Session check failed, keeping current session: {}", e);
                self.current_user().await
            }
        }
    }

    /// Updates name and/or company on the backend and in memory.
    pub async fn update_profile(
        &self,
        full_name: Option<&str>,
        company: Option<&str>,
    ) -> Result<User, AppError> {
        if full_name.is_none() && company.is_none() {
            return Err(AppError::Validation("nothing to update".to_string()));
        }
        if !self.is_authenticated().await {
            return Err(AppError::Unauthorized("not logged in".to_string()));
        }

        let user = self.client.update_profile(full_name, company).await?;
        if let Some(session) = self.session.write().await.as_mut() {
            session.user = user.clone();
        }
        Ok(user)
    }

    pub async fn current_user(&self) -> Option<User> {
        self.session.read().await.as_ref().map(|s| s.user.clone())
    }

    /// Recruiter id of the in-memory session, falling back to storage.
    pub async fn recruiter_id(&self) -> Option<String> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Some(session.user.recruiter_id());
        }
        self.storage.load().ok().and_then(|p| p.recruiter_id)
    }

    /// True when a session or a restored token is held.
    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_some() || self.pending_token.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_store::MemorySessionStore;
    use std::time::Duration;

    fn offline_client() -> RecruiterApiClient {
        RecruiterApiClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap()
    }

    #[tokio::test]
    async fn test_blank_identity_rejected_without_request() {
        let store = AuthStore::new(offline_client(), Arc::new(MemorySessionStore::new()));
        let err = store.login("   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_logout_clears_persisted_state_from_any_prior_state() {
        let storage = Arc::new(MemorySessionStore::with_session(PersistedSession {
            auth_token: Some("stale".into()),
            recruiter_id: Some("7".into()),
        }));
        let client = offline_client();
        let store = AuthStore::new(client.clone(), storage.clone());

        assert!(store.restore().await);
        assert!(client.has_token());

        store.logout().await;
        assert!(storage.snapshot().is_empty());
        assert!(!client.has_token());
        assert!(!store.is_authenticated().await);

        // Logging out again with nothing held is fine
        store.logout().await;
        assert!(storage.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_register_requires_fields_before_request() {
        let store = AuthStore::new(offline_client(), Arc::new(MemorySessionStore::new()));
        for (email, password, name) in [
            ("", "secret", "Dana"),
            ("dana@example.com", "", "Dana"),
            ("dana@example.com", "secret", "  "),
        ] {
            let err = store.register(email, password, name, None).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_update_profile_requires_a_field_and_a_session() {
        let store = AuthStore::new(offline_client(), Arc::new(MemorySessionStore::new()));
        assert!(matches!(
            store.update_profile(None, None).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            store.update_profile(Some("Dana"), None).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_without_persisted_token() {
        let store = AuthStore::new(offline_client(), Arc::new(MemorySessionStore::new()));
        assert!(!store.restore().await);
        assert!(store.check_session().await.is_none());
    }

    #[tokio::test]
    async fn test_recruiter_id_falls_back_to_storage() {
        let storage = Arc::new(MemorySessionStore::with_session(PersistedSession {
            auth_token: Some("t".into()),
            recruiter_id: Some("99".into()),
        }));
        let store = AuthStore::new(offline_client(), storage);
        assert_eq!(store.recruiter_id().await.as_deref(), Some("99"));
    }
}
