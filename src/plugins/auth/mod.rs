//! Authentication collaborator.
//!
//! The chat core only needs "current uid, or none"; everything else here
//! (sign-up, sign-in, sign-out, profile) exists to produce that answer.

mod error;
mod firebase;
mod session;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

pub use error::AuthError;
pub use firebase::FirebaseAuth;
pub use session::{Session, SessionHandle};

#[cfg(test)]
pub(crate) use session::test_session;

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn update_profile(&self, session: &Session, display_name: &str)
    -> Result<Session, AuthError>;
}

/// Drives an `AuthProvider` and keeps the shared `SessionHandle` in sync.
pub struct Authenticator {
    provider: Arc<dyn AuthProvider>,
    session: SessionHandle,
}

fn validate_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(AuthError::InvalidInput("A valid email is required".to_string()));
    }
    if password.is_empty() {
        return Err(AuthError::InvalidInput("Password is required".to_string()));
    }
    Ok(())
}

impl Authenticator {
    pub fn new(provider: Arc<dyn AuthProvider>, session: SessionHandle) -> Self {
        Self { provider, session }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Receives the new uid (or `None`) whenever the signed-in user changes.
    pub fn on_change(&self) -> watch::Receiver<Option<String>> {
        self.session.changes()
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Arc<Session>, AuthError> {
        validate_credentials(email, password)?;
        let session = self.provider.sign_up(email.trim(), password).await?;
        log::info!("Signed up and signed in as {}", session.uid);
        Ok(self.install(session))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Arc<Session>, AuthError> {
        validate_credentials(email, password)?;
        let session = self.provider.sign_in(email.trim(), password).await?;
        log::info!("Signed in as {}", session.uid);
        Ok(self.install(session))
    }

    pub fn sign_out(&self) {
        if let Some(uid) = self.session.uid() {
            log::info!("Signed out {}", uid);
        }
        self.session.replace(None);
    }

    pub async fn update_profile(&self, display_name: &str) -> Result<Arc<Session>, AuthError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(AuthError::InvalidInput("Display name is required".to_string()));
        }
        let current = self.session.current().ok_or(AuthError::SignedOut)?;
        let updated = self.provider.update_profile(&current, display_name).await?;
        Ok(self.install(updated))
    }

    fn install(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.session.replace(Some(session.as_ref().clone()));
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Accepts any password except "wrong"; records calls.
    #[derive(Default)]
    struct FakeProvider {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AuthProvider for FakeProvider {
        async fn sign_up(&self, email: &str, _password: &str) -> Result<Session, AuthError> {
            self.calls.lock().unwrap().push(format!("sign_up {email}"));
            Ok(test_session("new-user"))
        }

        async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
            self.calls.lock().unwrap().push(format!("sign_in {email}"));
            if password == "wrong" {
                return Err(AuthError::rejected("INVALID_LOGIN_CREDENTIALS"));
            }
            Ok(test_session("u1"))
        }

        async fn update_profile(
            &self,
            session: &Session,
            display_name: &str,
        ) -> Result<Session, AuthError> {
            let mut updated = session.clone();
            updated.display_name = Some(display_name.to_string());
            Ok(updated)
        }
    }

    fn authenticator() -> (Arc<FakeProvider>, Authenticator) {
        let provider = Arc::new(FakeProvider::default());
        let auth = Authenticator::new(provider.clone(), SessionHandle::new());
        (provider, auth)
    }

    #[tokio::test]
    async fn test_sign_in_sets_session_and_notifies() {
        let (_provider, auth) = authenticator();
        let mut changes = auth.on_change();
        auth.sign_in(" a@b.c ", "secret").await.unwrap();
        changes.changed().await.unwrap();
        assert_eq!(changes.borrow().as_deref(), Some("u1"));
        assert_eq!(auth.session().uid().as_deref(), Some("u1"));

        auth.sign_out();
        assert!(!auth.session().is_signed_in());
    }

    #[tokio::test]
    async fn test_rejected_sign_in_keeps_signed_out() {
        let (_provider, auth) = authenticator();
        let err = auth.sign_in("a@b.c", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "Email or password is incorrect");
        assert!(!auth.session().is_signed_in());
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_provider() {
        let (provider, auth) = authenticator();
        assert!(matches!(
            auth.sign_up("not-an-email", "pw").await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_profile_requires_session() {
        let (_provider, auth) = authenticator();
        assert_eq!(auth.update_profile("Ada").await.unwrap_err(), AuthError::SignedOut);

        auth.sign_up("a@b.c", "secret").await.unwrap();
        let updated = auth.update_profile("Ada").await.unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Ada"));
        assert_eq!(
            auth.session().current().unwrap().display_name.as_deref(),
            Some("Ada")
        );
    }
}
