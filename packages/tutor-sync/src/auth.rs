//! Auth collaborator port.
//!
//! The coordinator only ever asks who is signed in right now. Sign-in flows
//! live elsewhere and publish their result through an [`AuthHandle`].

use tokio::sync::watch;

pub const GUEST_USER_ID: &str = "guest";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn guest() -> Self {
        Self(GUEST_USER_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Guests are local-only and never reach the remote store.
    pub fn is_guest(&self) -> bool {
        self.0 == GUEST_USER_ID
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user: UserId,
    /// Bearer token for the cloud store's REST API.
    pub id_token: Option<String>,
}

pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;

    fn id_token(&self) -> Option<String> {
        None
    }
}

/// Current session plus change notifications.
#[derive(Debug)]
pub struct AuthHandle {
    tx: watch::Sender<Option<AuthSession>>,
}

impl AuthHandle {
    pub fn signed_out() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn signed_in(user: UserId, id_token: Option<String>) -> Self {
        let handle = Self::signed_out();
        handle.sign_in(user, id_token);
        handle
    }

    pub fn sign_in(&self, user: UserId, id_token: Option<String>) {
        tracing::info!(user = %user, "auth state changed: signed in");
        self.tx.send_replace(Some(AuthSession { user, id_token }));
    }

    pub fn sign_in_guest(&self) {
        self.sign_in(UserId::guest(), None);
    }

    pub fn sign_out(&self) {
        tracing::info!("auth state changed: signed out");
        self.tx.send_replace(None);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AuthSession>> {
        self.tx.subscribe()
    }
}

impl AuthProvider for AuthHandle {
    fn current_user(&self) -> Option<UserId> {
        self.tx.borrow().as_ref().map(|session| session.user.clone())
    }

    fn id_token(&self) -> Option<String> {
        self.tx.borrow().as_ref().and_then(|session| session.id_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_is_detected() {
        assert!(UserId::guest().is_guest());
        assert!(!UserId::new("abc").is_guest());
    }

    #[tokio::test]
    async fn subscribers_see_sign_in_and_out() {
        let handle = AuthHandle::signed_out();
        let mut rx = handle.subscribe();
        assert!(handle.current_user().is_none());

        handle.sign_in(UserId::new("u1"), Some("token".to_string()));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|s| s.user.as_str().to_string()), Some("u1".to_string()));
        assert_eq!(handle.id_token().as_deref(), Some("token"));

        handle.sign_out();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
        assert!(handle.current_user().is_none());
    }
}
