//! Session state shared by every request.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use crate::auth::AuthPayload;

use self::storage::{KeyValueStorage, MemoryStorage};

pub mod storage;

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const ACTIVE_ROLE_KEY: &str = "active_role";
const NEXT_ACTION_KEY: &str = "next_action";
const EMAIL_VERIFIED_KEY: &str = "email_verified";

const SESSION_KEYS: [&str; 5] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    ACTIVE_ROLE_KEY,
    NEXT_ACTION_KEY,
    EMAIL_VERIFIED_KEY,
];

/// The authenticated user's credentials and the metadata the API sends with them.
///
/// The `Debug` implementation redacts both tokens.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Bearer credential attached to outgoing requests.
    pub access_token: Option<String>,
    /// Credential exchanged for a new token pair once the access token expires.
    pub refresh_token: Option<String>,
    /// Role the user is currently acting as (`homeowner`, `handyman`).
    pub active_role: Option<String>,
    /// Onboarding step the API wants the app to show next.
    pub next_action: Option<String>,
    /// Whether the user's email address has been verified.
    pub email_verified: bool,
}

impl Session {
    /// A session is authenticated as long as it holds an access token.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "***REDACTED***"),
            )
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "***REDACTED***"),
            )
            .field("active_role", &self.active_role)
            .field("next_action", &self.next_action)
            .field("email_verified", &self.email_verified)
            .finish()
    }
}

/// Shared, persisted holder of the current [`Session`].
///
/// Cloning an `AuthStore` yields a handle to the same session. Reads are synchronous and
/// never wait on the network. Every mutation replaces whole fields under a single write
/// lock, then mirrors them to the [`KeyValueStorage`] backend.
///
/// A backend failure never rolls back the in-memory session; it is logged and the next
/// write tries again.
#[derive(Clone)]
pub struct AuthStore {
    session: Arc<RwLock<Session>>,
    storage: Arc<dyn KeyValueStorage>,
}

impl fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthStore")
            .field("session", &self.state())
            .field("storage", &"KeyValueStorage")
            .finish()
    }
}

impl Default for AuthStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl AuthStore {
    /// Creates a store backed by `storage`, restoring any session it already holds.
    ///
    /// # Example
    /// ```rust,ignore
    /// let storage = Arc::new(FileStorage::open("/data/auth.json")?);
    /// let auth_store = AuthStore::new(storage);
    ///
    /// if auth_store.is_authenticated() {
    ///     println!("Welcome back");
    /// }
    /// ```
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        let session = hydrate(storage.as_ref());

        Self {
            session: Arc::new(RwLock::new(session)),
            storage,
        }
    }

    /// Creates an empty store that keeps nothing across restarts.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// A snapshot of the current session.
    #[must_use]
    pub fn state(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The current access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    /// The current refresh token, if any.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh_token
            .clone()
    }

    /// Whether an access token is currently held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_authenticated()
    }

    /// Replaces both tokens.
    pub fn set_tokens(&self, access_token: impl Into<String>, refresh_token: impl Into<String>) {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();

        let mut session = self.write();
        self.persist_all(&[
            (ACCESS_TOKEN_KEY, access_token.as_str()),
            (REFRESH_TOKEN_KEY, refresh_token.as_str()),
        ]);
        session.access_token = Some(access_token);
        session.refresh_token = Some(refresh_token);
    }

    /// Replaces the active role.
    pub fn set_active_role(&self, active_role: impl Into<String>) {
        let active_role = active_role.into();

        let mut session = self.write();
        self.persist_all(&[(ACTIVE_ROLE_KEY, active_role.as_str())]);
        session.active_role = Some(active_role);
    }

    /// Replaces the next onboarding action.
    pub fn set_next_action(&self, next_action: impl Into<String>) {
        let next_action = next_action.into();

        let mut session = self.write();
        self.persist_all(&[(NEXT_ACTION_KEY, next_action.as_str())]);
        session.next_action = Some(next_action);
    }

    /// Replaces the email verification flag.
    pub fn set_email_verified(&self, email_verified: bool) {
        let mut session = self.write();
        self.persist_all(&[(EMAIL_VERIFIED_KEY, bool_value(email_verified))]);
        session.email_verified = email_verified;
    }

    /// Stores every field of an auth response at once.
    pub fn apply(&self, payload: &AuthPayload) {
        let mut session = self.write();
        self.replace(&mut session, payload);
    }

    /// Like [`AuthStore::apply`], but only while the session still holds `refresh_token`.
    ///
    /// Returns whether the payload was stored. A session that was ended or replaced while
    /// a refresh was in flight is left as it is.
    pub fn apply_if_refresh_token(&self, refresh_token: &str, payload: &AuthPayload) -> bool {
        let mut session = self.write();

        if session.refresh_token.as_deref() != Some(refresh_token) {
            return false;
        }

        self.replace(&mut session, payload);
        true
    }

    /// Forgets the session, in memory and in storage.
    ///
    /// This only touches the store; [`crate::HandymanClient::logout`] also tells the API
    /// and clears cached query results.
    pub fn logout(&self) {
        let mut session = self.write();
        self.forget(&mut session);
    }

    /// Like [`AuthStore::logout`], but only while the session still holds `refresh_token`.
    ///
    /// Returns whether the session was cleared.
    pub fn logout_if_refresh_token(&self, refresh_token: &str) -> bool {
        let mut session = self.write();

        if session.refresh_token.as_deref() != Some(refresh_token) {
            return false;
        }

        self.forget(&mut session);
        true
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace(&self, session: &mut Session, payload: &AuthPayload) {
        self.persist_all(&[
            (ACCESS_TOKEN_KEY, payload.access_token.as_str()),
            (REFRESH_TOKEN_KEY, payload.refresh_token.as_str()),
            (ACTIVE_ROLE_KEY, payload.active_role.as_str()),
            (NEXT_ACTION_KEY, payload.next_action.as_str()),
            (EMAIL_VERIFIED_KEY, bool_value(payload.email_verified)),
        ]);

        *session = Session {
            access_token: Some(payload.access_token.clone()),
            refresh_token: Some(payload.refresh_token.clone()),
            active_role: Some(payload.active_role.clone()),
            next_action: Some(payload.next_action.clone()),
            email_verified: payload.email_verified,
        };
    }

    fn forget(&self, session: &mut Session) {
        if let Err(error) = self.storage.remove_many(&SESSION_KEYS) {
            tracing::warn!(%error, "failed to remove persisted session");
        }

        *session = Session::default();
    }

    fn persist_all(&self, entries: &[(&str, &str)]) {
        if let Err(error) = self.storage.set_many(entries) {
            tracing::warn!(%error, "failed to persist session");
        }
    }
}

const fn bool_value(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn hydrate(storage: &dyn KeyValueStorage) -> Session {
    let read = |key: &str| match storage.get(key) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(key, %error, "failed to restore session field");
            None
        }
    };

    Session {
        access_token: read(ACCESS_TOKEN_KEY),
        refresh_token: read(REFRESH_TOKEN_KEY),
        active_role: read(ACTIVE_ROLE_KEY),
        next_action: read(NEXT_ACTION_KEY),
        email_verified: read(EMAIL_VERIFIED_KEY).as_deref() == Some("true"),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::storage::StorageError;
    use super::*;

    fn payload() -> AuthPayload {
        AuthPayload {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            active_role: "homeowner".to_string(),
            next_action: "complete_profile".to_string(),
            email_verified: true,
        }
    }

    #[test]
    fn apply_replaces_every_field() {
        let auth_store = AuthStore::in_memory();
        auth_store.apply(&payload());

        assert_eq!(
            auth_store.state(),
            Session {
                access_token: Some("access-1".to_string()),
                refresh_token: Some("refresh-1".to_string()),
                active_role: Some("homeowner".to_string()),
                next_action: Some("complete_profile".to_string()),
                email_verified: true,
            }
        );
        assert!(auth_store.is_authenticated());
    }

    #[test]
    fn session_is_restored_from_storage() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());

        AuthStore::new(Arc::clone(&storage)).apply(&payload());
        let restored = AuthStore::new(storage);

        assert_eq!(restored.access_token(), Some("access-1".to_string()));
        assert_eq!(restored.refresh_token(), Some("refresh-1".to_string()));
        assert!(restored.state().email_verified);
    }

    #[test]
    fn logout_clears_memory_and_storage() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let auth_store = AuthStore::new(Arc::clone(&storage));
        auth_store.apply(&payload());

        auth_store.logout();

        assert_eq!(auth_store.state(), Session::default());
        assert!(!auth_store.is_authenticated());
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(EMAIL_VERIFIED_KEY).unwrap(), None);
    }

    #[derive(Default)]
    struct CountingStorage {
        inner: MemoryStorage,
        writes: std::sync::atomic::AtomicUsize,
    }

    impl KeyValueStorage for CountingStorage {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.remove(key)
        }

        fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
            self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.set_many(entries)
        }

        fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
            self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.remove_many(keys)
        }
    }

    #[test]
    fn apply_and_logout_write_storage_once() {
        let storage = Arc::new(CountingStorage::default());
        let auth_store = AuthStore::new(Arc::clone(&storage) as Arc<dyn KeyValueStorage>);

        auth_store.apply(&payload());
        assert_eq!(storage.writes.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(storage.get(ACTIVE_ROLE_KEY).unwrap(), Some("homeowner".to_string()));

        auth_store.logout();
        assert_eq!(storage.writes.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn conditional_apply_requires_the_same_refresh_token() {
        let auth_store = AuthStore::in_memory();
        auth_store.set_tokens("access-0", "refresh-0");

        assert!(!auth_store.apply_if_refresh_token("refresh-other", &payload()));
        assert_eq!(auth_store.access_token(), Some("access-0".to_string()));

        assert!(auth_store.apply_if_refresh_token("refresh-0", &payload()));
        assert_eq!(auth_store.access_token(), Some("access-1".to_string()));

        auth_store.logout();
        assert!(!auth_store.apply_if_refresh_token("refresh-1", &payload()));
        assert_eq!(auth_store.state(), Session::default());
    }

    #[test]
    fn conditional_logout_keeps_a_newer_session() {
        let auth_store = AuthStore::in_memory();
        auth_store.apply(&payload());

        assert!(!auth_store.logout_if_refresh_token("refresh-0"));
        assert!(auth_store.is_authenticated());

        assert!(auth_store.logout_if_refresh_token("refresh-1"));
        assert!(!auth_store.is_authenticated());
    }

    #[test]
    fn clones_share_the_same_session() {
        let auth_store = AuthStore::in_memory();
        let handle = auth_store.clone();

        handle.set_tokens("a", "r");
        handle.set_active_role("handyman");
        handle.set_next_action("verify_email");
        handle.set_email_verified(false);

        assert_eq!(auth_store.access_token(), Some("a".to_string()));
        assert_eq!(auth_store.state().active_role, Some("handyman".to_string()));
        assert_eq!(
            auth_store.state().next_action,
            Some("verify_email".to_string())
        );
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let auth_store = AuthStore::in_memory();
        auth_store.set_tokens("secret-access", "secret-refresh");

        let output = format!("{auth_store:?}");

        assert!(!output.contains("secret-access"));
        assert!(!output.contains("secret-refresh"));
        assert!(output.contains("REDACTED"));
    }
}
