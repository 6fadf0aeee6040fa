//! The session store: owner of authentication state.
//!
//! Every authenticated HTTP call goes through `Store`, which asks the
//! `ClientFactory` for a handle bound to the current token, issues exactly
//! one request, and folds the outcome back into the session and its
//! persisted slots.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ClientFactory, Method, RequestDescriptor, SendOutcome};
use crate::auth::{Session, SessionStorage, UserProfile, TOKEN_KEY, USER_KEY};
use crate::config::Config;

pub struct Store<S: SessionStorage> {
    session: Session,
    storage: S,
    factory: ClientFactory,
    check_auth_path: String,
    logout_path: String,
}

impl<S: SessionStorage> Store<S> {
    /// Build the store and restore token/user from `storage`.
    pub fn open(config: &Config, storage: S) -> Result<Self, ApiError> {
        let factory = ClientFactory::new(config)?;
        Ok(Self::with_factory(config, factory, storage))
    }

    /// Like `open`, reusing an existing factory (and its connection pool).
    pub fn with_factory(config: &Config, factory: ClientFactory, storage: S) -> Self {
        let mut session = Session::default();

        match storage.get(TOKEN_KEY) {
            Ok(token) => session.set_token(token),
            Err(e) => warn!(error = %e, "Failed to read persisted token"),
        }
        match storage.get(USER_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<UserProfile>(&raw) {
                Ok(user) => session.user = Some(user),
                Err(e) => warn!(error = %e, "Ignoring malformed persisted user"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read persisted user"),
        }
        debug!(
            authenticated = session.is_authenticated(),
            has_user = session.user.is_some(),
            "Session restored"
        );

        Self {
            session,
            storage,
            factory,
            check_auth_path: config.check_auth_path.clone(),
            logout_path: config.logout_path.clone(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn token(&self) -> Option<&str> {
        self.session.token()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.session.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn get_item(&self, key: &str) -> Option<&Value> {
        self.session.items.get(key)
    }

    pub fn items(&self) -> &std::collections::HashMap<String, Value> {
        &self.session.items
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Set a session value.
    ///
    /// `"token"` and `"user"` update the auth state and are written through
    /// to storage; any other key goes into the in-memory item map. Never
    /// fails: storage errors are logged.
    pub fn set_item(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match key {
            TOKEN_KEY => {
                let was_authenticated = self.session.is_authenticated();
                let token = match value {
                    Value::Null => None,
                    Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                };
                self.session.set_token(token);
                self.persist_token();
                if was_authenticated != self.session.is_authenticated() {
                    info!(authenticated = self.session.is_authenticated(), "Session state changed");
                }
            }
            USER_KEY => {
                self.session.user = match value {
                    Value::Null => None,
                    value => match UserProfile::from_value(value) {
                        Ok(user) => Some(user),
                        Err(e) => {
                            warn!(error = %e, "User value is not a JSON object, clearing user");
                            None
                        }
                    },
                };
                self.persist_user();
            }
            _ => {
                self.session.items.insert(key.to_string(), value);
            }
        }
    }

    /// Remove a key from the item map. Absent keys are a no-op.
    pub fn delete_item(&mut self, key: &str) -> Option<Value> {
        self.session.items.remove(key)
    }

    /// Issue one bearer-authenticated request.
    ///
    /// Returns the decoded body on 2xx and the bare status code otherwise.
    /// Transport failures are returned as `ApiError::Network`.
    pub async fn send(
        &self,
        url: &str,
        method: Method,
        body: Option<Value>,
    ) -> Result<SendOutcome, ApiError> {
        let client = self.factory.for_token(self.session.token())?;
        client.execute(&RequestDescriptor::new(url, method, body)).await
    }

    /// Validate the session against the backend.
    ///
    /// On success the user record is returned and state is left alone; the
    /// caller stores it with `set_item("user", ...)`. Any failure logs the
    /// session out and returns `None`.
    pub async fn check_auth(&mut self) -> Option<UserProfile> {
        match self.send(&self.check_auth_path, Method::Get, None).await {
            Ok(SendOutcome::Body(body)) => match UserProfile::from_value(body) {
                Ok(user) => return Some(user),
                Err(e) => warn!(error = %e, "Session check returned an unexpected body"),
            },
            Ok(SendOutcome::Status(status)) => {
                warn!(status = status, "Session rejected by server");
            }
            Err(e) => warn!(error = %e, "Session check failed"),
        }

        self.clear_session();
        None
    }

    /// Log out on the server (best-effort), then clear local state.
    ///
    /// Local state is cleared whatever the server says. The return value
    /// reports whether the server acknowledged the logout.
    pub async fn logout(&mut self) -> bool {
        let acknowledged = match self.send(&self.logout_path, Method::Post, None).await {
            Ok(SendOutcome::Body(_)) => true,
            // 2xx with a body we could not decode still counts as done
            Err(ApiError::InvalidResponse { .. }) => true,
            Ok(SendOutcome::Status(status)) => {
                warn!(status = status, "Server logout failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "Server logout failed");
                false
            }
        };

        self.clear_session();
        acknowledged
    }

    /// Drop token and user from memory and storage.
    pub fn clear_session(&mut self) {
        self.session.clear_auth();
        self.persist_token();
        self.persist_user();
        info!("Session cleared");
    }

    fn persist_token(&mut self) {
        let result = match self.session.token() {
            Some(token) => self.storage.set(TOKEN_KEY, token),
            None => self.storage.remove(TOKEN_KEY),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist token");
        }
    }

    fn persist_user(&mut self) {
        let result = match self.session.user {
            Some(ref user) => self.storage.set(USER_KEY, &user.to_json()),
            None => self.storage.remove(USER_KEY),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist user");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStorage;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> Config {
        Config {
            base_url: base_url.to_string(),
            ..Config::default()
        }
    }

    fn offline_store() -> Store<MemoryStorage> {
        Store::open(&config("http://127.0.0.1:1"), MemoryStorage::new()).unwrap()
    }

    fn store_with_token(base_url: &str, token: &str) -> Store<MemoryStorage> {
        let mut storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, token).unwrap();
        Store::open(&config(base_url), storage).unwrap()
    }

    #[test]
    fn test_set_then_delete_item() {
        let mut store = offline_store();
        store.set_item("theme", "dark");
        assert_eq!(store.get_item("theme"), Some(&json!("dark")));

        assert_eq!(store.delete_item("theme"), Some(json!("dark")));
        assert!(!store.items().contains_key("theme"));

        // No-op on absent key
        assert_eq!(store.delete_item("theme"), None);
    }

    #[test]
    fn test_generic_items_are_not_persisted() {
        let mut store = offline_store();
        store.set_item("cart", json!({"count": 2}));
        assert!(store.storage().is_empty());
    }

    #[test]
    fn test_token_sets_authentication() {
        let mut store = offline_store();
        store.set_item("token", "abc");
        assert!(store.is_authenticated());
        assert_eq!(store.storage().get(TOKEN_KEY).unwrap().as_deref(), Some("abc"));

        store.set_item("token", "");
        assert!(!store.is_authenticated());
        assert_eq!(store.token(), None);
        assert_eq!(store.storage().get(TOKEN_KEY).unwrap(), None);

        store.set_item("token", "abc");
        store.set_item("token", Value::Null);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_non_string_token_stored_as_json_text() {
        let mut store = offline_store();
        store.set_item("token", json!(123));
        assert_eq!(store.token(), Some("123"));
        assert!(store.is_authenticated());
        assert_eq!(store.storage().get(TOKEN_KEY).unwrap().as_deref(), Some("123"));
    }

    #[test]
    fn test_token_is_not_a_generic_item() {
        let mut store = offline_store();
        store.set_item("token", "abc");
        assert!(store.items().is_empty());
        store.delete_item("token");
        assert!(store.is_authenticated());
    }

    #[test]
    fn test_user_parsed_from_json_string() {
        let mut store = offline_store();
        store.set_item("user", r#"{"id": 5, "name": "Ana"}"#);

        let user = store.user().expect("user should be stored");
        assert_eq!(user.name(), Some("Ana"));
        let persisted = store.storage().get(USER_KEY).unwrap().unwrap();
        let persisted: Value = serde_json::from_str(&persisted).unwrap();
        assert_eq!(persisted, json!({"id": 5, "name": "Ana"}));
    }

    #[test]
    fn test_malformed_user_clears_user() {
        let mut store = offline_store();
        store.set_item("user", json!({"id": 1}));
        store.set_item("user", "not json");
        assert_eq!(store.user(), None);
        assert_eq!(store.storage().get(USER_KEY).unwrap(), None);
    }

    #[test]
    fn test_open_restores_persisted_session() {
        let mut storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, "tok1").unwrap();
        storage.set(USER_KEY, r#"{"email":"a@b.c"}"#).unwrap();

        let store = Store::open(&config("http://127.0.0.1:1"), storage).unwrap();
        assert!(store.is_authenticated());
        assert_eq!(store.token(), Some("tok1"));
        assert_eq!(store.user().and_then(UserProfile::email), Some("a@b.c"));
    }

    #[test]
    fn test_open_ignores_malformed_user() {
        let mut storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, "tok1").unwrap();
        storage.set(USER_KEY, "{broken").unwrap();

        let store = Store::open(&config("http://127.0.0.1:1"), storage).unwrap();
        assert!(store.is_authenticated());
        assert_eq!(store.user(), None);
    }

    #[tokio::test]
    async fn test_send_attaches_bearer_and_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/widgets"))
            .and(header("authorization", "Bearer tok1"))
            .and(body_json(json!({"name": "x"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "name": "x"})))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_token(&server.uri(), "tok1");
        let outcome = store
            .send("/widgets", Method::Post, Some(json!({"name": "x"})))
            .await
            .unwrap();

        assert_eq!(outcome.into_body(), Some(json!({"id": 1, "name": "x"})));
    }

    #[tokio::test]
    async fn test_send_returns_404_as_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/widgets/9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = store_with_token(&server.uri(), "tok1");
        let outcome = store.send("/widgets/9", Method::Get, None).await.unwrap();

        assert_eq!(outcome, SendOutcome::Status(404));
    }

    #[tokio::test]
    async fn test_send_uses_rotated_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer tok2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let mut store = store_with_token(&server.uri(), "tok1");
        store.set_item("token", "tok2");
        let outcome = store.send("/me", Method::Get, None).await.unwrap();

        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_send_propagates_network_error() {
        let store = offline_store();
        let result = store.send("/anything", Method::Get, None).await;
        assert!(matches!(result, Err(ApiError::Network(_))));
    }

    #[tokio::test]
    async fn test_check_auth_returns_user_without_mutating() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/checkAuth"))
            .and(header("authorization", "Bearer tok1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 3, "name": "Ana"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut store = store_with_token(&server.uri(), "tok1");
        let user = store.check_auth().await.expect("session should be valid");

        assert_eq!(user.name(), Some("Ana"));
        assert!(store.is_authenticated());
        assert_eq!(store.user(), None);
    }

    #[tokio::test]
    async fn test_check_auth_uses_configured_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 3})))
            .expect(1)
            .mount(&server)
            .await;

        let mut storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, "tok1").unwrap();
        let config = Config {
            check_auth_path: "/user".to_string(),
            ..config(&server.uri())
        };
        let mut store = Store::open(&config, storage).unwrap();

        assert!(store.check_auth().await.is_some());
    }

    #[tokio::test]
    async fn test_check_auth_rejection_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/checkAuth"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut store = store_with_token(&server.uri(), "tok1");
        store.set_item("user", json!({"id": 3}));
        store.set_item("theme", "dark");

        assert_eq!(store.check_auth().await, None);
        assert!(!store.is_authenticated());
        assert_eq!(store.token(), None);
        assert_eq!(store.user(), None);
        assert!(store.storage().is_empty());
        assert_eq!(store.get_item("theme"), Some(&json!("dark")));
    }

    #[tokio::test]
    async fn test_check_auth_network_failure_clears_session() {
        let mut store = store_with_token("http://127.0.0.1:1", "tok1");
        store.set_item("user", json!({"id": 3}));

        assert_eq!(store.check_auth().await, None);
        assert!(!store.is_authenticated());
        assert_eq!(store.user(), None);
        assert!(store.storage().is_empty());
    }

    #[tokio::test]
    async fn test_check_auth_non_object_body_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/checkAuth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
            .mount(&server)
            .await;

        let mut store = store_with_token(&server.uri(), "tok1");
        assert_eq!(store.check_auth().await, None);
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_clears_session_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logout"))
            .and(header("authorization", "Bearer tok1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "bye"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut store = store_with_token(&server.uri(), "tok1");
        store.set_item("user", json!({"id": 3}));

        assert!(store.logout().await);
        assert!(!store.is_authenticated());
        assert_eq!(store.user(), None);
        assert!(store.storage().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_session_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logout"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let mut store = store_with_token(&server.uri(), "tok1");
        store.set_item("user", json!({"id": 3}));

        assert!(!store.logout().await);
        assert_eq!(store.token(), None);
        assert_eq!(store.user(), None);
        assert!(store.storage().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_session_when_offline() {
        let mut store = store_with_token("http://127.0.0.1:1", "tok1");

        assert!(!store.logout().await);
        assert!(!store.is_authenticated());
        assert!(store.storage().is_empty());
    }
}
