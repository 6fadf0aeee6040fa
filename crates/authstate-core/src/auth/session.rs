use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Storage slot holding the bearer token.
pub const TOKEN_KEY: &str = "token";

/// Storage slot holding the JSON-encoded user profile.
pub const USER_KEY: &str = "user";

/// Profile returned by the session validation endpoint.
/// The backend owns the schema, so every field is kept as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(Map<String, Value>);

impl UserProfile {
    /// Accepts either a JSON object or a string containing one.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::String(s) => serde_json::from_str(&s),
            other => serde_json::from_value(other),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn email(&self) -> Option<&str> {
        self.0.get("email").and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

impl From<Map<String, Value>> for UserProfile {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// In-memory authentication state.
///
/// `is_authenticated` is derived from the token, so an empty token never
/// makes it into `token`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    token: Option<String>,
    pub user: Option<UserProfile>,
    pub items: HashMap<String, Value>,
}

impl Session {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Replace the token. Empty strings clear it.
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token.filter(|t| !t.is_empty());
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Drop token and user. Cached items survive.
    pub fn clear_auth(&mut self) {
        self.token = None;
        self.user = None;
    }
}
