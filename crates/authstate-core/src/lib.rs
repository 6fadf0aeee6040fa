//! authstate-core - session state for single-page app backends.
//!
//! This crate provides all non-UI functionality:
//! - `Store`: the session store (token, user profile, generic items)
//! - API client factory and request helper
//! - Persisted session storage (memory, file, OS keychain)
//! - Configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod store;

pub use api::{ApiError, ClientFactory, Method, RequestDescriptor, SendOutcome, SessionClient};
pub use auth::{
    FileStorage, KeyringStorage, MemoryStorage, Session, SessionStorage, UserProfile, TOKEN_KEY,
    USER_KEY,
};
pub use config::{Config, StorageBackend};
pub use store::Store;
