//! Authentication state and its persistence.
//!
//! This module provides:
//! - `Session`: token, user profile and the generic item map
//! - `SessionStorage`: persisted `token`/`user` slots, with in-memory,
//!   file-backed and OS-keychain implementations
//!
//! Persisted slots survive restarts; the item map lives in memory only.

pub mod credentials;
pub mod session;
pub mod storage;

pub use credentials::KeyringStorage;
pub use session::{Session, UserProfile, TOKEN_KEY, USER_KEY};
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
