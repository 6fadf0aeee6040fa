//! HTTP request helper for the session store.
//!
//! This module provides the `ClientFactory`, which hands out short-lived
//! `SessionClient` handles carrying the base URL and the current bearer
//! token, and the `ApiError` type for failures that never reached a
//! usable HTTP response.

pub mod client;
pub mod error;

pub use client::{ClientFactory, Method, RequestDescriptor, SendOutcome, SessionClient};
pub use error::ApiError;
