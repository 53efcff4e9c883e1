//! Error types for the remote client, the store, and configuration.
//!
//! # Design
//! `NotFound` gets a dedicated variant because callers frequently distinguish
//! "the resource does not exist" from "the server returned an unexpected
//! status." All other non-2xx responses land in `Http` with the raw status
//! code and body for debugging. Network failures never reach the parse step
//! and are reported as `Transport`.

use thiserror::Error;

use crate::types::TodoId;

/// Errors produced by `RemoteClient` and `Transport` implementations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server returned 404.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The request never produced a response (connection refused, DNS, ...).
    #[error("transport failed: {0}")]
    Transport(String),
}

/// Errors returned by `TodoStore` actions.
///
/// A failed action never mutates the list; the error is handed back so the
/// caller can decide whether to surface it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// `update_todo` was asked to toggle an id that is not in the list.
    #[error("todo {0} is not in the list")]
    UnknownTodo(TodoId),

    /// The list already holds id `u64::MAX`, so no higher id can be issued.
    #[error("no todo id left above {0}")]
    IdSpaceExhausted(TodoId),
}

/// Errors from reading `StoreConfig` out of the environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("page size must be a positive integer, got {0:?}")]
    InvalidPageSize(String),

    #[error("base URL must not be empty")]
    EmptyBaseUrl,
}
