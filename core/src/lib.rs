//! Client-side todo store synchronized with a remote REST API.
//!
//! # Overview
//! `TodoStore` owns the todo list and the active filter, exposes derived
//! views, and runs create/update/delete/fetch actions against the API
//! through a `RemoteClient`. A failed action leaves the list untouched and
//! returns the error.
//!
//! # Design
//! - `RemoteClient` builds `HttpRequest` values and parses `HttpResponse`
//!   values as pure steps; a `Transport` does the actual round-trip.
//! - `UreqTransport` is the real network transport. Tests substitute
//!   scripted transports.
//! - Remote actions on one store are serialized; reads never wait on them.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod store;
pub mod transport;
pub mod types;

pub use client::RemoteClient;
pub use config::StoreConfig;
pub use error::{ApiError, ConfigError, StoreError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use store::{TodoState, TodoStore};
pub use transport::{Transport, UreqTransport};
pub use types::{Filter, Todo, TodoId};
