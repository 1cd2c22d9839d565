#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Libris
//!
//! Libris is a developer-first library catalog service: a GraphQL API over
//! books and authors with user accounts and a live feed of newly added
//! books.
//!
//! ## Features
//!
//! - **Batched author lookups**: resolving nested authors across a list of
//!   books issues one batched store fetch per request, not one per book
//! - **Live updates**: `bookAdded` subscriptions over WebSocket, fanned out
//!   through an in-process event bus
//! - **Bearer-token auth**: JWT login with argon2-hashed credentials
//! - **Single binary**: in-memory store, zero configuration to start
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with defaults (listens on 0.0.0.0:4000)
//! $ ./libris
//!
//! # Run with custom settings
//! $ ./libris --listen-addr 127.0.0.1:4000 --loader-window-ms 5
//! ```
//!
//! The GraphQL Playground is served at `/graphql`, WebSocket subscriptions
//! at `/graphql/ws`, and a liveness probe at `/health`.
//!
//! ## Architecture
//!
//! - [`loader`]: request-scoped batch loading (the N+1 guard)
//! - [`pubsub`]: in-process event bus and subscription sessions
//! - [`graphql`]: query/mutation/subscription resolvers and schema
//! - [`store`]: persistence contract and the in-memory implementation
//! - [`auth`]: password hashing, token issuance and verification
//! - [`server`]: axum routes and process lifecycle
//! - [`config`]: server configuration and CLI arguments
//! - [`error`]: error types and Result alias

pub mod auth;
pub mod config;
pub mod error;
pub mod graphql;
pub mod loader;
pub mod pubsub;
pub mod server;
pub mod store;

pub use config::{ServerArgs, ServerConfig};
pub use error::{LibrisError, Result};
pub use loader::{AuthorLoader, BatchFetcher, BatchLoader, LoadError, LoaderConfig};
pub use pubsub::{BusConfig, Event, EventBus, EventPayload, SubscriptionSession, TOPIC_BOOK_ADDED};
pub use server::Server;
