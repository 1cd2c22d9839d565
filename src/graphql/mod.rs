//! GraphQL API module for libris
//!
//! Provides the query, mutation, and subscription roots over the library
//! catalog, plus the schema constructor that wires in the shared
//! collaborators.
//!
//! Per-request state (the caller's identity, the author batch loader) is
//! attached to each request by the HTTP layer, not to the schema: loader
//! caches must die with their request.
//!
//! # Example Queries
//!
//! ```graphql
//! # Catalog with nested authors (one batched author fetch, not N)
//! query {
//!   allBooks(genre: "scifi") {
//!     title
//!     author { name bookCount }
//!   }
//! }
//!
//! # Add a book (requires a bearer token)
//! mutation {
//!   addBook(title: "Dune", author: "Frank Herbert", published: 1965, genres: ["scifi"]) {
//!     title
//!     author { name }
//!   }
//! }
//!
//! # Live feed of new books (WebSocket)
//! subscription {
//!   bookAdded { title author { name } }
//! }
//! ```

pub mod mutation;
pub mod query;
pub mod subscription;
pub mod types;

use std::sync::Arc;

use async_graphql::Schema;

use crate::auth::AuthService;
use crate::pubsub::EventBus;
use crate::store::LibraryStore;

use self::mutation::MutationRoot;
use self::query::QueryRoot;
use self::subscription::SubscriptionRoot;

/// The full GraphQL schema type for libris
pub type LibrisSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

/// Build the GraphQL schema with the shared collaborators.
///
/// The schema is injected with:
/// - `Arc<dyn LibraryStore>` for catalog reads and writes
/// - `EventBus` for the `bookAdded` feed
/// - `Arc<AuthService>` for login
pub fn build_schema(
    store: Arc<dyn LibraryStore>,
    bus: EventBus,
    auth: Arc<AuthService>,
) -> LibrisSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(store)
        .data(bus)
        .data(auth)
        .finish()
}
