//! Persistence collaborator for the library domain
//!
//! The [`LibraryStore`] trait is the fixed contract the resolvers and the
//! batch loader are written against; [`MemoryStore`] is the in-process
//! reference implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

mod memory;

pub use memory::{MemoryStore, StoreStats};

/// A stored author
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub id: Uuid,
    pub name: String,
    /// Year of birth, if known
    pub born: Option<i32>,
}

/// A stored book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: Uuid,
    pub title: String,
    /// Year of publication
    pub published: i32,
    pub genres: Vec<String>,
    pub author_id: Uuid,
}

/// A stored user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub favorite_genre: String,
    /// Argon2 hash of the account password
    pub password_hash: String,
}

/// Input for saving a new book
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub published: i32,
    pub genres: Vec<String>,
    pub author_id: Uuid,
}

/// Input for creating a new user account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub favorite_genre: String,
    pub password_hash: String,
}

/// Persistence contract consumed by the resolvers and the batch loader.
///
/// `find_authors` is the batched read the loader dispatches against; the
/// result may omit ids with no record, and callers re-associate results by
/// id rather than by position.
#[async_trait]
pub trait LibraryStore: Send + Sync + 'static {
    async fn find_author(&self, id: Uuid) -> Result<Option<AuthorRecord>>;

    /// Batched author fetch. Returns one record per id that exists; ids
    /// without a record are simply absent from the result.
    async fn find_authors(&self, ids: &[Uuid]) -> Result<Vec<AuthorRecord>>;

    async fn all_authors(&self) -> Result<Vec<AuthorRecord>>;

    /// Find an author by exact name, creating the record if absent.
    async fn upsert_author_by_name(&self, name: &str) -> Result<AuthorRecord>;

    /// Set an author's year of birth. Returns `None` if no author has the
    /// given name.
    async fn set_author_born(&self, name: &str, born: i32) -> Result<Option<AuthorRecord>>;

    async fn all_books(&self) -> Result<Vec<BookRecord>>;

    /// Persist a new book. Titles are unique; saving a duplicate is a
    /// persistence failure echoing the offending title.
    async fn save_book(&self, book: NewBook) -> Result<BookRecord>;

    async fn count_books(&self) -> Result<u64>;

    async fn count_authors(&self) -> Result<u64>;

    /// Batched per-author book counts, one map entry per requested id.
    async fn count_books_by_authors(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, u64>>;

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    /// Create a user account. Usernames are unique; creating a duplicate is
    /// a persistence failure echoing the offending username.
    async fn create_user(&self, user: NewUser) -> Result<UserRecord>;
}
