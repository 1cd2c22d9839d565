//! In-memory store implementation
//!
//! Records live in dashmap collections keyed by id; name/title uniqueness
//! goes through parking_lot-guarded indexes so concurrent upserts cannot
//! race a duplicate in. Batched-read counters expose how many batch fetches
//! the loader actually issued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{LibrisError, Result};

use super::{AuthorRecord, BookRecord, LibraryStore, NewBook, NewUser, UserRecord};

/// Counters for batched-read traffic against the store
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Number of `find_authors` batch calls issued
    pub author_batch_calls: u64,
    /// Total author ids requested across all batch calls
    pub author_keys_fetched: u64,
}

/// In-process store backed by concurrent maps
#[derive(Default)]
pub struct MemoryStore {
    authors: DashMap<Uuid, AuthorRecord>,
    books: DashMap<Uuid, BookRecord>,
    users: DashMap<Uuid, UserRecord>,

    // Uniqueness indexes; each maps the unique field to the record id.
    author_names: Mutex<HashMap<String, Uuid>>,
    book_titles: Mutex<HashMap<String, Uuid>>,
    usernames: Mutex<HashMap<String, Uuid>>,

    author_batch_calls: AtomicU64,
    author_keys_fetched: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the batched-read counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            author_batch_calls: self.author_batch_calls.load(Ordering::Relaxed),
            author_keys_fetched: self.author_keys_fetched.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn find_author(&self, id: Uuid) -> Result<Option<AuthorRecord>> {
        Ok(self.authors.get(&id).map(|r| r.value().clone()))
    }

    async fn find_authors(&self, ids: &[Uuid]) -> Result<Vec<AuthorRecord>> {
        self.author_batch_calls.fetch_add(1, Ordering::Relaxed);
        self.author_keys_fetched
            .fetch_add(ids.len() as u64, Ordering::Relaxed);
        debug!(keys = ids.len(), "batched author fetch");

        Ok(ids
            .iter()
            .filter_map(|id| self.authors.get(id).map(|r| r.value().clone()))
            .collect())
    }

    async fn all_authors(&self) -> Result<Vec<AuthorRecord>> {
        Ok(self.authors.iter().map(|r| r.value().clone()).collect())
    }

    async fn upsert_author_by_name(&self, name: &str) -> Result<AuthorRecord> {
        let mut names = self.author_names.lock();
        if let Some(id) = names.get(name) {
            if let Some(existing) = self.authors.get(id) {
                return Ok(existing.value().clone());
            }
        }

        let record = AuthorRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            born: None,
        };
        names.insert(record.name.clone(), record.id);
        self.authors.insert(record.id, record.clone());
        debug!(author = %record.name, "created author");
        Ok(record)
    }

    async fn set_author_born(&self, name: &str, born: i32) -> Result<Option<AuthorRecord>> {
        let id = match self.author_names.lock().get(name) {
            Some(id) => *id,
            None => return Ok(None),
        };
        match self.authors.get_mut(&id) {
            Some(mut entry) => {
                entry.value_mut().born = Some(born);
                Ok(Some(entry.value().clone()))
            }
            None => Ok(None),
        }
    }

    async fn all_books(&self) -> Result<Vec<BookRecord>> {
        Ok(self.books.iter().map(|r| r.value().clone()).collect())
    }

    async fn save_book(&self, book: NewBook) -> Result<BookRecord> {
        let mut titles = self.book_titles.lock();
        if titles.contains_key(&book.title) {
            return Err(LibrisError::persistence_with_input(
                "a book with this title already exists",
                book.title,
            ));
        }

        let record = BookRecord {
            id: Uuid::new_v4(),
            title: book.title,
            published: book.published,
            genres: book.genres,
            author_id: book.author_id,
        };
        titles.insert(record.title.clone(), record.id);
        self.books.insert(record.id, record.clone());
        debug!(book = %record.title, "saved book");
        Ok(record)
    }

    async fn count_books(&self) -> Result<u64> {
        Ok(self.books.len() as u64)
    }

    async fn count_authors(&self) -> Result<u64> {
        Ok(self.authors.len() as u64)
    }

    async fn count_books_by_authors(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, u64>> {
        let mut counts: HashMap<Uuid, u64> = ids.iter().map(|id| (*id, 0)).collect();
        for book in self.books.iter() {
            if let Some(count) = counts.get_mut(&book.value().author_id) {
                *count += 1;
            }
        }
        Ok(counts)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self.users.get(&id).map(|r| r.value().clone()))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let id = match self.usernames.lock().get(username) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.users.get(&id).map(|r| r.value().clone()))
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord> {
        let mut usernames = self.usernames.lock();
        if usernames.contains_key(&user.username) {
            return Err(LibrisError::persistence_with_input(
                "a user with this username already exists",
                user.username,
            ));
        }

        let record = UserRecord {
            id: Uuid::new_v4(),
            username: user.username,
            favorite_genre: user.favorite_genre,
            password_hash: user.password_hash,
        };
        usernames.insert(record.username.clone(), record.id);
        self.users.insert(record.id, record.clone());
        debug!(username = %record.username, "created user");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_author_is_idempotent() {
        let store = MemoryStore::new();

        let first = store.upsert_author_by_name("Ursula K. Le Guin").await.unwrap();
        let second = store.upsert_author_by_name("Ursula K. Le Guin").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.count_authors().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_title_echoes_input() {
        let store = MemoryStore::new();
        let author = store.upsert_author_by_name("Frank Herbert").await.unwrap();

        let book = NewBook {
            title: "Dune".to_string(),
            published: 1965,
            genres: vec!["scifi".to_string()],
            author_id: author.id,
        };
        store.save_book(book.clone()).await.unwrap();

        let err = store.save_book(book).await.unwrap_err();
        assert_eq!(err.code(), "PERSISTENCE_FAILURE");
        assert_eq!(err.invalid_input(), Some("Dune"));
        assert_eq!(store.count_books().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn batched_fetch_updates_counters() {
        let store = MemoryStore::new();
        let a = store.upsert_author_by_name("A").await.unwrap();
        let b = store.upsert_author_by_name("B").await.unwrap();

        let found = store.find_authors(&[a.id, b.id, Uuid::new_v4()]).await.unwrap();
        assert_eq!(found.len(), 2);

        let stats = store.stats();
        assert_eq!(stats.author_batch_calls, 1);
        assert_eq!(stats.author_keys_fetched, 3);
    }

    #[tokio::test]
    async fn per_author_counts() {
        let store = MemoryStore::new();
        let a = store.upsert_author_by_name("A").await.unwrap();
        let b = store.upsert_author_by_name("B").await.unwrap();

        for title in ["one", "two", "three"] {
            store
                .save_book(NewBook {
                    title: title.to_string(),
                    published: 2020,
                    genres: vec![],
                    author_id: a.id,
                })
                .await
                .unwrap();
        }

        let counts = store.count_books_by_authors(&[a.id, b.id]).await.unwrap();
        assert_eq!(counts.get(&a.id), Some(&3));
        assert_eq!(counts.get(&b.id), Some(&0));
    }

    #[tokio::test]
    async fn set_born_on_unknown_author() {
        let store = MemoryStore::new();
        assert!(store.set_author_born("nobody", 1920).await.unwrap().is_none());
    }
}
