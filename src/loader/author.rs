//! Author lookups batched against the store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::store::LibraryStore;

use super::{BatchFetcher, BatchLoader};

/// Resolved author, with its book count, as produced by one batched fetch
#[derive(Debug, Clone)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub name: String,
    pub born: Option<i32>,
    pub book_count: u64,
}

/// Fetches authors (and their book counts) by id in batches
pub struct AuthorFetcher {
    store: Arc<dyn LibraryStore>,
}

impl AuthorFetcher {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BatchFetcher for AuthorFetcher {
    type Key = Uuid;
    type Value = AuthorSummary;

    async fn fetch(&self, keys: &[Uuid]) -> Result<HashMap<Uuid, AuthorSummary>> {
        let records = self.store.find_authors(keys).await?;
        let counts = self.store.count_books_by_authors(keys).await?;

        Ok(records
            .into_iter()
            .map(|author| {
                let book_count = counts.get(&author.id).copied().unwrap_or(0);
                (
                    author.id,
                    AuthorSummary {
                        id: author.id,
                        name: author.name,
                        born: author.born,
                        book_count,
                    },
                )
            })
            .collect())
    }
}

/// The per-request author loader injected into resolver context
pub type AuthorLoader = BatchLoader<AuthorFetcher>;
