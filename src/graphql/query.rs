//! GraphQL query resolvers
//!
//! Read-only access to the catalog. List results resolve nested authors
//! through the request's batch loader; the filtering queries are plain
//! post-fetch predicates over a full fetch and are a known scaling limit,
//! deliberately outside the batching core.

use std::sync::Arc;

use async_graphql::{Context, ErrorExtensions, Object, Result, ID};
use futures_util::future::try_join_all;
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::LibrisError;
use crate::graphql::types::{Author, Book, User};
use crate::loader::AuthorLoader;
use crate::store::LibraryStore;

/// GraphQL Query root
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Number of books in the catalog
    async fn book_count(&self, ctx: &Context<'_>) -> Result<i32> {
        let store = ctx.data::<Arc<dyn LibraryStore>>()?;
        let count = store.count_books().await.map_err(|e| e.extend())?;
        Ok(count as i32)
    }

    /// Number of authors in the catalog
    async fn author_count(&self, ctx: &Context<'_>) -> Result<i32> {
        let store = ctx.data::<Arc<dyn LibraryStore>>()?;
        let count = store.count_authors().await.map_err(|e| e.extend())?;
        Ok(count as i32)
    }

    /// All books, optionally filtered by author name and/or genre.
    ///
    /// The author filter matches by the author's name. Resolving names for
    /// the filter goes through the batch loader, so it costs one batched
    /// fetch regardless of list size.
    async fn all_books(
        &self,
        ctx: &Context<'_>,
        #[graphql(desc = "Only books by this author (matched by name)")] author: Option<String>,
        #[graphql(desc = "Only books carrying this genre")] genre: Option<String>,
    ) -> Result<Vec<Book>> {
        let store = ctx.data::<Arc<dyn LibraryStore>>()?;
        let records = store.all_books().await.map_err(|e| e.extend())?;
        let mut books: Vec<Book> = records.into_iter().map(Book::from).collect();

        if let Some(genre) = genre.filter(|g| !g.is_empty()) {
            books.retain(|b| b.genres.iter().any(|g| g == &genre));
        }

        if let Some(author_name) = author.filter(|a| !a.is_empty()) {
            let loader = ctx.data::<AuthorLoader>()?;
            let summaries = try_join_all(books.iter().map(|b| loader.load(b.author_id)))
                .await
                .map_err(|e| LibrisError::from(e).extend())?;
            books = books
                .into_iter()
                .zip(summaries)
                .filter(|(_, summary)| summary.name == author_name)
                .map(|(book, _)| book)
                .collect();
        }

        Ok(books)
    }

    /// All authors with their book counts
    async fn all_authors(&self, ctx: &Context<'_>) -> Result<Vec<Author>> {
        let store = ctx.data::<Arc<dyn LibraryStore>>()?;
        let records = store.all_authors().await.map_err(|e| e.extend())?;
        let ids: Vec<Uuid> = records.iter().map(|a| a.id).collect();
        let counts = store
            .count_books_by_authors(&ids)
            .await
            .map_err(|e| e.extend())?;

        Ok(records
            .into_iter()
            .map(|author| {
                let book_count = counts.get(&author.id).copied().unwrap_or(0) as i32;
                Author {
                    id: ID::from(author.id.to_string()),
                    name: author.name,
                    born: author.born,
                    book_count,
                }
            })
            .collect())
    }

    /// The authenticated user, if any
    async fn me(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        Ok(ctx.data_opt::<Identity>().map(|i| User::from(&i.user)))
    }

    /// Books carrying the given genre
    async fn books_by_genre(&self, ctx: &Context<'_>, genre: String) -> Result<Vec<Book>> {
        let store = ctx.data::<Arc<dyn LibraryStore>>()?;
        let records = store.all_books().await.map_err(|e| e.extend())?;
        Ok(records
            .into_iter()
            .filter(|b| b.genres.iter().any(|g| g == &genre))
            .map(Book::from)
            .collect())
    }

    /// Books by the given author id
    async fn books_by_author(&self, ctx: &Context<'_>, id: ID) -> Result<Vec<Book>> {
        let author_id = Uuid::parse_str(id.as_str()).map_err(|_| {
            LibrisError::validation_with_input("malformed author id", id.to_string()).extend()
        })?;

        let store = ctx.data::<Arc<dyn LibraryStore>>()?;
        let records = store.all_books().await.map_err(|e| e.extend())?;
        Ok(records
            .into_iter()
            .filter(|b| b.author_id == author_id)
            .map(Book::from)
            .collect())
    }
}
