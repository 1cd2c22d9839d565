//! GraphQL type definitions for the libris API

use async_graphql::{ComplexObject, Context, ErrorExtensions, Result, SimpleObject, ID};
use uuid::Uuid;

use crate::error::LibrisError;
use crate::loader::{AuthorLoader, AuthorSummary};
use crate::pubsub::BookAdded;
use crate::store::UserRecord;

/// An author, with the number of books in the catalog attributed to them
#[derive(SimpleObject, Clone, Debug)]
pub struct Author {
    pub id: ID,
    pub name: String,
    /// Year of birth, if known
    pub born: Option<i32>,
    pub book_count: i32,
}

impl From<AuthorSummary> for Author {
    fn from(summary: AuthorSummary) -> Self {
        Self {
            id: ID::from(summary.id.to_string()),
            name: summary.name,
            born: summary.born,
            book_count: summary.book_count as i32,
        }
    }
}

/// A book in the catalog
#[derive(SimpleObject, Clone, Debug)]
#[graphql(complex)]
pub struct Book {
    pub id: ID,
    pub title: String,
    /// Year of publication
    pub published: i32,
    pub genres: Vec<String>,
    #[graphql(skip)]
    pub author_id: Uuid,
    /// Populated when the book was produced together with its author (a
    /// mutation result or an event snapshot); query results leave it empty
    /// and resolve the author through the request's batch loader.
    #[graphql(skip)]
    pub author_snapshot: Option<Author>,
}

#[ComplexObject]
impl Book {
    /// The book's author
    async fn author(&self, ctx: &Context<'_>) -> Result<Author> {
        if let Some(author) = &self.author_snapshot {
            return Ok(author.clone());
        }
        let loader = ctx.data::<AuthorLoader>()?;
        let summary = loader
            .load(self.author_id)
            .await
            .map_err(|e| LibrisError::from(e).extend())?;
        Ok(Author::from(summary))
    }
}

impl From<crate::store::BookRecord> for Book {
    fn from(record: crate::store::BookRecord) -> Self {
        Self {
            id: ID::from(record.id.to_string()),
            title: record.title,
            published: record.published,
            genres: record.genres,
            author_id: record.author_id,
            author_snapshot: None,
        }
    }
}

impl From<BookAdded> for Book {
    fn from(added: BookAdded) -> Self {
        let author = Author {
            id: ID::from(added.author.id.to_string()),
            name: added.author.name,
            born: added.author.born,
            book_count: added.author_book_count as i32,
        };
        let mut book = Book::from(added.book);
        book.author_snapshot = Some(author);
        book
    }
}

/// A registered user account
#[derive(SimpleObject, Clone, Debug)]
pub struct User {
    pub id: ID,
    pub username: String,
    pub favorite_genre: String,
}

impl From<&UserRecord> for User {
    fn from(record: &UserRecord) -> Self {
        Self {
            id: ID::from(record.id.to_string()),
            username: record.username.clone(),
            favorite_genre: record.favorite_genre.clone(),
        }
    }
}

/// A signed bearer token
#[derive(SimpleObject, Clone, Debug)]
pub struct Token {
    pub value: String,
}
