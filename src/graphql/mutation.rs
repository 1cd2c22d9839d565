//! GraphQL mutation resolvers
//!
//! Write operations. Everything except account creation and login requires
//! an authenticated identity; the check runs before any store side effect.

use std::sync::Arc;

use async_graphql::{Context, ErrorExtensions, Object, Result, ID};
use tracing::warn;

use crate::auth::{AuthService, Identity, DEFAULT_PASSWORD};
use crate::error::LibrisError;
use crate::graphql::types::{Author, Book, Token, User};
use crate::pubsub::{BookAdded, EventBus, EventPayload, TOPIC_BOOK_ADDED};
use crate::store::{LibraryStore, NewBook, NewUser};

/// GraphQL Mutation root
pub struct MutationRoot;

fn require_identity<'a>(ctx: &'a Context<'_>) -> Result<&'a Identity> {
    ctx.data_opt::<Identity>()
        .ok_or_else(|| LibrisError::AuthenticationRequired.extend())
}

#[Object]
impl MutationRoot {
    /// Add a book to the catalog, creating its author if needed.
    ///
    /// On success a `bookAdded` event is published to every live
    /// subscriber; a failed save publishes nothing.
    async fn add_book(
        &self,
        ctx: &Context<'_>,
        title: String,
        #[graphql(desc = "Author name; the author is created if unknown")] author: String,
        published: i32,
        genres: Vec<String>,
    ) -> Result<Book> {
        require_identity(ctx)?;

        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(LibrisError::validation("book title must not be empty").extend());
        }
        let author_name = author.trim().to_string();
        if author_name.is_empty() {
            return Err(LibrisError::validation("author name must not be empty").extend());
        }

        let store = ctx.data::<Arc<dyn LibraryStore>>()?;
        let bus = ctx.data::<EventBus>()?;

        let author_record = store
            .upsert_author_by_name(&author_name)
            .await
            .map_err(|e| e.extend())?;

        let book_record = store
            .save_book(NewBook {
                title,
                published,
                genres,
                author_id: author_record.id,
            })
            .await
            .map_err(|e| e.extend())?;

        let author_book_count = store
            .count_books_by_authors(&[author_record.id])
            .await
            .map_err(|e| e.extend())?
            .get(&author_record.id)
            .copied()
            .unwrap_or(0);

        let added = BookAdded {
            book: book_record,
            author: author_record,
            author_book_count,
        };

        // The write is committed; a delivery problem is the bus's concern,
        // not the caller's.
        if let Err(err) = bus.publish(TOPIC_BOOK_ADDED, EventPayload::BookAdded(added.clone())) {
            warn!(error = %err, "failed to publish book-added event");
        }

        Ok(Book::from(added))
    }

    /// Set an author's year of birth
    async fn edit_author(
        &self,
        ctx: &Context<'_>,
        name: String,
        born: i32,
    ) -> Result<Author> {
        require_identity(ctx)?;

        let store = ctx.data::<Arc<dyn LibraryStore>>()?;
        let updated = store
            .set_author_born(&name, born)
            .await
            .map_err(|e| e.extend())?
            .ok_or_else(|| {
                LibrisError::validation_with_input("no author with this name", name.clone())
                    .extend()
            })?;

        let book_count = store
            .count_books_by_authors(&[updated.id])
            .await
            .map_err(|e| e.extend())?
            .get(&updated.id)
            .copied()
            .unwrap_or(0);

        Ok(Author {
            id: ID::from(updated.id.to_string()),
            name: updated.name,
            born: updated.born,
            book_count: book_count as i32,
        })
    }

    /// Create a user account.
    ///
    /// Accounts start with the fixed initial password; `login` exchanges it
    /// for a bearer token.
    async fn create_user(
        &self,
        ctx: &Context<'_>,
        username: String,
        favorite_genre: String,
    ) -> Result<User> {
        let username = username.trim().to_string();
        if username.is_empty() {
            return Err(LibrisError::validation("username must not be empty").extend());
        }

        let store = ctx.data::<Arc<dyn LibraryStore>>()?;
        let password_hash = AuthService::hash_password(DEFAULT_PASSWORD).map_err(|e| e.extend())?;
        let record = store
            .create_user(NewUser {
                username,
                favorite_genre,
                password_hash,
            })
            .await
            .map_err(|e| e.extend())?;

        Ok(User::from(&record))
    }

    /// Exchange credentials for a bearer token
    async fn login(
        &self,
        ctx: &Context<'_>,
        username: String,
        password: String,
    ) -> Result<Token> {
        let auth = ctx.data::<Arc<AuthService>>()?;
        let value = auth
            .login(&username, &password)
            .await
            .map_err(|e| e.extend())?;
        Ok(Token { value })
    }
}
