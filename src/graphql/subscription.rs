//! GraphQL subscription resolvers
//!
//! Each GraphQL subscriber gets its own bus session; the stream ends when
//! the session closes (unsubscribe, overflow disconnect, or bus shutdown).
//! There is no replay: subscribers only see books added while connected.

use async_graphql::{Context, ErrorExtensions, Result, Subscription};
use futures_util::Stream;

use crate::graphql::types::Book;
use crate::pubsub::{EventBus, EventPayload, TOPIC_BOOK_ADDED};

/// GraphQL Subscription root
pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Books added to the catalog while subscribed
    async fn book_added(&self, ctx: &Context<'_>) -> Result<impl Stream<Item = Book>> {
        let bus = ctx.data::<EventBus>()?;
        let mut session = bus.subscribe(TOPIC_BOOK_ADDED).map_err(|e| e.extend())?;

        let stream = async_stream::stream! {
            while let Some(event) = session.next_event().await {
                let EventPayload::BookAdded(added) = event.payload;
                yield Book::from(added);
            }
        };

        Ok(stream)
    }
}
