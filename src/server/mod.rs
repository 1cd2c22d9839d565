//! HTTP server wiring
//!
//! Builds the shared collaborators (store, event bus, auth service), mounts
//! the GraphQL routes, and serves until interrupted. On shutdown the event
//! bus is torn down so every live subscription session closes.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::auth::AuthService;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::graphql::build_schema;
use crate::pubsub::EventBus;
use crate::store::{LibraryStore, MemoryStore};

mod graphql_routes;

pub use graphql_routes::{create_graphql_router, GraphQLState};

/// The libris server
pub struct Server {
    config: ServerConfig,
    store: Arc<dyn LibraryStore>,
    bus: EventBus,
    auth: Arc<AuthService>,
}

impl Server {
    /// Assemble a server with the in-memory store.
    pub fn new(config: ServerConfig) -> Self {
        let store: Arc<dyn LibraryStore> = Arc::new(MemoryStore::new());
        Self::with_store(config, store)
    }

    /// Assemble a server over a caller-provided store.
    pub fn with_store(config: ServerConfig, store: Arc<dyn LibraryStore>) -> Self {
        let bus = EventBus::new(config.bus);
        let auth = Arc::new(AuthService::new(
            config.jwt_secret.clone(),
            config.token_ttl,
            store.clone(),
        ));
        Self {
            config,
            store,
            bus,
            auth,
        }
    }

    /// Handle to the event bus (shared with every subscription session).
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Serve until ctrl-c, then tear down the event bus.
    pub async fn run(self) -> Result<()> {
        let schema = build_schema(self.store.clone(), self.bus.clone(), self.auth.clone());
        let app = create_graphql_router(GraphQLState {
            schema,
            auth: self.auth,
            store: self.store,
            loader_config: self.config.loader,
        });

        let listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "libris listening");
        info!(
            "GraphQL playground at http://{}/graphql, subscriptions at ws://{}/graphql/ws",
            self.config.listen_addr, self.config.listen_addr
        );

        let bus = self.bus.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                bus.shutdown();
            })
            .await?;

        info!("server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    // An error installing the handler leaves the future pending; the
    // process then only stops by external kill, which is still clean.
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    } else {
        std::future::pending::<()>().await;
    }
}
