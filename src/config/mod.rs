//! Server configuration and CLI arguments
//!
//! Defaults live in constants, CLI flags (with env-var fallbacks) override
//! them, and the result is folded into a [`ServerConfig`] consumed by the
//! rest of the process.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::error::{LibrisError, Result};
use crate::loader::LoaderConfig;
use crate::pubsub::BusConfig;

/// Default listen address for the GraphQL HTTP API
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:4000";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Built-in development JWT secret. Never use in production; set
/// `LIBRIS_JWT_SECRET` instead.
pub const DEFAULT_JWT_SECRET: &str = "libris-dev-secret";

/// Default bearer token lifetime in seconds (24 hours)
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Default loader coalescing window in milliseconds
pub const DEFAULT_LOADER_WINDOW_MS: u64 = 2;

/// Default maximum number of unique keys per loader batch
pub const DEFAULT_LOADER_MAX_BATCH: usize = 64;

/// Default per-subscriber event buffer capacity
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Command-line arguments for the libris server
#[derive(Parser, Debug, Clone)]
#[command(name = "libris")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A developer-first library catalog service with a GraphQL API and live updates")]
pub struct ServerArgs {
    /// Address to listen on for the GraphQL HTTP API
    #[arg(long, env = "LIBRIS_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: String,

    /// Secret used to sign and verify bearer tokens
    #[arg(long, env = "LIBRIS_JWT_SECRET", default_value = DEFAULT_JWT_SECRET)]
    pub jwt_secret: String,

    /// Bearer token lifetime in seconds
    #[arg(long, env = "LIBRIS_TOKEN_TTL_SECS", default_value_t = DEFAULT_TOKEN_TTL_SECS)]
    pub token_ttl_secs: u64,

    /// Loader coalescing window in milliseconds.
    /// Lookups issued within one window are folded into a single batched
    /// fetch against the store.
    #[arg(long, env = "LIBRIS_LOADER_WINDOW_MS", default_value_t = DEFAULT_LOADER_WINDOW_MS)]
    pub loader_window_ms: u64,

    /// Maximum unique keys per loader batch. A batch that reaches this size
    /// dispatches immediately without waiting for the window to elapse.
    #[arg(long, env = "LIBRIS_LOADER_MAX_BATCH", default_value_t = DEFAULT_LOADER_MAX_BATCH)]
    pub loader_max_batch: usize,

    /// Per-subscriber event buffer capacity. A subscriber whose buffer
    /// overflows is disconnected rather than allowed to stall the bus.
    #[arg(long, env = "LIBRIS_SUBSCRIBER_BUFFER", default_value_t = DEFAULT_SUBSCRIBER_BUFFER)]
    pub subscriber_buffer: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LIBRIS_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,
}

/// Resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// GraphQL HTTP API listen address
    pub listen_addr: SocketAddr,
    /// Bearer token signing secret
    pub jwt_secret: String,
    /// Bearer token lifetime
    pub token_ttl: Duration,
    /// Batch loader tuning
    pub loader: LoaderConfig,
    /// Event bus tuning
    pub bus: BusConfig,
    /// Log level
    pub log_level: String,
}

impl ServerConfig {
    /// Fold parsed CLI arguments into a resolved configuration.
    pub fn from_args(args: &ServerArgs) -> Result<Self> {
        let listen_addr: SocketAddr = args.listen_addr.parse().map_err(|_| {
            LibrisError::Config(format!("invalid listen address: {}", args.listen_addr))
        })?;

        if args.loader_max_batch == 0 {
            return Err(LibrisError::Config(
                "loader max batch size must be at least 1".to_string(),
            ));
        }
        if args.subscriber_buffer == 0 {
            return Err(LibrisError::Config(
                "subscriber buffer capacity must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            listen_addr,
            jwt_secret: args.jwt_secret.clone(),
            token_ttl: Duration::from_secs(args.token_ttl_secs),
            loader: LoaderConfig {
                window: Duration::from_millis(args.loader_window_ms),
                max_batch_size: args.loader_max_batch,
            },
            bus: BusConfig {
                subscriber_buffer: args.subscriber_buffer,
            },
            log_level: args.log_level.clone(),
        })
    }

    /// Whether the built-in development JWT secret is still in use.
    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // The default string is a valid socket address; parsing it
            // cannot fail at runtime, and the tests pin that down.
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 4000)),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            loader: LoaderConfig::default(),
            bus: BusConfig::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}
