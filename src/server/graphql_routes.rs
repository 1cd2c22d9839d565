//! GraphQL Axum routes
//!
//! HTTP and WebSocket endpoints for the GraphQL API:
//!
//! - `POST /graphql` - Query and mutation endpoint
//! - `GET /graphql` - GraphQL Playground (interactive IDE)
//! - `GET /graphql/ws` - WebSocket transport for subscriptions
//! - `GET /health` - liveness probe

use std::sync::Arc;

use async_graphql::http::{
    playground_source, GraphQLPlaygroundConfig, WebSocketProtocols, WsMessage,
    ALL_WEBSOCKET_PROTOCOLS,
};
use async_graphql::ErrorExtensions;
use axum::{
    extract::{State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};

use crate::auth::AuthService;
use crate::graphql::LibrisSchema;
use crate::loader::{AuthorFetcher, AuthorLoader, LoaderConfig};
use crate::store::LibraryStore;

/// Shared state for GraphQL routes
#[derive(Clone)]
pub struct GraphQLState {
    pub schema: LibrisSchema,
    pub auth: Arc<AuthService>,
    pub store: Arc<dyn LibraryStore>,
    pub loader_config: LoaderConfig,
}

/// Create the GraphQL router with all endpoints
pub fn create_graphql_router(state: GraphQLState) -> Router {
    Router::new()
        .route(
            "/graphql",
            get(graphql_playground_handler).post(graphql_handler),
        )
        .route("/graphql/ws", get(graphql_ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Handle GraphQL queries and mutations via POST.
///
/// Resolves the caller's identity from the `Authorization` header and
/// attaches it, together with a fresh per-request author loader, to the
/// request before execution. An invalid bearer token fails the whole
/// request up front.
async fn graphql_handler(
    State(state): State<GraphQLState>,
    headers: HeaderMap,
    Json(request): Json<async_graphql::Request>,
) -> Response {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let identity = match state.auth.identify(bearer).await {
        Ok(identity) => identity,
        Err(err) => {
            let server_error = err
                .extend()
                .into_server_error(async_graphql::Pos { line: 0, column: 0 });
            let response = async_graphql::Response::from_errors(vec![server_error]);
            return graphql_json(&response);
        }
    };

    let loader = AuthorLoader::new(
        Arc::new(AuthorFetcher::new(state.store.clone())),
        state.loader_config,
    );

    let mut request = request.data(loader);
    if let Some(identity) = identity {
        request = request.data(identity);
    }

    let response = state.schema.execute(request).await;
    graphql_json(&response)
}

fn graphql_json(response: &async_graphql::Response) -> Response {
    let body = serde_json::to_string(response).unwrap_or_default();
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        body,
    )
        .into_response()
}

/// Serve the GraphQL Playground IDE via GET
async fn graphql_playground_handler() -> impl IntoResponse {
    Html(playground_source(
        GraphQLPlaygroundConfig::new("/graphql").subscription_endpoint("/graphql/ws"),
    ))
}

/// Liveness probe
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Handle WebSocket connections for GraphQL subscriptions.
///
/// Negotiates the graphql-ws sub-protocol and bridges axum's WebSocket to
/// async-graphql's subscription executor.
async fn graphql_ws_handler(
    State(state): State<GraphQLState>,
    ws: WebSocketUpgrade,
) -> Response {
    let protocol = WebSocketProtocols::GraphQLWS;

    ws.protocols(ALL_WEBSOCKET_PROTOCOLS)
        .on_upgrade(move |socket| async move {
            let (mut sink, stream) = socket.split();

            // Convert the axum WS stream into the format async-graphql expects
            let input = stream.filter_map(|msg| async move {
                match msg {
                    Ok(axum::extract::ws::Message::Text(text)) => Some(text.to_string()),
                    _ => None,
                }
            });

            let mut gql_stream = Box::pin(
                async_graphql::http::WebSocket::new(state.schema.clone(), input, protocol)
                    .keepalive_timeout(std::time::Duration::from_secs(30)),
            );

            while let Some(ws_msg) = gql_stream.next().await {
                let axum_msg = match ws_msg {
                    WsMessage::Text(text) => axum::extract::ws::Message::Text(text.into()),
                    WsMessage::Close(code, reason) => {
                        axum::extract::ws::Message::Close(Some(axum::extract::ws::CloseFrame {
                            code,
                            reason: reason.into(),
                        }))
                    }
                };
                if sink.send(axum_msg).await.is_err() {
                    break;
                }
            }
        })
}
