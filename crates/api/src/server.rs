//! HTTP server: GraphQL, REST and health endpoints.

use std::future::Future;
use std::sync::Arc;

use async_graphql::ServerError;
use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Router,
    extract::State,
    http::HeaderMap,
    response::{Html, IntoResponse},
    routing::get,
};
use tracing::{debug, info};

use vellum_core::services::ListingService;

use crate::rest::list_contents;
use crate::types::{VellumSchema, user_id_from_headers};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_playground: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            enable_playground: true,
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub schema: VellumSchema,
    pub service: Arc<ListingService>,
}

/// Build the application router.
pub fn router(state: AppState, enable_playground: bool) -> Router {
    let mut app = Router::new()
        .route("/graphql", get(graphql_playground).post(graphql_handler))
        .route("/contents", get(list_contents))
        .route("/health", get(health_check));

    if enable_playground {
        app = app.route("/", get(graphql_playground));
    }

    app.with_state(state)
}

/// Start the server with graceful shutdown support.
pub async fn serve_with_shutdown<F>(
    state: AppState,
    config: ServerConfig,
    shutdown_signal: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state, config.enable_playground);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("⚡ Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
}

/// GraphQL query handler. The caller identity travels as request data.
async fn graphql_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let mut request = req.into_inner();
    match user_id_from_headers(&headers) {
        Ok(Some(user_id)) => request = request.data(user_id),
        Ok(None) => {}
        Err(e) => {
            debug!(error = %e, "Rejected GraphQL request identity");
            return async_graphql::Response::from_errors(vec![ServerError::new(e.to_string(), None)])
                .into();
        }
    }
    state.schema.execute(request).await.into()
}

/// GraphQL Playground UI.
async fn graphql_playground() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
