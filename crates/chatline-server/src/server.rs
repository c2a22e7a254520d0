use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use chatline_core::provider::Generator;
use chatline_store::{ChatRepo, Database, UserRepo};

use crate::handlers;

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful, knowledgeable assistant. \
Keep answers concise and use Markdown formatting where it helps readability. \
When answering coding questions, explain the code clearly.";

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Sent with every generation request. `None` disables it.
    pub system_instruction: Option<String>,
    /// Limit on producing response headers. Streaming bodies are not cut off.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            system_instruction: Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            request_timeout_secs: 120,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub chats: ChatRepo,
    pub users: UserRepo,
    pub generator: Arc<dyn Generator>,
    pub system_instruction: Option<String>,
}

impl AppState {
    pub fn new(db: Database, generator: Arc<dyn Generator>, system_instruction: Option<String>) -> Self {
        Self {
            chats: ChatRepo::new(db.clone()),
            users: UserRepo::new(db),
            generator,
            system_instruction,
        }
    }
}

pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let api = Router::new()
        .route("/login", post(handlers::login))
        .route("/chats", get(handlers::list_chats).post(handlers::save_chat))
        .route("/chats/{id}", get(handlers::get_chat).delete(handlers::delete_chat))
        .route("/generate", post(handlers::generate));

    Router::new()
        .nest("/api", api)
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve in the background. Port 0 picks a free port.
pub async fn start(
    config: ServerConfig,
    db: Database,
    generator: Arc<dyn Generator>,
) -> Result<ServerHandle, std::io::Error> {
    let model = generator.model().to_string();
    let state = AppState::new(db, generator, config.system_instruction.clone());
    let router = build_router(state, Duration::from_secs(config.request_timeout_secs));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, model = %model, "chatline server started");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        server,
    })
}

/// Handle returned by [`start`]. Dropping it leaves the server running.
pub struct ServerHandle {
    pub port: u16,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Base URL of the `/api` routes on the loopback interface.
    pub fn api_url(&self) -> String {
        format!("http://127.0.0.1:{}/api", self.port)
    }

    pub fn abort(&self) {
        self.server.abort();
    }
}
