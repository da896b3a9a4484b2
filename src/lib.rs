pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod jwt;
pub mod mailer;
pub mod password;
pub mod service;

use api::{ApiState, create_api_router};
use auth::{Gate, GateConfig};
use axum::{Router, middleware};
use config::TokenPolicy;
use db::{
    Database, IdentityRepository, MemoryStore, PasswordResetTokenRepository, SessionRepository,
    UserRepository,
};
use jwt::TokenAuthenticator;
use mailer::Mailer;
use service::{PasswordResetService, SessionService};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

/// Everything the router needs besides storage and mail.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Issuer, secrets and lifetimes for every token purpose
    pub policy: TokenPolicy,
    /// Page that receives the reset token as `?token=`
    pub reset_url: Url,
    /// Deadline applied to every gated call, None for no deadline
    pub request_timeout: Option<Duration>,
    /// Exempt methods and per-method token purposes
    pub gate: GateConfig,
}

/// Storage and mail collaborators shared by the services.
#[derive(Clone)]
pub struct Backends {
    pub users: Arc<dyn UserRepository>,
    pub identities: Arc<dyn IdentityRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub reset_tokens: Arc<dyn PasswordResetTokenRepository>,
    pub mailer: Arc<dyn Mailer>,
}

impl Backends {
    pub fn sqlite(db: &Database, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            users: Arc::new(db.users()),
            identities: Arc::new(db.identities()),
            sessions: Arc::new(db.sessions()),
            reset_tokens: Arc::new(db.reset_tokens()),
            mailer,
        }
    }

    pub fn memory(store: &MemoryStore, mailer: Arc<dyn Mailer>) -> Self {
        let shared = Arc::new(store.clone());
        Self {
            users: shared.clone(),
            identities: shared.clone(),
            sessions: shared.clone(),
            reset_tokens: shared,
            mailer,
        }
    }
}

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    pub app: AppConfig,
    /// Outbound mail transport for reset links
    pub mailer: Arc<dyn Mailer>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &AppConfig, backends: Backends) -> Router {
    password::prepare_dummy_hash();

    let issuer = config.policy.issuer();
    // Tokens are minted for and accepted by this service only
    let authenticator = TokenAuthenticator::new(issuer, issuer);
    let policy = Arc::new(config.policy.clone());

    let sessions = SessionService::new(
        backends.users.clone(),
        backends.identities,
        backends.sessions,
        authenticator.clone(),
        policy.clone(),
    );
    let resets = PasswordResetService::new(
        backends.users,
        backends.reset_tokens,
        backends.mailer,
        authenticator.clone(),
        policy.clone(),
        config.reset_url.clone(),
    );

    let gate = Gate::new(
        config.gate.clone(),
        authenticator,
        policy,
        config.request_timeout,
    );

    create_api_router(ApiState { sessions, resets })
        .layer(middleware::from_fn_with_state(gate, auth::authorize))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(
        &config.app,
        Backends::sqlite(&config.db, config.mailer.clone()),
    );
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    // Run cleanup tasks on startup
    init_cleanup(&config.db).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    Ok((handle, local_addr))
}
