use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, patch, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use drafter_api::google::GoogleVerifier;
use drafter_api::middleware::require_auth;
use drafter_api::state::{AppState, AppStateInner, AuthConfig, ConversationLocks};
use drafter_api::{auth, chat, conversations, generate};
use drafter_llm::{CompletionConfig, CompletionService};

/// Everything the server reads from the environment, loaded once at startup.
struct Config {
    jwt_secret: String,
    db_path: String,
    host: String,
    port: u16,
    cors_origins: String,
    completion: CompletionConfig,
    google_client_id: String,
    default_profile_image: String,
    access_token_minutes: i64,
    refresh_token_days: i64,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            warn!("OPENAI_API_KEY is not set; completion calls will fail");
        }
        let mut completion = CompletionConfig::new(api_key);
        completion.model = env_or("OPENAI_MODEL", "gpt-4o");
        completion.temperature = env_or("OPENAI_TEMPERATURE", "0.7").parse()?;
        completion.max_tokens = env_or("OPENAI_MAX_TOKENS", "1000").parse()?;
        completion.timeout = Duration::from_secs(env_or("OPENAI_TIMEOUT_SECS", "60").parse()?);

        Ok(Config {
            jwt_secret: env_or("DRAFTER_JWT_SECRET", "dev-secret-change-me"),
            db_path: env_or("DRAFTER_DB_PATH", "drafter.db"),
            host: env_or("DRAFTER_HOST", "0.0.0.0"),
            port: env_or("DRAFTER_PORT", "3000").parse()?,
            cors_origins: env_or("DRAFTER_CORS_ORIGINS", "*"),
            completion,
            google_client_id: env_or("GOOGLE_CLIENT_ID", ""),
            default_profile_image: env_or(
                "DEFAULT_PROFILE_IMAGE",
                "https://www.gravatar.com/avatar/?d=mp",
            ),
            access_token_minutes: env_or("ACCESS_TOKEN_EXPIRE_MINUTES", "30").parse()?,
            refresh_token_days: env_or("REFRESH_TOKEN_EXPIRE_DAYS", "7").parse()?,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drafter=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = drafter_db::Database::open(&PathBuf::from(&config.db_path))?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        llm: CompletionService::new(config.completion),
        google: GoogleVerifier::new(config.google_client_id)?,
        auth: AuthConfig {
            jwt_secret: config.jwt_secret,
            access_token_minutes: config.access_token_minutes,
            refresh_token_days: config.refresh_token_days,
            default_profile_image: config.default_profile_image,
        },
        conversation_locks: ConversationLocks::default(),
    });

    // Routes
    let public_routes = Router::new()
        .route("/v1/auth/register", post(auth::register))
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/auth/refresh", post(auth::refresh))
        .route("/v1/auth/google", post(auth::google_auth))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/v1/chat", post(chat::chat))
        .route("/v1/chat/{conversation_id}/query/{query_id}", patch(chat::update_query))
        .route("/v1/conversations", post(conversations::create_conversation))
        .route("/v1/conversations", get(conversations::list_conversations))
        .route("/v1/conversations/{id}", get(conversations::get_conversation))
        .route("/v1/conversations/{id}", delete(conversations::delete_conversation))
        .route("/v1/conversations/{id}/queries", post(conversations::append_query))
        .route("/v1/generate", post(generate::generate))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Drafter server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn cors_layer(origins: &str) -> anyhow::Result<CorsLayer> {
    if origins.trim() == "*" {
        return Ok(CorsLayer::permissive());
    }

    let parsed = origins
        .split(',')
        .map(|origin| origin.trim().parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any))
}
