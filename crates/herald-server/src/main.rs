use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade, rejection::QueryRejection},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use herald_api::middleware::{require_auth, verify_token};
use herald_api::{AppState, AppStateInner, auth, conversations, messages, notifications, posts, users};
use herald_db::Database;
use herald_gateway::connection;
use herald_gateway::fanout::Fanout;
use herald_gateway::registry::PresenceRegistry;

/// Development fallback; never rely on it outside local testing.
const PLACEHOLDER_SECRET: &str = "dev-secret-change-me";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("HERALD_JWT_SECRET").unwrap_or_else(|_| PLACEHOLDER_SECRET.into());
    if jwt_secret == PLACEHOLDER_SECRET {
        warn!("HERALD_JWT_SECRET is unset; using the development placeholder");
    }
    let db_path = std::env::var("HERALD_DB_PATH").unwrap_or_else(|_| "herald.db".into());
    let host = std::env::var("HERALD_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("HERALD_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let registry = PresenceRegistry::new();
    let fanout = Fanout::new(db.clone(), registry.clone());

    let state: AppState = Arc::new(AppStateInner {
        db,
        registry,
        fanout,
        jwt_secret,
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/conversations",
            post(conversations::start_conversation).get(conversations::list_conversations),
        )
        .route(
            "/conversations/{conversation_id}",
            get(conversations::get_conversation).delete(conversations::delete_conversation),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            post(messages::send_message).get(messages::read_thread),
        )
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/{notification_id}",
            get(notifications::get_notification).delete(notifications::delete_notification),
        )
        .route("/notifications/{notification_id}/read", post(notifications::mark_read))
        .route("/users/{user_id}", get(users::get_user))
        .route("/users/{user_id}/follow", post(users::toggle_follow))
        .route("/posts", post(posts::create_post))
        .route("/posts/{post_id}", get(posts::get_post))
        .route(
            "/posts/{post_id}/comments",
            post(posts::add_comment).get(posts::list_comments),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(gateway_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Herald listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: String,
}

/// GET /gateway?token=
///
/// The credential is checked before the upgrade, so an unauthenticated
/// socket is refused with 401 instead of being accepted and then
/// dropped.
async fn gateway_upgrade(
    State(state): State<AppState>,
    query: Result<Query<GatewayQuery>, QueryRejection>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let Ok(Query(query)) = query else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    let claims =
        verify_token(&state.jwt_secret, &query.token).map_err(|_| StatusCode::UNAUTHORIZED)?;

    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.registry.clone(),
            state.fanout.clone(),
            claims.sub,
            claims.username,
        )
    }))
}
