//! REST handlers for Herald. Route wiring lives in herald-server; the
//! handlers here are thin translations between HTTP and the stores, with
//! fan-out kicked off after the durable write lands.

pub mod auth;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod users;

use std::sync::Arc;

use herald_db::Database;
use herald_gateway::fanout::Fanout;
use herald_gateway::registry::PresenceRegistry;

pub type AppState = Arc<AppStateInner>;

/// State shared by every handler and the gateway upgrade.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub registry: PresenceRegistry,
    pub fanout: Fanout,
    pub jwt_secret: String,
}
