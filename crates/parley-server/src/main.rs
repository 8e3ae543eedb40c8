mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parley_api::AppStateInner;
use parley_core::{DbIdentity, Messaging, MessagingConfig, NotificationSink, SystemClock, WebhookSink};
use parley_db::Database;
use parley_gateway::connection::{self, GatewayContext};
use parley_gateway::dispatcher::Dispatcher;

use crate::config::ServerConfig;

#[derive(Debug, Deserialize)]
struct GatewayParams {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,parley_core=debug,parley_gateway=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    if !config.has_usable_secret() {
        eprintln!("FATAL: PARLEY_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       It must match the secret of the platform issuing tokens.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    let db = Arc::new(Database::open(&config.db_path)?);
    let identity = Arc::new(DbIdentity::new(db.clone()));
    let dispatcher = Dispatcher::new();

    let sink: Arc<dyn NotificationSink> = match &config.notify_webhook {
        Some(url) => {
            info!("Delivering notifications to webhook {}", url);
            Arc::new(WebhookSink::new(url.clone()))
        }
        None => Arc::new(dispatcher.clone()),
    };

    let messaging = Messaging::new(
        db,
        identity.clone(),
        sink,
        Arc::new(SystemClock),
        MessagingConfig {
            edit_window_secs: config.edit_window_secs,
            ..MessagingConfig::default()
        },
    );

    let gateway = GatewayContext {
        dispatcher,
        messaging: messaging.clone(),
        jwt_secret: config.jwt_secret.as_str().into(),
    };

    let api = parley_api::routes(Arc::new(AppStateInner {
        messaging,
        identity,
        jwt_secret: config.jwt_secret.clone(),
    }));

    let ws_route = Router::new().route("/gateway", get(ws_upgrade)).with_state(gateway);

    let app = Router::new()
        .merge(api)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// A `?token=` query authenticates at upgrade time; without one the client
/// must send Identify as its first frame.
async fn ws_upgrade(
    State(ctx): State<GatewayContext>,
    Query(params): Query<GatewayParams>,
    ws: WebSocketUpgrade,
) -> Response {
    match params.token {
        Some(token) => match connection::decode_claims(&token, &ctx.jwt_secret) {
            Some(claims) => ws
                .on_upgrade(move |socket| connection::handle_connection_authenticated(socket, ctx, claims))
                .into_response(),
            None => {
                warn!("Rejected gateway upgrade with invalid token");
                StatusCode::UNAUTHORIZED.into_response()
            }
        },
        None => ws
            .on_upgrade(move |socket| connection::handle_connection(socket, ctx))
            .into_response(),
    }
}
