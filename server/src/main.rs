use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use relay_server::config::{generate_config_template, Config};
use relay_server::directory::SqliteStore;
use relay_server::push::{HttpPushSender, LogPushSender, PushSender};
use relay_server::state::{AppState, Collaborators};
use relay_server::{db, routes};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relay_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("Relay server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = db::init_db(&config.data_dir)?;

    let push_config = config.push_config();
    let push: Arc<dyn PushSender> = if push_config.enabled && !push_config.gateway_url.is_empty() {
        tracing::info!(gateway = %push_config.gateway_url, "Push fallback enabled");
        Arc::new(HttpPushSender::new(push_config.gateway_url.clone()))
    } else {
        tracing::info!("Push fallback disabled, notifications will only be logged");
        Arc::new(LogPushSender)
    };

    let app_state = AppState::new(
        Collaborators::from_store(SqliteStore::new(db), push),
        config.keepalive(),
        push_config.preview_max_chars,
    );

    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
