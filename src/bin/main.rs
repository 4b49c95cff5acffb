use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use flock::config::Config;
use flock::core::db;
use flock::core::logging::RequestLog;
use flock::routes;
use flock::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env().context("failed to load configuration")?;
    let store = db::connect(&config).await?;
    let media = db::connect_media(&config);
    let state = AppState::from_config(&config, store.clone(), media);

    if config.seed_demo_data {
        db::seed_demo_data(&state).await.context("failed to seed demo data")?;
    }

    let addr = ("0.0.0.0", config.server_port);
    info!(port = config.server_port, development = config.development, "Server listening");

    let data = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(RequestLog)
            .configure(routes::configure)
    })
    .bind(addr)
    .with_context(|| format!("failed to bind port {}", config.server_port))?
    .run()
    .await
    .context("server error")?;

    if let Err(e) = store.disconnect().await {
        error!(error = %e, "Failed to disconnect store");
    }
    info!("Server stopped");
    Ok(())
}
