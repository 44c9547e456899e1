use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use tracing::info;

use perch::handlers::{self, AppState};
use perch::{Config, Perch, RedisStore, Store};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "perch=info,actix_web=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let store = match &config.redis_url {
        Some(url) => Store::new(Arc::new(RedisStore::connect(url).await?), config.store_timeout),
        None => {
            info!("PERCH_REDIS_URL not set, using in-memory store");
            Store::memory(config.store_timeout)
        }
    };

    let state = web::Data::new(AppState {
        perch: Perch::new(store, &config),
        secure_cookies: config.secure_cookies,
    });

    let addr = (config.host.clone(), config.port);
    info!("perch listening on {}:{}", addr.0, addr.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(handlers::configure)
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}
