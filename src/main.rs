// src/main.rs
use env_logger::{Builder, Env};
use log::{error, info, warn};
use portfolio_tracker::api::{self, Services};
use portfolio_tracker::auth::Credentials;
use portfolio_tracker::config::{Config, StoreBackend};
use portfolio_tracker::db::{self, LotStore, MemoryStore, ScyllaStore, UserStore};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    let (users, lots): (Arc<dyn UserStore>, Arc<dyn LotStore>) = match config.store {
        StoreBackend::Scylla => {
            match ScyllaStore::connect(&config.scylla_node, &config.keyspace).await {
                Ok(store) => db::shared(store),
                Err(e) => {
                    error!("Failed to initialize database: {}", e);
                    return;
                }
            }
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store; data is lost on shutdown.");
            db::shared(MemoryStore::new())
        }
    };

    info!("Starting the portfolio tracker...");
    let services = Services::new(
        users,
        lots,
        Credentials::new(config.jwt_secret.clone(), config.bcrypt_cost),
    );
    let routes = api::routes(services);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutting down.");
    };
    match warp::serve(routes).try_bind_with_graceful_shutdown(config.bind_addr, shutdown) {
        Ok((addr, server)) => {
            info!("Server running on http://{}", addr);
            server.await;
        }
        Err(e) => error!("Failed to bind {}: {}", config.bind_addr, e),
    }
}
