// region:    --- Imports
use crate::database::DatabaseManager;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use message_broker::KafkaManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Modules
mod auction;
mod bidding;
mod clock;
mod database;
mod error;
mod event_store;
mod fees;
mod handlers;
mod ledger;
mod message_broker;
mod prefs;
mod query;
mod scheduler;
mod transaction;

// endregion: --- Modules

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let db_manager = Arc::new(DatabaseManager::new().await);

    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> database initialization failed: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> database initialized", "Main");

    let kafka_manager = Arc::new(KafkaManager::new());
    if let Err(e) = kafka_manager.initialize().await {
        error!("{:<12} --> Kafka initialization failed: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> Kafka initialized", "Main");

    kafka_manager.create_topic("auction-events", 5, 1).await?;

    let scheduler = scheduler::AuctionScheduler::new(db_manager.get_pool());
    scheduler.start().await;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes_all = Router::new()
        .route(
            "/multi-item-listings/:auction_id/lots/:lot_number/bid",
            post(handlers::handle_bid),
        )
        .route(
            "/multi-item-listings/:auction_id/lots/:lot_number",
            get(handlers::handle_get_lot_by_number),
        )
        .route("/buy-now", post(handlers::handle_buy_now))
        .route(
            "/fees/calculate-buyer-cost",
            get(handlers::handle_calculate_buyer_cost),
        )
        .route("/marketplace/items", get(handlers::handle_marketplace_items))
        .route("/lots/:id", get(handlers::handle_get_lot))
        .route("/lots/:id/bids", get(handlers::handle_get_lot_bids))
        .route(
            "/lots/:id/highest-bid",
            get(handlers::handle_get_highest_bid),
        )
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 20))
        .with_state((db_manager, kafka_manager.get_producer()));

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
