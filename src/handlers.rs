// region:    --- Imports
use crate::bidding::commands::{
    handle_buy_now as command_handle_buy_now, handle_place_bid, BuyNowCommand, PlaceBidCommand,
};
use crate::database::DatabaseManager;
use crate::error::{ServiceError, ServiceResult};
use crate::event_store::PostgresEventStore;
use crate::fees;
use crate::ledger::PostgresQuantityLedger;
use crate::message_broker::KafkaProducer;
use crate::query;
use axum::extract::{Path, Query, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

// endregion: --- Imports

pub type AppState = (Arc<DatabaseManager>, Arc<KafkaProducer>);

// region:    --- Command Handlers

#[derive(Debug, Deserialize)]
pub struct BidRequest {
    pub bidder_id: i64,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct BidResponse {
    pub message: String,
    pub lot_id: i64,
    pub current_price: Decimal,
    pub bid_count: i32,
    pub end_date: chrono::DateTime<chrono::Utc>,
    pub extended: bool,
}

/// Accept a bid on a lot of a multi-item listing.
pub async fn handle_bid(
    State((db_manager, kafka_producer)): State<AppState>,
    Path((auction_id, lot_number)): Path<(i64, i32)>,
    Json(req): Json<BidRequest>,
) -> ServiceResult<Json<BidResponse>> {
    info!(
        "{:<12} --> bid request: auction {} lot {} amount {}",
        "Command", auction_id, lot_number, req.amount
    );

    let event_store = PostgresEventStore::new(Arc::clone(&kafka_producer));
    let lot = query::handlers::get_lot_by_number(&db_manager, auction_id, lot_number).await?;

    // Cheap gate before the command does the authoritative check.
    if req.amount <= lot.current_price {
        return Err(ServiceError::StaleAmount {
            current_price: lot.current_price,
        });
    }

    let cmd = PlaceBidCommand {
        lot_id: lot.id,
        bidder_id: req.bidder_id,
        amount: req.amount,
    };
    let outcome = handle_place_bid(cmd, &event_store, &db_manager).await?;

    Ok(Json(BidResponse {
        message: "bid accepted".to_string(),
        lot_id: outcome.lot.id,
        current_price: outcome.lot.current_price,
        bid_count: outcome.lot.bid_count,
        end_date: outcome.lot.end_time,
        extended: outcome.extended,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BuyNowRequest {
    pub auction_id: i64,
    pub lot_number: i32,
    pub buyer_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct BuyNowResponse {
    pub message: String,
    pub purchase: crate::bidding::model::Purchase,
    pub available_quantity: i32,
    pub buy_now_enabled: bool,
    pub lot_status: String,
}

/// Claim units from a lot's remaining stock at the Buy Now price.
pub async fn handle_buy_now(
    State((db_manager, kafka_producer)): State<AppState>,
    Json(req): Json<BuyNowRequest>,
) -> ServiceResult<Json<BuyNowResponse>> {
    info!("{:<12} --> buy now request: {:?}", "Command", req);

    let event_store = PostgresEventStore::new(Arc::clone(&kafka_producer));
    let ledger = PostgresQuantityLedger::new(db_manager.get_pool());
    let lot = query::handlers::get_lot_by_number(&db_manager, req.auction_id, req.lot_number)
        .await?;

    let cmd = BuyNowCommand {
        lot_id: lot.id,
        buyer_id: req.buyer_id,
        quantity: req.quantity,
    };
    let outcome = command_handle_buy_now(cmd, &ledger, &event_store, &db_manager).await?;

    Ok(Json(BuyNowResponse {
        message: "purchase pending payment".to_string(),
        purchase: outcome.purchase,
        available_quantity: outcome.lot.available_quantity,
        buy_now_enabled: outcome.lot.buy_now_enabled,
        lot_status: outcome.lot.status,
    }))
}

// endregion: --- Command Handlers

// region:    --- Fee Handler

#[derive(Debug, Deserialize)]
pub struct BuyerCostParams {
    pub amount: Decimal,
    pub region: Option<String>,
    pub seller_is_business: Option<bool>,
}

/// Itemized buyer cost for a hammer price, region, and seller type.
pub async fn handle_calculate_buyer_cost(
    Query(params): Query<BuyerCostParams>,
) -> ServiceResult<Json<fees::CostBreakdown>> {
    info!(
        "{:<12} --> buyer cost: amount {} region {:?}",
        "Fees", params.amount, params.region
    );

    if params.amount < Decimal::ZERO {
        return Err(ServiceError::Validation(
            "amount must not be negative".to_string(),
        ));
    }

    let breakdown = fees::compute_for_region(
        params.amount,
        params.region.as_deref().unwrap_or(""),
        params.seller_is_business.unwrap_or(true),
    );
    Ok(Json(breakdown))
}

// endregion: --- Fee Handler

// region:    --- Query Handlers

/// Browse active marketplace lots with filters and pagination.
pub async fn handle_marketplace_items(
    State((db_manager, _)): State<AppState>,
    Query(params): Query<query::handlers::BrowseParams>,
) -> ServiceResult<Json<query::handlers::BrowsePage>> {
    info!("{:<12} --> marketplace items", "HandlerQuery");
    let page = query::handlers::browse_marketplace(&db_manager, &params).await?;
    Ok(Json(page))
}

/// Lot state by auction and lot number.
pub async fn handle_get_lot_by_number(
    State((db_manager, _)): State<AppState>,
    Path((auction_id, lot_number)): Path<(i64, i32)>,
) -> ServiceResult<Json<crate::bidding::model::Lot>> {
    info!(
        "{:<12} --> lot state: auction {} lot {}",
        "HandlerQuery", auction_id, lot_number
    );
    let lot = query::handlers::get_lot_by_number(&db_manager, auction_id, lot_number).await?;
    Ok(Json(lot))
}

/// Lot state by internal id.
pub async fn handle_get_lot(
    State((db_manager, _)): State<AppState>,
    Path(lot_id): Path<i64>,
) -> ServiceResult<Json<crate::bidding::model::Lot>> {
    info!("{:<12} --> lot state id: {}", "HandlerQuery", lot_id);
    let lot = query::handlers::get_lot(&db_manager, lot_id).await?;
    Ok(Json(lot))
}

/// Bid history for a lot, newest first.
pub async fn handle_get_lot_bids(
    State((db_manager, _)): State<AppState>,
    Path(lot_id): Path<i64>,
) -> ServiceResult<Json<Vec<crate::bidding::model::Bid>>> {
    info!("{:<12} --> lot bids id: {}", "HandlerQuery", lot_id);
    let bids = query::handlers::get_bid_history(&db_manager, lot_id).await?;
    Ok(Json(bids))
}

/// Highest accepted bid for a lot.
pub async fn handle_get_highest_bid(
    State((db_manager, _)): State<AppState>,
    Path(lot_id): Path<i64>,
) -> ServiceResult<Json<serde_json::Value>> {
    info!("{:<12} --> highest bid id: {}", "HandlerQuery", lot_id);
    let highest = query::handlers::get_highest_bid(&db_manager, lot_id).await?;
    Ok(Json(serde_json::json!({ "highest_bid": highest })))
}

// endregion: --- Query Handlers
