//! End-to-end workflow tests: the bid/buy-now state machine driven over
//! HTTP against an in-process marketplace server backed by the in-memory
//! ledger.

use auction_marketplace_service::clock::AuctionWindow;
use auction_marketplace_service::error::{ServiceError, ServiceResult};
use auction_marketplace_service::fees;
use auction_marketplace_service::ledger::{InMemoryQuantityLedger, LotStock, QuantityLedger};
use auction_marketplace_service::transaction::{
    BidPhase, BidTransaction, ClientError, RejectReason,
};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

const LOT_ID: i64 = 1;
const AUCTION_ID: i64 = 11;
const LOT_NUMBER: i32 = 1;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

// region:    --- Mock Marketplace

struct MockLot {
    current_price: Decimal,
    bid_count: i32,
    quantity: i32,
    buy_now_price: Option<Decimal>,
    end_time: DateTime<Utc>,
    anti_sniping_enabled: bool,
    extension_window_minutes: i64,
    seller_is_business: bool,
}

struct MockMarket {
    lot: Mutex<MockLot>,
    ledger: InMemoryQuantityLedger,
    fees_up: AtomicBool,
}

impl MockMarket {
    async fn new(lot: MockLot, available: i32) -> Arc<Self> {
        let market = Arc::new(Self {
            ledger: InMemoryQuantityLedger::new(),
            fees_up: AtomicBool::new(true),
            lot: Mutex::new(lot),
        });
        let quantity = market.lot.lock().await.quantity;
        market
            .ledger
            .insert_lot(
                LOT_ID,
                LotStock {
                    quantity,
                    available_quantity: available,
                    buy_now_enabled: available > 0,
                    status: "ACTIVE".to_string(),
                },
            )
            .await;
        market
    }

    async fn lot_json(&self) -> Value {
        let lot = self.lot.lock().await;
        let stock = self.ledger.stock_of(LOT_ID).await.unwrap();
        json!({
            "auction_id": AUCTION_ID,
            "lot_number": LOT_NUMBER,
            "current_price": lot.current_price,
            "bid_count": lot.bid_count,
            "quantity": stock.quantity,
            "available_quantity": stock.available_quantity,
            "buy_now_price": lot.buy_now_price,
            "buy_now_enabled": stock.buy_now_enabled,
            "end_time": lot.end_time,
            "seller_is_business": lot.seller_is_business,
            "status": stock.status,
        })
    }

    async fn complete(&self) {
        let stock = self.ledger.stock_of(LOT_ID).await.unwrap();
        self.ledger
            .insert_lot(
                LOT_ID,
                LotStock {
                    status: "COMPLETED".to_string(),
                    buy_now_enabled: false,
                    ..stock
                },
            )
            .await;
    }
}

async fn get_lot(
    State(market): State<Arc<MockMarket>>,
    Path((_auction_id, _lot_number)): Path<(i64, i32)>,
) -> Json<Value> {
    Json(market.lot_json().await)
}

#[derive(Deserialize)]
struct MockBidRequest {
    bidder_id: i64,
    amount: Decimal,
}

async fn post_bid(
    State(market): State<Arc<MockMarket>>,
    Path((_auction_id, _lot_number)): Path<(i64, i32)>,
    Json(req): Json<MockBidRequest>,
) -> ServiceResult<Json<Value>> {
    if req.bidder_id <= 0 {
        return Err(ServiceError::AuthenticationRequired);
    }

    let mut lot = market.lot.lock().await;
    let now = Utc::now();
    let stock = market.ledger.stock_of(LOT_ID).await.unwrap();
    if stock.status != "ACTIVE" || now > lot.end_time {
        drop(lot);
        market.complete().await;
        return Err(ServiceError::AuctionEnded);
    }
    if req.amount <= lot.current_price {
        return Err(ServiceError::StaleAmount {
            current_price: lot.current_price,
        });
    }

    lot.current_price = req.amount;
    lot.bid_count += 1;

    let window = AuctionWindow {
        end_date: lot.end_time,
        anti_sniping_enabled: lot.anti_sniping_enabled,
        extension_window_minutes: lot.extension_window_minutes,
    };
    let extended = window.should_extend(now);
    if extended {
        lot.end_time = window.extended_end(now);
    }

    Ok(Json(json!({
        "message": "bid accepted",
        "lot_id": LOT_ID,
        "current_price": lot.current_price,
        "bid_count": lot.bid_count,
        "end_date": lot.end_time,
        "extended": extended,
    })))
}

#[derive(Deserialize)]
struct MockBuyNowRequest {
    buyer_id: i64,
    quantity: i32,
}

async fn post_buy_now(
    State(market): State<Arc<MockMarket>>,
    Json(req): Json<MockBuyNowRequest>,
) -> ServiceResult<Json<Value>> {
    if req.buyer_id <= 0 {
        return Err(ServiceError::AuthenticationRequired);
    }
    let unit_price = {
        let lot = market.lot.lock().await;
        lot.buy_now_price
            .ok_or_else(|| ServiceError::Validation("no buy now price".to_string()))?
    };
    let purchase = market
        .ledger
        .reserve(LOT_ID, req.buyer_id, req.quantity, unit_price)
        .await?;
    let stock = market.ledger.stock_of(LOT_ID).await.unwrap();

    Ok(Json(json!({
        "message": "purchase pending payment",
        "purchase": purchase,
        "available_quantity": stock.available_quantity,
        "buy_now_enabled": stock.buy_now_enabled,
        "lot_status": stock.status,
    })))
}

#[derive(Deserialize)]
struct MockFeeParams {
    amount: Decimal,
    region: Option<String>,
    seller_is_business: Option<bool>,
}

async fn get_buyer_cost(
    State(market): State<Arc<MockMarket>>,
    Query(params): Query<MockFeeParams>,
) -> ServiceResult<Json<fees::CostBreakdown>> {
    if !market.fees_up.load(Ordering::SeqCst) {
        return Err(ServiceError::Broker("pricing backend offline".to_string()));
    }
    Ok(Json(fees::compute_for_region(
        params.amount,
        params.region.as_deref().unwrap_or(""),
        params.seller_is_business.unwrap_or(true),
    )))
}

async fn serve(market: Arc<MockMarket>) -> String {
    let app = Router::new()
        .route(
            "/multi-item-listings/:auction_id/lots/:lot_number",
            get(get_lot),
        )
        .route(
            "/multi-item-listings/:auction_id/lots/:lot_number/bid",
            post(post_bid),
        )
        .route("/buy-now", post(post_buy_now))
        .route("/fees/calculate-buyer-cost", get(get_buyer_cost))
        .with_state(market);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn default_lot() -> MockLot {
    MockLot {
        current_price: dec("100.00"),
        bid_count: 0,
        quantity: 5,
        buy_now_price: Some(dec("120.00")),
        end_time: Utc::now() + Duration::hours(1),
        anti_sniping_enabled: true,
        extension_window_minutes: 5,
        seller_is_business: true,
    }
}

async fn open_workflow(base_url: &str, region: &str) -> BidTransaction {
    BidTransaction::open(
        reqwest::Client::new(),
        base_url,
        region,
        AUCTION_ID,
        LOT_NUMBER,
    )
    .await
    .expect("workflow should open against a live lot")
}

// endregion: --- Mock Marketplace

// region:    --- Bid Workflow

#[tokio::test]
async fn full_bid_workflow_settles_and_adopts_server_truth() {
    let market = MockMarket::new(default_lot(), 5).await;
    let base_url = serve(Arc::clone(&market)).await;
    let mut workflow = open_workflow(&base_url, "QC").await;

    workflow.draft_bid(dec("150.00")).unwrap();
    workflow.request_pricing().await.unwrap();

    match workflow.phase() {
        BidPhase::PricingReady { pricing, .. } => {
            assert!(!pricing.estimate);
            let expected = fees::compute_for_region(dec("150.00"), "QC", true);
            assert_eq!(pricing.breakdown, expected);
        }
        other => panic!("expected PricingReady, got {other:?}"),
    }

    workflow.confirm().unwrap();
    workflow.submit(7).await.unwrap();

    assert!(matches!(workflow.phase(), BidPhase::Settled { .. }));
    assert_eq!(workflow.lot().current_price, dec("150.00"));
    assert_eq!(workflow.lot().bid_count, 1);
}

#[tokio::test]
async fn submission_without_confirmation_is_refused() {
    let market = MockMarket::new(default_lot(), 5).await;
    let base_url = serve(market).await;
    let mut workflow = open_workflow(&base_url, "QC").await;

    workflow.draft_bid(dec("150.00")).unwrap();
    workflow.request_pricing().await.unwrap();

    let err = workflow.submit(7).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidPhase(_)));
    assert!(matches!(workflow.phase(), BidPhase::PricingReady { .. }));
}

#[tokio::test]
async fn low_draft_is_corrected_in_place_without_a_network_call() {
    let market = MockMarket::new(default_lot(), 5).await;
    let base_url = serve(market).await;
    let mut workflow = open_workflow(&base_url, "QC").await;

    let err = workflow.draft_bid(dec("100.00")).unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert!(matches!(workflow.phase(), BidPhase::Idle));
}

#[tokio::test]
async fn outbid_submission_is_rejected_and_snapshot_refreshed() {
    let market = MockMarket::new(default_lot(), 5).await;
    let base_url = serve(Arc::clone(&market)).await;
    let mut workflow = open_workflow(&base_url, "QC").await;

    workflow.draft_bid(dec("150.00")).unwrap();
    workflow.request_pricing().await.unwrap();
    workflow.confirm().unwrap();

    // A rival lands a higher bid while the confirmation dialog is open.
    market.lot.lock().await.current_price = dec("200.00");

    workflow.submit(7).await.unwrap();

    match workflow.phase() {
        BidPhase::Rejected { reason } => {
            assert_eq!(
                *reason,
                RejectReason::StaleAmount {
                    current_price: dec("200.00")
                }
            );
            assert!(reason.user_message().contains("200"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    // The displayed price is the rival's, not the submitted amount.
    assert_eq!(workflow.lot().current_price, dec("200.00"));
}

#[tokio::test]
async fn late_submission_surfaces_auction_ended() {
    let market = MockMarket::new(default_lot(), 5).await;
    let base_url = serve(Arc::clone(&market)).await;
    let mut workflow = open_workflow(&base_url, "QC").await;

    workflow.draft_bid(dec("150.00")).unwrap();
    workflow.request_pricing().await.unwrap();
    workflow.confirm().unwrap();

    // The clock ran out while the local countdown still showed time.
    market.lot.lock().await.end_time = Utc::now() - Duration::seconds(1);

    workflow.submit(7).await.unwrap();

    assert!(matches!(
        workflow.phase(),
        BidPhase::Rejected {
            reason: RejectReason::AuctionEnded
        }
    ));
    assert!(!workflow.can_bid());
}

#[tokio::test]
async fn anonymous_submission_maps_to_authentication_required() {
    let market = MockMarket::new(default_lot(), 5).await;
    let base_url = serve(market).await;
    let mut workflow = open_workflow(&base_url, "QC").await;

    workflow.draft_bid(dec("150.00")).unwrap();
    workflow.request_pricing().await.unwrap();
    workflow.confirm().unwrap();
    workflow.submit(0).await.unwrap();

    assert!(matches!(
        workflow.phase(),
        BidPhase::Rejected {
            reason: RejectReason::AuthenticationRequired
        }
    ));
}

#[tokio::test]
async fn sniped_bid_extends_the_close_from_acceptance_time() {
    let mut lot = default_lot();
    lot.end_time = Utc::now() + Duration::minutes(2);
    let market = MockMarket::new(lot, 5).await;
    let base_url = serve(market).await;
    let mut workflow = open_workflow(&base_url, "QC").await;

    let original_end = workflow.lot().end_time;

    workflow.draft_bid(dec("150.00")).unwrap();
    workflow.request_pricing().await.unwrap();
    workflow.confirm().unwrap();
    workflow.submit(7).await.unwrap();

    assert!(matches!(workflow.phase(), BidPhase::Settled { .. }));
    // The refreshed close is a full window past acceptance, later than
    // the end date the client subscribed to before bidding.
    assert!(workflow.lot().end_time > original_end);
    assert!(workflow.lot().end_time > Utc::now() + Duration::minutes(4));
}

// endregion: --- Bid Workflow

// region:    --- Pricing

#[tokio::test]
async fn superseded_pricing_response_is_discarded() {
    let market = MockMarket::new(default_lot(), 5).await;
    let base_url = serve(market).await;
    let mut workflow = open_workflow(&base_url, "QC").await;

    workflow.draft_bid(dec("150.00")).unwrap();
    let stale_ticket = workflow.begin_pricing().unwrap();
    let stale_result = workflow.fetch_pricing(stale_ticket).await;

    // The user types a new amount before the old response lands.
    workflow.draft_bid(dec("180.00")).unwrap();
    workflow.apply_pricing(stale_ticket, stale_result);

    // The stale breakdown must not attach to the newer draft.
    match workflow.phase() {
        BidPhase::Drafting { amount, .. } => assert_eq!(*amount, dec("180.00")),
        other => panic!("expected Drafting, got {other:?}"),
    }

    workflow.request_pricing().await.unwrap();
    match workflow.phase() {
        BidPhase::PricingReady { amount, pricing, .. } => {
            assert_eq!(*amount, dec("180.00"));
            assert_eq!(pricing.breakdown.hammer_price, dec("180.00"));
        }
        other => panic!("expected PricingReady, got {other:?}"),
    }
}

#[tokio::test]
async fn offline_pricing_falls_back_to_a_flagged_estimate() {
    let market = MockMarket::new(default_lot(), 5).await;
    market.fees_up.store(false, Ordering::SeqCst);
    let base_url = serve(Arc::clone(&market)).await;
    // Ontario rates differ from the hardcoded default, so the authoritative
    // figure will disagree with the estimate.
    let mut workflow = open_workflow(&base_url, "ON").await;

    workflow.draft_bid(dec("150.00")).unwrap();
    workflow.request_pricing().await.unwrap();

    match workflow.phase() {
        BidPhase::PricingReady { pricing, .. } => {
            assert!(pricing.estimate, "offline pricing must be flagged");
            let expected = fees::compute(
                dec("150.00"),
                fees::PLATFORM_PREMIUM_RATE,
                fees::DEFAULT_TAX_RATE,
                true,
            );
            assert_eq!(pricing.breakdown, expected);
        }
        other => panic!("expected PricingReady, got {other:?}"),
    }

    workflow.confirm().unwrap();

    // Still offline: the estimate is not a valid submission basis.
    let err = workflow.submit(7).await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)));
    assert!(matches!(
        workflow.phase(),
        BidPhase::AwaitingConfirmation { .. }
    ));

    // Back online: the authoritative figure replaces the estimate, and
    // because it moved, the user must re-confirm.
    market.fees_up.store(true, Ordering::SeqCst);
    let err = workflow.submit(7).await.unwrap_err();
    assert!(matches!(err, ClientError::EstimateRevised));
    match workflow.phase() {
        BidPhase::PricingReady { pricing, .. } => {
            assert!(!pricing.estimate);
            let expected = fees::compute_for_region(dec("150.00"), "ON", true);
            assert_eq!(pricing.breakdown, expected);
        }
        other => panic!("expected PricingReady, got {other:?}"),
    }

    workflow.confirm().unwrap();
    workflow.submit(7).await.unwrap();
    assert!(matches!(workflow.phase(), BidPhase::Settled { .. }));
}

// endregion: --- Pricing

// region:    --- Buy Now

#[tokio::test]
async fn buy_now_workflow_settles_and_decrements_stock() {
    let market = MockMarket::new(default_lot(), 5).await;
    let base_url = serve(Arc::clone(&market)).await;
    let mut workflow = open_workflow(&base_url, "QC").await;

    workflow.draft_buy_now(2).unwrap();
    workflow.request_pricing().await.unwrap();
    match workflow.phase() {
        BidPhase::PricingReady { amount, .. } => assert_eq!(*amount, dec("240.00")),
        other => panic!("expected PricingReady, got {other:?}"),
    }
    workflow.confirm().unwrap();
    workflow.submit(9).await.unwrap();

    assert!(matches!(workflow.phase(), BidPhase::Settled { .. }));
    assert_eq!(workflow.lot().available_quantity, 3);
    assert!(workflow.lot().buy_now_enabled);
    assert_eq!(
        market
            .ledger
            .stock_of(LOT_ID)
            .await
            .unwrap()
            .available_quantity,
        3
    );
}

#[tokio::test]
async fn oversized_buy_now_reclamps_from_the_rejection_and_retries() {
    let market = MockMarket::new(default_lot(), 5).await;
    let base_url = serve(Arc::clone(&market)).await;
    let mut workflow = open_workflow(&base_url, "QC").await;

    // Another buyer takes three units after our snapshot was rendered.
    market
        .ledger
        .reserve(LOT_ID, 99, 3, dec("120.00"))
        .await
        .unwrap();

    // The stale snapshot still allows a draft for three.
    workflow.draft_buy_now(3).unwrap();
    workflow.request_pricing().await.unwrap();
    workflow.confirm().unwrap();
    workflow.submit(9).await.unwrap();

    match workflow.phase() {
        BidPhase::Rejected { reason } => assert_eq!(
            *reason,
            RejectReason::InsufficientQuantity {
                available_quantity: 2
            }
        ),
        other => panic!("expected Rejected, got {other:?}"),
    }
    // Nothing moved, and the snapshot now shows the real stock.
    assert_eq!(workflow.lot().available_quantity, 2);
    assert_eq!(workflow.max_buy_now_quantity(), 2);

    // Retry clamped to the refreshed maximum: takes the final units.
    workflow.draft_buy_now(workflow.max_buy_now_quantity()).unwrap();
    workflow.request_pricing().await.unwrap();
    workflow.confirm().unwrap();
    workflow.submit(9).await.unwrap();

    assert!(matches!(workflow.phase(), BidPhase::Settled { .. }));
    assert_eq!(workflow.lot().available_quantity, 0);
    assert!(!workflow.lot().buy_now_enabled);
    assert_eq!(workflow.lot().status, "COMPLETED");
}

#[tokio::test]
async fn racing_buyers_cannot_both_take_the_same_units() {
    let market = MockMarket::new(default_lot(), 5).await;
    let base_url = serve(Arc::clone(&market)).await;

    let mut first = open_workflow(&base_url, "QC").await;
    let mut second = open_workflow(&base_url, "QC").await;

    // Both drafted three of five against the same rendered snapshot.
    for workflow in [&mut first, &mut second] {
        workflow.draft_buy_now(3).unwrap();
        workflow.request_pricing().await.unwrap();
        workflow.confirm().unwrap();
    }

    first.submit(1).await.unwrap();
    second.submit(2).await.unwrap();

    assert!(matches!(first.phase(), BidPhase::Settled { .. }));
    assert!(matches!(
        second.phase(),
        BidPhase::Rejected {
            reason: RejectReason::InsufficientQuantity {
                available_quantity: 2
            }
        }
    ));
    assert_eq!(
        market
            .ledger
            .stock_of(LOT_ID)
            .await
            .unwrap()
            .available_quantity,
        2
    );
}

// endregion: --- Buy Now
