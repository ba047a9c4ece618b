/// Bid and Buy Now command handling.
/// All serialization happens in the database: a bid only lands through a
/// conditional update guarded on `current_price`, and stock only moves
/// through the ledger's compare-and-decrement. Whatever the caller saw on
/// screen is treated as a stale cache.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::bidding::model::{Lot, Purchase, STATUS_ACTIVE, STATUS_COMPLETED, STATUS_SCHEDULED};
use crate::clock::AuctionWindow;
use crate::database::DatabaseManager;
use crate::error::{ServiceError, ServiceResult};
use crate::event_store::{Event, EventStore};
use crate::ledger::QuantityLedger;
use crate::query::handlers;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Commands

/// Place a bid on a lot.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaceBidCommand {
    pub lot_id: i64,
    pub bidder_id: i64,
    pub amount: Decimal,
}

/// Claim units from a lot's remaining stock at the Buy Now price.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BuyNowCommand {
    pub lot_id: i64,
    pub buyer_id: i64,
    pub quantity: i32,
}

/// Accepted bid, with the refreshed lot the caller must adopt.
#[derive(Debug, Serialize)]
pub struct BidOutcome {
    pub lot: Lot,
    pub extended: bool,
}

/// Accepted purchase, with the refreshed lot the caller must adopt.
#[derive(Debug, Serialize)]
pub struct BuyNowOutcome {
    pub purchase: Purchase,
    pub lot: Lot,
}

const MAX_RETRIES: i32 = 100;

// endregion: --- Commands

// region:    --- Validation

fn sniping_window(lot: &Lot) -> AuctionWindow {
    AuctionWindow {
        end_date: lot.end_time,
        anti_sniping_enabled: lot.anti_sniping_enabled,
        extension_window_minutes: lot.extension_window_minutes as i64,
    }
}

/// Shared status/time ladder for both commands.
fn check_lot_open(lot: &Lot, now: DateTime<Utc>) -> ServiceResult<()> {
    if now < lot.start_time || lot.status == STATUS_SCHEDULED {
        return Err(ServiceError::AuctionNotStarted);
    }
    if lot.status == STATUS_COMPLETED || now > lot.end_time {
        return Err(ServiceError::AuctionEnded);
    }
    if lot.status != STATUS_ACTIVE {
        return Err(ServiceError::Validation(format!(
            "lot is not biddable in status {}",
            lot.status
        )));
    }
    Ok(())
}

// endregion: --- Validation

// region:    --- Place Bid

/// Accept a bid.
///
/// The price guard (`current_price < amount`) is the authoritative race
/// arbiter: whoever commits first wins, and a losing bid maps to
/// `StaleAmount` carrying the price that beat it. A bid accepted inside
/// the anti-sniping window resets the close to `now + window` in the same
/// transaction, so there is no instant where the bid landed but the
/// extension did not.
pub async fn handle_place_bid(
    cmd: PlaceBidCommand,
    event_store: &impl EventStore,
    db_manager: &DatabaseManager,
) -> ServiceResult<BidOutcome> {
    info!("{:<12} --> placing bid: {:?}", "Command", cmd);

    if cmd.bidder_id <= 0 {
        return Err(ServiceError::AuthenticationRequired);
    }
    if cmd.amount <= Decimal::ZERO {
        return Err(ServiceError::Validation(
            "bid amount must be positive".to_string(),
        ));
    }

    let mut retries = 0;
    while retries < MAX_RETRIES {
        let lot = handlers::get_lot(db_manager, cmd.lot_id).await?;
        let now = Utc::now();

        check_lot_open(&lot, now)?;

        if cmd.amount <= lot.current_price {
            return Err(ServiceError::StaleAmount {
                current_price: lot.current_price,
            });
        }

        let window = sniping_window(&lot);
        let extended_end = if window.should_extend(now) {
            Some(window.extended_end(now))
        } else {
            None
        };

        let mut tx = db_manager.pool().begin().await?;

        let updated = sqlx::query_as::<_, Lot>(
            "UPDATE lots
             SET current_price = $2,
                 bid_count = bid_count + 1,
                 end_time = COALESCE($3, end_time)
             WHERE id = $1 AND status = 'ACTIVE' AND current_price < $2
             RETURNING *",
        )
        .bind(cmd.lot_id)
        .bind(cmd.amount)
        .bind(extended_end)
        .fetch_optional(&mut *tx)
        .await?;

        let updated = match updated {
            Some(updated) => updated,
            None => {
                // Guard lost between the read and the update.
                tx.rollback().await?;
                let fresh = handlers::get_lot(db_manager, cmd.lot_id).await?;
                let now = Utc::now();
                if fresh.status != STATUS_ACTIVE || now > fresh.end_time {
                    return Err(ServiceError::AuctionEnded);
                }
                if cmd.amount <= fresh.current_price {
                    return Err(ServiceError::StaleAmount {
                        current_price: fresh.current_price,
                    });
                }
                // The guard should have held; re-run against fresh state.
                warn!(
                    "{:<12} --> bid guard miss on lot {}, retry {}",
                    "Command", cmd.lot_id, retries
                );
                retries += 1;
                continue;
            }
        };

        sqlx::query("INSERT INTO bids (lot_id, bidder_id, amount, bid_time) VALUES ($1, $2, $3, $4)")
            .bind(cmd.lot_id)
            .bind(cmd.bidder_id)
            .bind(cmd.amount)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let mut events: Vec<Event> = Vec::with_capacity(2);
        let bid_event = AuctionEvent::BidPlaced {
            lot_id: cmd.lot_id,
            bidder_id: cmd.bidder_id,
            amount: cmd.amount,
            timestamp: now,
        };
        events.push(
            event_store
                .append_in_tx(
                    &mut tx,
                    cmd.lot_id,
                    "BidPlaced",
                    serde_json::to_value(&bid_event)?,
                    now,
                )
                .await?,
        );

        if let Some(new_end_time) = extended_end {
            let extension_event = AuctionEvent::EndTimeExtended {
                lot_id: cmd.lot_id,
                new_end_time,
                timestamp: now,
            };
            events.push(
                event_store
                    .append_in_tx(
                        &mut tx,
                        cmd.lot_id,
                        "EndTimeExtended",
                        serde_json::to_value(&extension_event)?,
                        now,
                    )
                    .await?,
            );
        }

        tx.commit().await?;

        publish_committed(event_store, &events).await;

        info!(
            "{:<12} --> bid accepted on lot {} at {}, extended: {}",
            "Command",
            cmd.lot_id,
            cmd.amount,
            extended_end.is_some()
        );

        return Ok(BidOutcome {
            lot: updated,
            extended: extended_end.is_some(),
        });
    }

    Err(ServiceError::MaxRetriesExceeded)
}

// endregion: --- Place Bid

// region:    --- Buy Now

/// Claim units at the Buy Now price.
///
/// Stock movement is delegated entirely to the ledger; this command never
/// reads-then-writes `available_quantity`. The refreshed lot in the
/// outcome reflects the post-reservation truth, including the disabled
/// Buy Now control when the final units sold.
pub async fn handle_buy_now(
    cmd: BuyNowCommand,
    ledger: &impl QuantityLedger,
    event_store: &impl EventStore,
    db_manager: &DatabaseManager,
) -> ServiceResult<BuyNowOutcome> {
    info!("{:<12} --> buy now: {:?}", "Command", cmd);

    if cmd.buyer_id <= 0 {
        return Err(ServiceError::AuthenticationRequired);
    }
    if cmd.quantity < 1 {
        return Err(ServiceError::Validation(
            "quantity must be at least 1".to_string(),
        ));
    }

    let lot = handlers::get_lot(db_manager, cmd.lot_id).await?;
    let now = Utc::now();

    check_lot_open(&lot, now)?;

    if !lot.buy_now_enabled {
        return Err(ServiceError::Validation(
            "buy now is not available for this lot".to_string(),
        ));
    }
    let unit_price = lot.buy_now_price.ok_or_else(|| {
        ServiceError::Validation("lot has no buy now price".to_string())
    })?;

    let purchase = ledger
        .reserve(cmd.lot_id, cmd.buyer_id, cmd.quantity, unit_price)
        .await?;

    let event = AuctionEvent::BuyNowExecuted {
        lot_id: cmd.lot_id,
        buyer_id: cmd.buyer_id,
        quantity: cmd.quantity,
        unit_price,
        total_amount: purchase.total_amount,
        timestamp: now,
    };
    append_after_commit(event_store, db_manager, cmd.lot_id, "BuyNowExecuted", &event, now)
        .await?;

    let lot = handlers::get_lot(db_manager, cmd.lot_id).await?;

    info!(
        "{:<12} --> buy now accepted on lot {}: {} unit(s), {} remaining",
        "Command", cmd.lot_id, cmd.quantity, lot.available_quantity
    );

    Ok(BuyNowOutcome { purchase, lot })
}

// endregion: --- Buy Now

// region:    --- Event Helpers

/// Append an event outside any caller transaction, retrying version
/// allocation races, then publish.
async fn append_after_commit(
    event_store: &impl EventStore,
    db_manager: &DatabaseManager,
    aggregate_id: i64,
    event_type: &str,
    event: &AuctionEvent,
    timestamp: DateTime<Utc>,
) -> ServiceResult<()> {
    const MAX_APPEND_RETRIES: i32 = 10;
    let data = serde_json::to_value(event)?;
    let mut retries = 0;
    loop {
        let mut tx = db_manager.pool().begin().await?;
        match event_store
            .append_in_tx(&mut tx, aggregate_id, event_type, data.clone(), timestamp)
            .await
        {
            Ok(appended) => {
                tx.commit().await?;
                publish_committed(event_store, std::slice::from_ref(&appended)).await;
                return Ok(());
            }
            Err(ServiceError::VersionConflict) if retries < MAX_APPEND_RETRIES => {
                tx.rollback().await?;
                retries += 1;
                warn!(
                    "{:<12} --> version conflict for aggregate {}, retry {}",
                    "Command", aggregate_id, retries
                );
            }
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        }
    }
}

/// Publish committed events. The events table is the durable record; a
/// broker outage costs delivery latency, not the command.
async fn publish_committed(event_store: &impl EventStore, events: &[Event]) {
    for event in events {
        if let Err(e) = event_store.publish_event(event).await {
            warn!(
                "{:<12} --> publish failed for event {}: {}",
                "Command", event.id, e
            );
        }
    }
}

// endregion: --- Event Helpers
