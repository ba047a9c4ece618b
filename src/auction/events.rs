use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Domain events appended to the event store and published to the broker.
/// Downstream collaborators (notification delivery, analytics) consume
/// these; nothing in-process replays them.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum AuctionEvent {
    /// A bid was accepted and the lot price moved.
    BidPlaced {
        lot_id: i64,
        bidder_id: i64,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    },
    /// A late bid pushed the close out to `new_end_time`.
    EndTimeExtended {
        lot_id: i64,
        new_end_time: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    /// Units were claimed from the lot's remaining stock.
    BuyNowExecuted {
        lot_id: i64,
        buyer_id: i64,
        quantity: i32,
        unit_price: Decimal,
        total_amount: Decimal,
        timestamp: DateTime<Utc>,
    },
}
