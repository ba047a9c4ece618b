use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// Lot status values as stored in the `status` column.
pub const STATUS_SCHEDULED: &str = "SCHEDULED";
pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_COMPLETED: &str = "COMPLETED";

// Purchase status values as stored in the `status` column.
pub const PURCHASE_PENDING_PAYMENT: &str = "pending_payment";
pub const PURCHASE_CONFIRMED: &str = "confirmed";
pub const PURCHASE_REJECTED: &str = "rejected";

/// One sellable, quantity-bearing unit within an auction.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lot {
    pub id: i64,
    pub auction_id: i64,
    pub lot_number: i32,
    pub title: String,
    pub description: String,
    pub category: String,
    pub condition: String,
    pub starting_price: Decimal,
    pub current_price: Decimal,
    pub bid_count: i32,
    pub quantity: i32,
    pub available_quantity: i32,
    pub buy_now_price: Option<Decimal>,
    pub buy_now_enabled: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub anti_sniping_enabled: bool,
    pub extension_window_minutes: i32,
    pub seller_id: i64,
    pub seller_is_business: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Immutable record of a single accepted offer.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bid {
    pub id: i64,
    pub lot_id: i64,
    pub bidder_id: i64,
    pub amount: Decimal,
    pub bid_time: DateTime<Utc>,
}

/// A partial-quantity Buy Now purchase against a lot's remaining stock.
/// `status` is one of the `PURCHASE_*` values.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Purchase {
    pub id: i64,
    pub lot_id: i64,
    pub buyer_id: i64,
    pub quantity_requested: i32,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
