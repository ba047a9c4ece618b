/// Stock reservation for multi-unit lots.
/// `available_quantity` is only ever mutated through `reserve`; every
/// implementation is an atomic compare-and-decrement, so concurrent
/// purchases can never claim more units than the lot holds.
// region:    --- Imports
use crate::bidding::model::{Purchase, PURCHASE_PENDING_PAYMENT, STATUS_COMPLETED};
use crate::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

// endregion: --- Imports

// region:    --- Ledger Trait

/// Atomic unit reservation against a lot's remaining stock.
#[async_trait]
pub trait QuantityLedger {
    /// Reserve `quantity_requested` units at `unit_price` for `buyer_id`.
    ///
    /// All-or-nothing: on success the stock is decremented and a
    /// `pending_payment` purchase exists; on failure nothing moved and the
    /// error carries the observed remaining stock. Claiming the final unit
    /// disables Buy Now and completes the lot.
    async fn reserve(
        &self,
        lot_id: i64,
        buyer_id: i64,
        quantity_requested: i32,
        unit_price: Decimal,
    ) -> ServiceResult<Purchase>;
}

// endregion: --- Ledger Trait

// region:    --- Postgres Ledger

/// Ledger backed by a conditional update: the decrement only lands when
/// the row still holds enough stock, and the purchase insert shares its
/// transaction.
pub struct PostgresQuantityLedger {
    pool: Arc<PgPool>,
}

impl PostgresQuantityLedger {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuantityLedger for PostgresQuantityLedger {
    async fn reserve(
        &self,
        lot_id: i64,
        buyer_id: i64,
        quantity_requested: i32,
        unit_price: Decimal,
    ) -> ServiceResult<Purchase> {
        if quantity_requested < 1 {
            return Err(ServiceError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let remaining: Option<i32> = sqlx::query_scalar(
            "UPDATE lots
             SET available_quantity = available_quantity - $2,
                 buy_now_enabled = available_quantity - $2 > 0,
                 status = CASE WHEN available_quantity - $2 = 0 THEN $3 ELSE status END
             WHERE id = $1
               AND status = 'ACTIVE'
               AND available_quantity >= $2
             RETURNING available_quantity",
        )
        .bind(lot_id)
        .bind(quantity_requested)
        .bind(STATUS_COMPLETED)
        .fetch_optional(&mut *tx)
        .await?;

        let remaining = match remaining {
            Some(remaining) => remaining,
            None => {
                // Guard lost: report the stock the caller should re-clamp to.
                tx.rollback().await?;
                let available: Option<i32> =
                    sqlx::query_scalar("SELECT available_quantity FROM lots WHERE id = $1")
                        .bind(lot_id)
                        .fetch_optional(&*self.pool)
                        .await?;
                return match available {
                    Some(available_quantity) => {
                        Err(ServiceError::InsufficientQuantity { available_quantity })
                    }
                    None => Err(ServiceError::NotFound(format!("lot {}", lot_id))),
                };
            }
        };

        let total_amount = unit_price * Decimal::from(quantity_requested);
        let purchase = sqlx::query_as::<_, Purchase>(
            "INSERT INTO purchases
                 (lot_id, buyer_id, quantity_requested, unit_price, total_amount, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(lot_id)
        .bind(buyer_id)
        .bind(quantity_requested)
        .bind(unit_price)
        .bind(total_amount)
        .bind(PURCHASE_PENDING_PAYMENT)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "{:<12} --> reserved {} unit(s) of lot {}, {} remaining",
            "Ledger", quantity_requested, lot_id, remaining
        );

        Ok(purchase)
    }
}

// endregion: --- Postgres Ledger

// region:    --- In-Memory Ledger

/// Per-lot stock tracked by the in-memory ledger.
#[derive(Debug, Clone)]
pub struct LotStock {
    pub quantity: i32,
    pub available_quantity: i32,
    pub buy_now_enabled: bool,
    pub status: String,
}

/// Mutex-guarded ledger with the same semantics as the database-backed
/// one. Used by tests and the in-process test server.
pub struct InMemoryQuantityLedger {
    stock: Mutex<HashMap<i64, LotStock>>,
    next_purchase_id: Mutex<i64>,
}

impl InMemoryQuantityLedger {
    pub fn new() -> Self {
        Self {
            stock: Mutex::new(HashMap::new()),
            next_purchase_id: Mutex::new(1),
        }
    }

    pub async fn insert_lot(&self, lot_id: i64, stock: LotStock) {
        self.stock.lock().await.insert(lot_id, stock);
    }

    pub async fn stock_of(&self, lot_id: i64) -> Option<LotStock> {
        self.stock.lock().await.get(&lot_id).cloned()
    }
}

impl Default for InMemoryQuantityLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuantityLedger for InMemoryQuantityLedger {
    async fn reserve(
        &self,
        lot_id: i64,
        buyer_id: i64,
        quantity_requested: i32,
        unit_price: Decimal,
    ) -> ServiceResult<Purchase> {
        if quantity_requested < 1 {
            return Err(ServiceError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        // Check and decrement under one lock acquisition.
        let mut stock = self.stock.lock().await;
        let lot = stock
            .get_mut(&lot_id)
            .ok_or_else(|| ServiceError::NotFound(format!("lot {}", lot_id)))?;

        if lot.status != "ACTIVE" || lot.available_quantity < quantity_requested {
            return Err(ServiceError::InsufficientQuantity {
                available_quantity: lot.available_quantity,
            });
        }

        lot.available_quantity -= quantity_requested;
        if lot.available_quantity == 0 {
            lot.buy_now_enabled = false;
            lot.status = STATUS_COMPLETED.to_string();
        }
        drop(stock);

        let mut next_id = self.next_purchase_id.lock().await;
        let id = *next_id;
        *next_id += 1;

        Ok(Purchase {
            id,
            lot_id,
            buyer_id,
            quantity_requested,
            unit_price,
            total_amount: unit_price * Decimal::from(quantity_requested),
            status: PURCHASE_PENDING_PAYMENT.to_string(),
            created_at: Utc::now(),
        })
    }
}

// endregion: --- In-Memory Ledger

// endregion: --- Tests
