/// Lot status sweep.
/// Listing management is assumed to live in a separate service; this
/// sweep only moves lots along the time axis. Anti-sniping extensions
/// push `end_time` forward, so an extended lot simply completes later.
// region:    --- Imports
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error};

// endregion: --- Imports

// region:    --- Auction Scheduler

pub struct AuctionScheduler {
    pool: Arc<PgPool>,
}

impl AuctionScheduler {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Run the sweep once per second.
    pub async fn start(&self) {
        let pool = Arc::clone(&self.pool);
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                if let Err(e) = Self::update_lot_statuses(&pool).await {
                    error!("{:<12} --> status sweep failed: {:?}", "Scheduler", e);
                }
            }
        });
    }

    async fn update_lot_statuses(pool: &PgPool) -> Result<(), sqlx::Error> {
        let now = Utc::now();

        sqlx::query(
            "UPDATE lots SET status = 'ACTIVE'
             WHERE status = 'SCHEDULED' AND start_time <= $1",
        )
        .bind(now)
        .execute(pool)
        .await?;

        sqlx::query(
            "UPDATE lots SET status = 'COMPLETED', buy_now_enabled = false
             WHERE status = 'ACTIVE' AND end_time <= $1",
        )
        .bind(now)
        .execute(pool)
        .await?;

        debug!("{:<12} --> lot statuses swept", "Scheduler");

        Ok(())
    }
}
// endregion: --- Auction Scheduler
