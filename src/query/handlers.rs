// region:    --- Imports
use super::queries;
use crate::bidding::model::{Bid, Lot, STATUS_ACTIVE};
use crate::database::DatabaseManager;
use crate::error::{ServiceError, ServiceResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::info;

// endregion: --- Imports

// region:    --- Lot Queries

pub async fn get_lot(db_manager: &DatabaseManager, lot_id: i64) -> ServiceResult<Lot> {
    info!("{:<12} --> lot lookup id: {}", "Query", lot_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Lot>(queries::GET_LOT)
                    .bind(lot_id)
                    .fetch_optional(&mut **tx)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("lot {}", lot_id)))
            })
        })
        .await
}

pub async fn get_lot_by_number(
    db_manager: &DatabaseManager,
    auction_id: i64,
    lot_number: i32,
) -> ServiceResult<Lot> {
    info!(
        "{:<12} --> lot lookup auction: {} lot: {}",
        "Query", auction_id, lot_number
    );
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Lot>(queries::GET_LOT_BY_NUMBER)
                    .bind(auction_id)
                    .bind(lot_number)
                    .fetch_optional(&mut **tx)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "auction {} lot {}",
                            auction_id, lot_number
                        ))
                    })
            })
        })
        .await
}

pub async fn get_highest_bid(
    db_manager: &DatabaseManager,
    lot_id: i64,
) -> ServiceResult<Option<Decimal>> {
    info!("{:<12} --> highest bid lookup id: {}", "Query", lot_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let result = sqlx::query(queries::GET_HIGHEST_BID)
                    .bind(lot_id)
                    .fetch_one(&mut **tx)
                    .await?;

                Ok(result.get("highest_bid"))
            })
        })
        .await
}

pub async fn get_bid_history(
    db_manager: &DatabaseManager,
    lot_id: i64,
) -> ServiceResult<Vec<Bid>> {
    info!("{:<12} --> bid history lookup id: {}", "Query", lot_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                Ok(sqlx::query_as::<_, Bid>(queries::GET_BID_HISTORY)
                    .bind(lot_id)
                    .fetch_all(&mut **tx)
                    .await?)
            })
        })
        .await
}

// endregion: --- Lot Queries

// region:    --- Marketplace Browse

/// Marketplace listing filters. All optional; unknown sort keys fall back
/// to newest-first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowseParams {
    pub sort: Option<String>,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// One page of marketplace results. Clients page on `has_more`, never on
/// the returned item count.
#[derive(Debug, Serialize, Deserialize)]
pub struct BrowsePage {
    pub items: Vec<Lot>,
    pub total: i64,
    pub has_more: bool,
}

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

pub fn page_has_more(skip: i64, returned: usize, total: i64) -> bool {
    skip + (returned as i64) < total
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, params: &'a BrowseParams) {
    builder.push(" WHERE status = ").push_bind(STATUS_ACTIVE);
    if let Some(category) = &params.category {
        builder.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(condition) = &params.condition {
        builder
            .push(" AND condition = ")
            .push_bind(condition.as_str());
    }
    if let Some(min_price) = params.min_price {
        builder.push(" AND current_price >= ").push_bind(min_price);
    }
    if let Some(max_price) = params.max_price {
        builder.push(" AND current_price <= ").push_bind(max_price);
    }
}

fn order_clause(sort: Option<&str>) -> &'static str {
    match sort {
        Some("price_asc") => " ORDER BY current_price ASC",
        Some("price_desc") => " ORDER BY current_price DESC",
        Some("ending_soon") => " ORDER BY end_time ASC",
        _ => " ORDER BY created_at DESC",
    }
}

pub async fn browse_marketplace(
    db_manager: &DatabaseManager,
    params: &BrowseParams,
) -> ServiceResult<BrowsePage> {
    info!("{:<12} --> marketplace browse: {:?}", "Query", params);

    let skip = params.skip.unwrap_or(0).max(0);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let mut count_builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM lots");
    push_filters(&mut count_builder, params);
    let total: i64 = count_builder
        .build_query_scalar()
        .fetch_one(db_manager.pool())
        .await?;

    let mut select_builder = QueryBuilder::<Postgres>::new("SELECT * FROM lots");
    push_filters(&mut select_builder, params);
    select_builder.push(order_clause(params.sort.as_deref()));
    select_builder.push(" LIMIT ").push_bind(limit);
    select_builder.push(" OFFSET ").push_bind(skip);

    let items = select_builder
        .build_query_as::<Lot>()
        .fetch_all(db_manager.pool())
        .await?;

    let has_more = page_has_more(skip, items.len(), total);
    Ok(BrowsePage {
        items,
        total,
        has_more,
    })
}

// endregion: --- Marketplace Browse

// endregion: --- Tests
