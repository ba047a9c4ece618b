// region:    --- Imports
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Service Error

/// Service-level error taxonomy. Every variant maps to a distinct HTTP
/// status and a stable wire `code`, and rejection payloads carry the latest
/// server truth so callers can refresh their local snapshot.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Local precondition failed; correct in place, no state moved.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Command arrived without an authenticated principal.
    #[error("authentication required")]
    AuthenticationRequired,

    /// Lot or auction does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Another bidder moved the price first.
    #[error("bid amount is no longer above the current price")]
    StaleAmount { current_price: Decimal },

    /// Requested more units than the lot has left.
    #[error("insufficient quantity available")]
    InsufficientQuantity { available_quantity: i32 },

    /// The auction closed before the command was accepted.
    #[error("auction has ended")]
    AuctionEnded,

    /// The auction has not opened for bidding yet.
    #[error("auction has not started")]
    AuctionNotStarted,

    /// Optimistic event-version conflict; commands retry this internally.
    #[error("event version conflict")]
    VersionConflict,

    /// Bounded retries exhausted under contention.
    #[error("maximum retries exceeded")]
    MaxRetriesExceeded,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("message broker error: {0}")]
    Broker(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Stable machine-readable code carried on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION",
            ServiceError::AuthenticationRequired => "AUTH_REQUIRED",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::StaleAmount { .. } => "STALE_AMOUNT",
            ServiceError::InsufficientQuantity { .. } => "INSUFFICIENT_QUANTITY",
            ServiceError::AuctionEnded => "AUCTION_ENDED",
            ServiceError::AuctionNotStarted => "NOT_STARTED",
            ServiceError::VersionConflict => "VERSION_CONFLICT",
            ServiceError::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            ServiceError::Database(_) => "DATABASE",
            ServiceError::Broker(_) => "BROKER",
            ServiceError::Serialization(_) => "SERIALIZATION",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::StaleAmount { .. } => StatusCode::CONFLICT,
            ServiceError::InsufficientQuantity { .. } => StatusCode::CONFLICT,
            ServiceError::AuctionEnded => StatusCode::GONE,
            ServiceError::AuctionNotStarted => StatusCode::BAD_REQUEST,
            ServiceError::VersionConflict => StatusCode::CONFLICT,
            ServiceError::MaxRetriesExceeded => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Database(_)
            | ServiceError::Broker(_)
            | ServiceError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });

        // Rejections refresh the caller with the latest server truth.
        match &self {
            ServiceError::StaleAmount { current_price } => {
                body["current_price"] = serde_json::json!(current_price);
            }
            ServiceError::InsufficientQuantity { available_quantity } => {
                body["available_quantity"] = serde_json::json!(available_quantity);
            }
            _ => {}
        }

        (self.status_code(), Json(body)).into_response()
    }
}

// endregion: --- Service Error
