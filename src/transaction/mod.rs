/// Client-side bid / Buy Now workflow.
/// The machine walks `Idle → Drafting → PricingRequested → PricingReady →
/// AwaitingConfirmation → Submitting → Settled | Rejected`. Its lot
/// snapshot is a cache of server truth, refreshed from every response —
/// success or rejection — and never consulted for acceptance decisions.
// region:    --- Imports
use crate::clock::{self, AuctionPhase};
use crate::fees::{self, CostBreakdown};
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub mod toggle;

// endregion: --- Imports

// region:    --- Client Error

/// Recoverable workflow errors. A server rejection is not an error: it
/// lands the machine in `Rejected` with a distinct user-facing reason.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Corrected in place; no network call was made.
    #[error("validation: {0}")]
    Validation(String),

    /// The requested transition is not legal from the current phase.
    #[error("invalid phase: {0}")]
    InvalidPhase(&'static str),

    /// Transport failure. Money-moving requests are never resubmitted
    /// automatically; the caller decides.
    #[error("network error: {0}")]
    Network(String),

    /// The authoritative figure replaced a local estimate and moved;
    /// the new breakdown awaits re-confirmation.
    #[error("authoritative pricing differs from the estimate")]
    EstimateRevised,

    /// The server answered with something unreadable.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}

// endregion: --- Client Error

// region:    --- Wire Types

/// Client cache of the lot. Extra server fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct LotSnapshot {
    pub auction_id: i64,
    pub lot_number: i32,
    pub current_price: Decimal,
    pub bid_count: i32,
    pub quantity: i32,
    pub available_quantity: i32,
    pub buy_now_price: Option<Decimal>,
    pub buy_now_enabled: bool,
    pub end_time: DateTime<Utc>,
    pub seller_is_business: bool,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct BidAccepted {
    current_price: Decimal,
    bid_count: i32,
    end_date: DateTime<Utc>,
    extended: bool,
}

/// Purchase receipt carried on a Buy Now acceptance.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseReceipt {
    pub id: i64,
    pub quantity_requested: i32,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct BuyNowAccepted {
    purchase: PurchaseReceipt,
    available_quantity: i32,
    buy_now_enabled: bool,
    lot_status: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    current_price: Option<Decimal>,
    #[serde(default)]
    available_quantity: Option<i32>,
}

// endregion: --- Wire Types

// region:    --- Phases

/// What the draft intends to submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Bid,
    BuyNow { quantity: i32 },
}

/// A breakdown plus whether it is a local estimate. Estimates are never
/// a valid basis for submission.
#[derive(Debug, Clone)]
pub struct Pricing {
    pub breakdown: CostBreakdown,
    pub estimate: bool,
}

/// Why the server said no.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RejectReason {
    StaleAmount { current_price: Decimal },
    AuctionEnded,
    InsufficientQuantity { available_quantity: i32 },
    AuthenticationRequired,
    Other(String),
}

impl RejectReason {
    /// One distinct, user-facing message per reason.
    pub fn user_message(&self) -> String {
        match self {
            RejectReason::StaleAmount { current_price } => format!(
                "Someone outbid you first. The price is now {}.",
                current_price
            ),
            RejectReason::AuctionEnded => "This auction has ended.".to_string(),
            RejectReason::InsufficientQuantity { available_quantity } => format!(
                "Only {} unit(s) are still available.",
                available_quantity
            ),
            RejectReason::AuthenticationRequired => {
                "Please sign in to continue.".to_string()
            }
            RejectReason::Other(message) => message.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum BidPhase {
    Idle,
    Drafting {
        intent: Intent,
        amount: Decimal,
    },
    PricingRequested {
        intent: Intent,
        amount: Decimal,
    },
    PricingReady {
        intent: Intent,
        amount: Decimal,
        pricing: Pricing,
    },
    AwaitingConfirmation {
        intent: Intent,
        amount: Decimal,
        pricing: Pricing,
    },
    Submitting {
        intent: Intent,
        amount: Decimal,
    },
    Settled {
        intent: Intent,
        amount: Decimal,
    },
    Rejected {
        reason: RejectReason,
    },
}

/// Handle for an in-flight pricing request. Applying a ticket whose
/// generation has been superseded by a newer draft is a no-op.
#[derive(Debug, Clone, Copy)]
pub struct PricingTicket {
    generation: u64,
    amount: Decimal,
    intent: Intent,
}

// endregion: --- Phases

// region:    --- Bid Transaction

pub struct BidTransaction {
    client: Client,
    base_url: String,
    region: String,
    lot: LotSnapshot,
    phase: BidPhase,
    pricing_generation: u64,
}

impl BidTransaction {
    /// Fetch the lot and open an idle workflow against it.
    pub async fn open(
        client: Client,
        base_url: impl Into<String>,
        region: impl Into<String>,
        auction_id: i64,
        lot_number: i32,
    ) -> Result<Self, ClientError> {
        let base_url = base_url.into();
        let url = format!(
            "{}/multi-item-listings/{}/lots/{}",
            base_url, auction_id, lot_number
        );
        let lot: LotSnapshot = client
            .get(url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ClientError::Network(e.to_string()))?
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            region: region.into(),
            lot,
            phase: BidPhase::Idle,
            pricing_generation: 0,
        })
    }

    pub fn phase(&self) -> &BidPhase {
        &self.phase
    }

    pub fn lot(&self) -> &LotSnapshot {
        &self.lot
    }

    /// Advisory countdown state; the server alone decides "ended".
    pub fn countdown(&self, now: DateTime<Utc>) -> AuctionPhase {
        clock::classify(self.lot.end_time, now)
    }

    /// Whether the bidding UI should still be offered at all.
    pub fn can_bid(&self) -> bool {
        self.lot.status == "ACTIVE"
    }

    /// Largest Buy Now quantity worth offering, from the latest snapshot.
    pub fn max_buy_now_quantity(&self) -> i32 {
        if self.lot.buy_now_enabled {
            self.lot.available_quantity
        } else {
            0
        }
    }

    // -- Drafting

    /// Enter a candidate bid amount. Local gate only; anything already in
    /// flight for an older amount is superseded.
    pub fn draft_bid(&mut self, amount: Decimal) -> Result<(), ClientError> {
        if !self.can_bid() {
            return Err(ClientError::Validation(
                "this lot is no longer biddable".to_string(),
            ));
        }
        if amount <= self.lot.current_price {
            return Err(ClientError::Validation(format!(
                "bid must be greater than the current price of {}",
                self.lot.current_price
            )));
        }
        self.pricing_generation += 1;
        self.phase = BidPhase::Drafting {
            intent: Intent::Bid,
            amount,
        };
        Ok(())
    }

    /// Enter a Buy Now draft for `quantity` units.
    pub fn draft_buy_now(&mut self, quantity: i32) -> Result<(), ClientError> {
        if !self.lot.buy_now_enabled {
            return Err(ClientError::Validation(
                "buy now is not available for this lot".to_string(),
            ));
        }
        let unit_price = self.lot.buy_now_price.ok_or_else(|| {
            ClientError::Validation("this lot has no buy now price".to_string())
        })?;
        if quantity < 1 {
            return Err(ClientError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }
        if quantity > self.lot.available_quantity {
            return Err(ClientError::Validation(format!(
                "only {} unit(s) available",
                self.lot.available_quantity
            )));
        }
        self.pricing_generation += 1;
        self.phase = BidPhase::Drafting {
            intent: Intent::BuyNow { quantity },
            amount: unit_price * Decimal::from(quantity),
        };
        Ok(())
    }

    // -- Pricing

    /// Mark the draft as waiting for pricing and hand back a ticket for
    /// the fetch. A newer draft invalidates the ticket.
    pub fn begin_pricing(&mut self) -> Result<PricingTicket, ClientError> {
        let (intent, amount) = match &self.phase {
            BidPhase::Drafting { intent, amount }
            | BidPhase::PricingReady { intent, amount, .. } => (*intent, *amount),
            _ => return Err(ClientError::InvalidPhase("no draft to price")),
        };
        self.phase = BidPhase::PricingRequested { intent, amount };
        Ok(PricingTicket {
            generation: self.pricing_generation,
            amount,
            intent,
        })
    }

    /// Fetch the authoritative breakdown for a ticket.
    pub async fn fetch_pricing(
        &self,
        ticket: PricingTicket,
    ) -> Result<CostBreakdown, ClientError> {
        let url = format!("{}/fees/calculate-buyer-cost", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&[
                ("amount", ticket.amount.to_string()),
                ("region", self.region.clone()),
                (
                    "seller_is_business",
                    self.lot.seller_is_business.to_string(),
                ),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Apply a fetched (or failed) pricing result. Superseded tickets are
    /// discarded so a stale breakdown can never attach to a newer draft.
    pub fn apply_pricing(
        &mut self,
        ticket: PricingTicket,
        result: Result<CostBreakdown, ClientError>,
    ) {
        if ticket.generation != self.pricing_generation {
            info!(
                "{:<12} --> discarding superseded pricing for {}",
                "Workflow", ticket.amount
            );
            return;
        }
        let pricing = match result {
            Ok(breakdown) => Pricing {
                breakdown,
                estimate: false,
            },
            Err(e) => {
                // Endpoint unreachable: estimate locally with the default
                // rates and flag it. Estimates never reach the server.
                warn!(
                    "{:<12} --> pricing endpoint unavailable ({}), using local estimate",
                    "Workflow", e
                );
                Pricing {
                    breakdown: fees::compute(
                        ticket.amount,
                        fees::PLATFORM_PREMIUM_RATE,
                        fees::DEFAULT_TAX_RATE,
                        self.lot.seller_is_business,
                    ),
                    estimate: true,
                }
            }
        };
        self.phase = BidPhase::PricingReady {
            intent: ticket.intent,
            amount: ticket.amount,
            pricing,
        };
    }

    /// Convenience: begin, fetch, and apply in one call.
    pub async fn request_pricing(&mut self) -> Result<(), ClientError> {
        let ticket = self.begin_pricing()?;
        let result = self.fetch_pricing(ticket).await;
        self.apply_pricing(ticket, result);
        Ok(())
    }

    // -- Confirmation

    /// The user has seen the full breakdown and accepted it. Nothing is
    /// ever submitted without passing through here first.
    pub fn confirm(&mut self) -> Result<(), ClientError> {
        match std::mem::replace(&mut self.phase, BidPhase::Idle) {
            BidPhase::PricingReady {
                intent,
                amount,
                pricing,
            } => {
                self.phase = BidPhase::AwaitingConfirmation {
                    intent,
                    amount,
                    pricing,
                };
                Ok(())
            }
            other => {
                self.phase = other;
                Err(ClientError::InvalidPhase("no priced draft to confirm"))
            }
        }
    }

    // -- Submission

    /// Submit the confirmed draft as `principal_id`.
    ///
    /// An estimate basis is replaced by the authoritative figure first; if
    /// the total moved, the machine drops back to `PricingReady` and asks
    /// for re-confirmation. Transport failures return the machine to
    /// `AwaitingConfirmation` — retrying is the caller's explicit choice.
    pub async fn submit(&mut self, principal_id: i64) -> Result<(), ClientError> {
        let (intent, amount, pricing) = match &self.phase {
            BidPhase::AwaitingConfirmation {
                intent,
                amount,
                pricing,
            } => (*intent, *amount, pricing.clone()),
            _ => {
                return Err(ClientError::InvalidPhase(
                    "confirmation required before submission",
                ))
            }
        };

        let pricing = if pricing.estimate {
            let ticket = PricingTicket {
                generation: self.pricing_generation,
                amount,
                intent,
            };
            let authoritative = self.fetch_pricing(ticket).await?;
            if authoritative.total != pricing.breakdown.total {
                info!(
                    "{:<12} --> estimate {} revised to {}, re-confirmation required",
                    "Workflow", pricing.breakdown.total, authoritative.total
                );
                self.phase = BidPhase::PricingReady {
                    intent,
                    amount,
                    pricing: Pricing {
                        breakdown: authoritative,
                        estimate: false,
                    },
                };
                return Err(ClientError::EstimateRevised);
            }
            let refreshed = Pricing {
                breakdown: authoritative,
                estimate: false,
            };
            self.phase = BidPhase::AwaitingConfirmation {
                intent,
                amount,
                pricing: refreshed.clone(),
            };
            refreshed
        } else {
            pricing
        };

        self.phase = BidPhase::Submitting { intent, amount };

        let send_result = match intent {
            Intent::Bid => {
                let url = format!(
                    "{}/multi-item-listings/{}/lots/{}/bid",
                    self.base_url, self.lot.auction_id, self.lot.lot_number
                );
                self.client
                    .post(url)
                    .json(&serde_json::json!({
                        "bidder_id": principal_id,
                        "amount": amount,
                    }))
                    .send()
                    .await
            }
            Intent::BuyNow { quantity } => {
                let url = format!("{}/buy-now", self.base_url);
                self.client
                    .post(url)
                    .json(&serde_json::json!({
                        "auction_id": self.lot.auction_id,
                        "lot_number": self.lot.lot_number,
                        "buyer_id": principal_id,
                        "quantity": quantity,
                    }))
                    .send()
                    .await
            }
        };

        let response = match send_result {
            Ok(response) => response,
            Err(e) => {
                // The submission may or may not have landed. Surface it and
                // wait for the user; never resubmit on our own.
                self.phase = BidPhase::AwaitingConfirmation {
                    intent,
                    amount,
                    pricing,
                };
                return Err(ClientError::Network(e.to_string()));
            }
        };

        if response.status().is_success() {
            match intent {
                Intent::Bid => {
                    let accepted: BidAccepted = response
                        .json()
                        .await
                        .map_err(|e| ClientError::Decode(e.to_string()))?;
                    // Adopt server truth, not the submitted amount: a higher
                    // concurrent bid may already have landed.
                    self.lot.current_price = accepted.current_price;
                    self.lot.bid_count = accepted.bid_count;
                    self.lot.end_time = accepted.end_date;
                    if accepted.extended {
                        info!(
                            "{:<12} --> close extended to {}",
                            "Workflow", accepted.end_date
                        );
                    }
                }
                Intent::BuyNow { .. } => {
                    let accepted: BuyNowAccepted = response
                        .json()
                        .await
                        .map_err(|e| ClientError::Decode(e.to_string()))?;
                    self.lot.available_quantity = accepted.available_quantity;
                    self.lot.buy_now_enabled = accepted.buy_now_enabled;
                    self.lot.status = accepted.lot_status;
                    info!(
                        "{:<12} --> purchase {} pending payment",
                        "Workflow", accepted.purchase.id
                    );
                }
            }
            self.phase = BidPhase::Settled { intent, amount };
            return Ok(());
        }

        let status = response.status();
        let body: ErrorBody = response.json().await.unwrap_or_default();
        let reason = self.classify_rejection(status, body);
        // Whatever the server knew better than us is already applied;
        // pull a full snapshot as well, best effort.
        if let Err(e) = self.refresh_lot().await {
            warn!("{:<12} --> snapshot refresh failed: {}", "Workflow", e);
        }
        self.phase = BidPhase::Rejected { reason };
        Ok(())
    }

    /// Map a wire rejection onto a reason, folding any carried server
    /// truth into the snapshot.
    fn classify_rejection(
        &mut self,
        status: reqwest::StatusCode,
        body: ErrorBody,
    ) -> RejectReason {
        if let Some(current_price) = body.current_price {
            self.lot.current_price = current_price;
        }
        if let Some(available_quantity) = body.available_quantity {
            self.lot.available_quantity = available_quantity;
        }
        match body.code.as_deref() {
            Some("STALE_AMOUNT") => RejectReason::StaleAmount {
                current_price: self.lot.current_price,
            },
            Some("AUCTION_ENDED") => {
                self.lot.status = "COMPLETED".to_string();
                RejectReason::AuctionEnded
            }
            Some("INSUFFICIENT_QUANTITY") => RejectReason::InsufficientQuantity {
                available_quantity: self.lot.available_quantity,
            },
            Some("AUTH_REQUIRED") => RejectReason::AuthenticationRequired,
            _ => RejectReason::Other(
                body.error
                    .unwrap_or_else(|| format!("request failed with status {}", status)),
            ),
        }
    }

    /// Re-fetch the lot snapshot from the server.
    pub async fn refresh_lot(&mut self) -> Result<(), ClientError> {
        let url = format!(
            "{}/multi-item-listings/{}/lots/{}",
            self.base_url, self.lot.auction_id, self.lot.lot_number
        );
        self.lot = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ClientError::Network(e.to_string()))?
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(())
    }

    /// Abandon the draft and return to idle.
    pub fn reset(&mut self) {
        self.pricing_generation += 1;
        self.phase = BidPhase::Idle;
    }
}

// endregion: --- Bid Transaction
