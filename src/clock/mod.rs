/// Auction time-keeping.
/// The countdown shown to a bidder is advisory only. The authoritative
/// "ended" decision is made at bid-acceptance time against the database
/// clock, so a bid can still come back `AUCTION_ENDED` while a local
/// countdown shows seconds remaining.
// region:    --- Imports
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration as TokioDuration};
use tracing::debug;

// endregion: --- Imports

// region:    --- Remaining Time

/// Remaining time until a lot closes, broken into display units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingTime {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl RemainingTime {
    fn from_duration(d: Duration) -> Self {
        let total = d.num_seconds().max(0);
        RemainingTime {
            days: total / 86_400,
            hours: (total % 86_400) / 3_600,
            minutes: (total % 3_600) / 60,
            seconds: total % 60,
        }
    }
}

/// Urgency classification of an auction countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionPhase {
    Ended,
    Urgent,
    Normal,
}

/// Signed time remaining; negative once the end date has passed.
pub fn time_remaining(end_time: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    end_time - now
}

/// Remaining time as display units, or `None` once the auction has ended.
pub fn remaining_display(end_time: DateTime<Utc>, now: DateTime<Utc>) -> Option<RemainingTime> {
    let remaining = time_remaining(end_time, now);
    if remaining <= Duration::zero() {
        None
    } else {
        Some(RemainingTime::from_duration(remaining))
    }
}

/// Classify a countdown: ended at or below zero, urgent under one hour.
pub fn classify(end_time: DateTime<Utc>, now: DateTime<Utc>) -> AuctionPhase {
    let remaining = time_remaining(end_time, now);
    if remaining <= Duration::zero() {
        AuctionPhase::Ended
    } else if remaining < Duration::hours(1) {
        AuctionPhase::Urgent
    } else {
        AuctionPhase::Normal
    }
}

// endregion: --- Remaining Time

// region:    --- Auction Window

/// The mutable end-time state of a lot. Only bid acceptance moves
/// `end_date`; everything else reads it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuctionWindow {
    pub end_date: DateTime<Utc>,
    pub anti_sniping_enabled: bool,
    pub extension_window_minutes: i64,
}

impl AuctionWindow {
    pub fn extension_window(&self) -> Duration {
        Duration::minutes(self.extension_window_minutes)
    }

    /// A bid accepted inside the extension window triggers an extension.
    pub fn should_extend(&self, accepted_at: DateTime<Utc>) -> bool {
        if !self.anti_sniping_enabled {
            return false;
        }
        let remaining = time_remaining(self.end_date, accepted_at);
        remaining > Duration::zero() && remaining <= self.extension_window()
    }

    /// The extended close resets to `accepted_at + window`, not to
    /// `end_date + window`, so every late snipe pushes the close out by a
    /// full window from the moment it landed.
    pub fn extended_end(&self, accepted_at: DateTime<Utc>) -> DateTime<Utc> {
        accepted_at + self.extension_window()
    }
}

// endregion: --- Auction Window

// region:    --- Shared Ticker

/// One clock tick fan-out for every mounted lot view.
///
/// A single interval task broadcasts the current time once per second;
/// subscribers come and go freely. Dropping a receiver tears down that
/// subscription, and `stop` (or dropping the ticker) aborts the task, so
/// the timer count stays at one no matter how many lots are on screen.
pub struct SharedTicker {
    sender: broadcast::Sender<DateTime<Utc>>,
    handle: JoinHandle<()>,
}

impl SharedTicker {
    pub fn start() -> Self {
        let (sender, _) = broadcast::channel(16);
        let tick_sender = sender.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(TokioDuration::from_secs(1));
            loop {
                ticker.tick().await;
                // Send fails when nobody is subscribed; keep ticking.
                if tick_sender.send(Utc::now()).is_err() {
                    debug!("{:<12} --> tick dropped, no subscribers", "Ticker");
                }
            }
        });
        SharedTicker { sender, handle }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DateTime<Utc>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for SharedTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// endregion: --- Shared Ticker

// endregion: --- Tests
