/// Lot state by internal id.
pub const GET_LOT: &str = "SELECT * FROM lots WHERE id = $1";

/// Lot state by auction and lot number.
pub const GET_LOT_BY_NUMBER: &str =
    "SELECT * FROM lots WHERE auction_id = $1 AND lot_number = $2";

/// Highest accepted bid for a lot.
pub const GET_HIGHEST_BID: &str =
    "SELECT MAX(amount) as highest_bid FROM bids WHERE lot_id = $1";

/// Bid history, newest first.
pub const GET_BID_HISTORY: &str = r#"
    SELECT id, lot_id, bidder_id, amount, bid_time
    FROM bids
    WHERE lot_id = $1
    ORDER BY bid_time DESC
"#;

