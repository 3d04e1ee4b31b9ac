use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Bid, NewBid},
    traits::MarketplaceError,
};

/// Inserts the bid, mapping the `(request_id, expert_id)` uniqueness violation to a typed conflict.
pub async fn insert_bid(bid: NewBid, conn: &mut SqliteConnection) -> Result<Bid, MarketplaceError> {
    let NewBid { request_id, expert_id, cost, duration, duration_unit, note } = bid;
    let bid: Bid = sqlx::query_as(
        r#"
            INSERT INTO bids (request_id, expert_id, cost, duration, duration_unit, note)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(request_id)
    .bind(expert_id)
    .bind(cost)
    .bind(duration)
    .bind(duration_unit.to_string())
    .bind(note)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            MarketplaceError::BidAlreadyPlaced { request_id, expert_id }
        },
        _ => MarketplaceError::from(e),
    })?;
    debug!("📝️ Bid [{}] of {} placed on request {} by expert {}", bid.id, bid.cost, request_id, expert_id);
    Ok(bid)
}

pub async fn fetch_bid(id: i64, conn: &mut SqliteConnection) -> Result<Option<Bid>, MarketplaceError> {
    let bid = sqlx::query_as("SELECT * FROM bids WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(bid)
}

pub async fn fetch_bids_for_request(
    request_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Bid>, MarketplaceError> {
    let bids = sqlx::query_as("SELECT * FROM bids WHERE request_id = $1 ORDER BY created_at ASC")
        .bind(request_id)
        .fetch_all(conn)
        .await?;
    Ok(bids)
}

pub async fn fetch_accepted_bid(
    request_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Bid>, MarketplaceError> {
    let bid = sqlx::query_as("SELECT * FROM bids WHERE request_id = $1 AND is_accepted = 1")
        .bind(request_id)
        .fetch_optional(conn)
        .await?;
    Ok(bid)
}

/// Un-accepts every bid on the request. Run immediately before marking the winner so that at most one bid is
/// ever accepted, even if a previous acceptance is being replayed after a refund.
pub(crate) async fn clear_accepted_for_request(
    request_id: i64,
    conn: &mut SqliteConnection,
) -> Result<(), MarketplaceError> {
    let result =
        sqlx::query("UPDATE bids SET is_accepted = 0, updated_at = CURRENT_TIMESTAMP WHERE request_id = $1")
            .bind(request_id)
            .execute(conn)
            .await?;
    trace!("📝️ Cleared acceptance on {} bids for request {request_id}", result.rows_affected());
    Ok(())
}

pub(crate) async fn set_accepted(
    bid_id: i64,
    accepted: bool,
    conn: &mut SqliteConnection,
) -> Result<Bid, MarketplaceError> {
    let result: Option<Bid> =
        sqlx::query_as("UPDATE bids SET is_accepted = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(accepted)
            .bind(bid_id)
            .fetch_optional(conn)
            .await?;
    result.ok_or(MarketplaceError::BidNotFound(bid_id))
}
