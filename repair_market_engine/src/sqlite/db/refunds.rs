use log::debug;
use rme_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{RefundRequest, RefundStatus},
    traits::MarketplaceError,
};

pub(crate) async fn insert_refund(
    order_id: i64,
    customer_id: i64,
    amount: Money,
    reason: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<RefundRequest, MarketplaceError> {
    let refund: RefundRequest = sqlx::query_as(
        r#"
            INSERT INTO refund_requests (order_id, customer_id, amount, reason)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(customer_id)
    .bind(amount)
    .bind(reason)
    .fetch_one(conn)
    .await?;
    debug!("↩️ Refund request [{}] of {amount} opened against order {order_id}", refund.id);
    Ok(refund)
}

pub async fn fetch_refund(id: i64, conn: &mut SqliteConnection) -> Result<Option<RefundRequest>, MarketplaceError> {
    let refund =
        sqlx::query_as("SELECT * FROM refund_requests WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(refund)
}

/// The outstanding refund for an order: requested or approved. At most one exists at a time; the insert path
/// checks through this query inside its transaction.
pub async fn fetch_open_refund_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<RefundRequest>, MarketplaceError> {
    let refund = sqlx::query_as(
        "SELECT * FROM refund_requests WHERE order_id = $1 AND status IN ('Requested', 'Approved') LIMIT 1",
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(refund)
}

/// Stamps the decision fields. The `status = 'Requested'` guard makes decided refunds immutable (apart from
/// their free-text notes, which [`update_notes`] may always edit).
pub(crate) async fn decide(
    refund_id: i64,
    status: RefundStatus,
    notes: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<RefundRequest, MarketplaceError> {
    let refund: Option<RefundRequest> = sqlx::query_as(
        r#"
            UPDATE refund_requests
            SET status = $1, decision_notes = $2, decided_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status = 'Requested'
            RETURNING *
        "#,
    )
    .bind(status.to_string())
    .bind(notes)
    .bind(refund_id)
    .fetch_optional(conn)
    .await?;
    refund.ok_or_else(|| {
        MarketplaceError::invalid_state(format!("Refund {refund_id} has already been decided"))
    })
}

pub(crate) async fn update_notes(
    refund_id: i64,
    notes: &str,
    conn: &mut SqliteConnection,
) -> Result<RefundRequest, MarketplaceError> {
    let refund: Option<RefundRequest> = sqlx::query_as(
        "UPDATE refund_requests SET decision_notes = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(notes)
    .bind(refund_id)
    .fetch_optional(conn)
    .await?;
    refund.ok_or(MarketplaceError::RefundNotFound(refund_id))
}
