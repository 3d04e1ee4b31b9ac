use chrono::{DateTime, Utc};
use log::{debug, trace};
use rme_common::Money;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    api::order_objects::OrderQueryFilter,
    db_types::{Bid, Order, OrderStatus, PaymentStatus},
    traits::MarketplaceError,
};

/// Inserts the order created from an accepted bid. The caller computes the deadline and supplies the bid so
/// that prices and ownership are denormalized from the ledger of record. Not atomic on its own; embed it in the
/// bid-acceptance transaction by passing `&mut *tx` as the connection argument.
pub(crate) async fn insert_order_for_bid(
    bid: &Bid,
    customer_id: i64,
    deadline: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, MarketplaceError> {
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                bid_id,
                request_id,
                customer_id,
                expert_id,
                base_price,
                extra_price,
                total_price,
                deadline
            ) VALUES ($1, $2, $3, $4, $5, 0, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(bid.id)
    .bind(bid.request_id)
    .bind(customer_id)
    .bind(bid.expert_id)
    .bind(bid.cost)
    .bind(bid.cost)
    .bind(deadline)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Order [{}] created from bid {} at {}", order.id, bid.id, order.base_price);
    Ok(order)
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, MarketplaceError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_for_bid(
    bid_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, MarketplaceError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE bid_id = $1").bind(bid_id).fetch_optional(conn).await?;
    Ok(order)
}

pub(crate) async fn update_order_status(
    id: i64,
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Order, MarketplaceError> {
    let status = status.to_string();
    let result: Option<Order> =
        sqlx::query_as("UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status)
            .bind(id)
            .fetch_optional(conn)
            .await?;
    result.ok_or(MarketplaceError::OrderNotFound(id))
}

/// Stamps the completion fields in one statement.
pub(crate) async fn mark_completed(
    id: i64,
    notes: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<Order, MarketplaceError> {
    let result: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'Completed', completed_at = CURRENT_TIMESTAMP, completion_notes = $1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $2
            RETURNING *
        "#,
    )
    .bind(notes)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(MarketplaceError::OrderNotFound(id))
}

/// Moves the order into its refunded terminal state, status and payment aggregate together.
pub(crate) async fn mark_refunded(id: i64, conn: &mut SqliteConnection) -> Result<Order, MarketplaceError> {
    let result: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'Refunded', payment_status = 'Refunded', updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING *
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(MarketplaceError::OrderNotFound(id))
}

/// Writes the derived financial fields. Only [`payments::sync_order_finances`](super::payments) calls this, so
/// the derivation rule lives in exactly one place.
pub(crate) async fn update_finances(
    id: i64,
    extra_price: Money,
    total_price: Money,
    payment_status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Order, MarketplaceError> {
    let result: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET extra_price = $1, total_price = $2, payment_status = $3, updated_at = CURRENT_TIMESTAMP
            WHERE id = $4
            RETURNING *
        "#,
    )
    .bind(extra_price)
    .bind(total_price)
    .bind(payment_status.to_string())
    .bind(id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(MarketplaceError::OrderNotFound(id))
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in ascending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM orders
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(customer_id) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(customer_id);
    }
    if let Some(expert_id) = query.expert_id {
        where_clause.push("expert_id = ");
        where_clause.push_bind_unseparated(expert_id);
    }
    if let Some(request_id) = query.request_id {
        where_clause.push("request_id = ");
        where_clause.push_bind_unseparated(request_id);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let mut statuses = vec![];
        query.status.as_ref().unwrap().iter().for_each(|s| {
            statuses.push(format!("'{s}'"));
        });
        let status_clause = statuses.join(",");
        where_clause.push(format!("status IN ({status_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");

    trace!("📝️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Order>();
    let orders = query.fetch_all(conn).await?;
    trace!("Result of search_orders: {:?}", orders.len());
    Ok(orders)
}
