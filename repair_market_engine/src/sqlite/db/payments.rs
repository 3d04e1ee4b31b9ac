//! The payment ledger.
//!
//! An order's `extra_price`, `total_price` and `payment_status` are never written directly by flow code: every
//! ledger mutation ends with a call to [`sync_order_finances`], which re-reads the full payment set inside the
//! caller's transaction and re-derives all three fields via [`derive_payment_status`]. That function is the only
//! place the aggregation rule exists.

use log::{debug, trace};
use rme_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Order, Payment, PaymentKind, PaymentState, PaymentStatus},
    traits::MarketplaceError,
};

pub(crate) async fn insert_payment(
    order_id: i64,
    kind: PaymentKind,
    amount: Money,
    reason: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<Payment, MarketplaceError> {
    let payment: Payment = sqlx::query_as(
        r#"
            INSERT INTO payments (order_id, kind, amount, reason)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(kind.to_string())
    .bind(amount)
    .bind(reason)
    .fetch_one(conn)
    .await?;
    debug!("💰️ Payment [{}] ({kind}, {amount}) appended to order {order_id}", payment.id);
    Ok(payment)
}

pub async fn fetch_payment(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, MarketplaceError> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payment)
}

pub async fn fetch_payments_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, MarketplaceError> {
    let payments = sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(payments)
}

/// Marks a pending payment paid, stamping `paid_at` and the transaction reference. The `status = 'Pending'`
/// guard makes double-settlement a visible error rather than a silent overwrite.
pub(crate) async fn mark_paid(
    payment_id: i64,
    transaction_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Payment, MarketplaceError> {
    let payment: Option<Payment> = sqlx::query_as(
        r#"
            UPDATE payments
            SET status = 'Paid', paid_at = CURRENT_TIMESTAMP, transaction_ref = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = 'Pending'
            RETURNING *
        "#,
    )
    .bind(transaction_ref)
    .bind(payment_id)
    .fetch_optional(conn)
    .await?;
    payment.ok_or_else(|| {
        MarketplaceError::invalid_state(format!("Payment {payment_id} is not pending and cannot be settled"))
    })
}

pub(crate) async fn update_pending_extra(
    payment_id: i64,
    amount: Money,
    reason: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<Payment, MarketplaceError> {
    let payment: Option<Payment> = sqlx::query_as(
        r#"
            UPDATE payments
            SET amount = $1, reason = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status = 'Pending' AND kind = 'Extra'
            RETURNING *
        "#,
    )
    .bind(amount)
    .bind(reason)
    .bind(payment_id)
    .fetch_optional(conn)
    .await?;
    payment.ok_or_else(|| {
        MarketplaceError::invalid_state(format!("Payment {payment_id} is not a pending extra charge"))
    })
}

pub(crate) async fn delete_pending_extra(
    payment_id: i64,
    conn: &mut SqliteConnection,
) -> Result<(), MarketplaceError> {
    let result = sqlx::query("DELETE FROM payments WHERE id = $1 AND status = 'Pending' AND kind = 'Extra'")
        .bind(payment_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(MarketplaceError::invalid_state(format!(
            "Payment {payment_id} is not a pending extra charge"
        )));
    }
    debug!("💰️ Pending extra payment [{payment_id}] withdrawn");
    Ok(())
}

/// Flips every payment on the order to `Refunded`. Part of the refund-approval transaction.
pub(crate) async fn mark_all_refunded(order_id: i64, conn: &mut SqliteConnection) -> Result<u64, MarketplaceError> {
    let result =
        sqlx::query("UPDATE payments SET status = 'Refunded', updated_at = CURRENT_TIMESTAMP WHERE order_id = $1")
            .bind(order_id)
            .execute(conn)
            .await?;
    debug!("💰️ {} payments on order {order_id} marked refunded", result.rows_affected());
    Ok(result.rows_affected())
}

/// The aggregation rule, as a pure function of an order's payment set.
///
/// `FullyPaid` requires that nothing is pending *and* the paid total covers the order price; a paid total with
/// an outstanding pending charge is only `PartiallyPaid`. Refunded payments count toward neither sum. The
/// function is idempotent by construction: it reads the ledger and nothing else.
pub fn derive_payment_status(payments: &[Payment], total_price: Money) -> PaymentStatus {
    let paid: Money = payments.iter().filter(|p| p.status == PaymentState::Paid).map(|p| p.amount).sum();
    let pending_exists = payments.iter().any(|p| p.status == PaymentState::Pending);
    if !pending_exists && paid >= total_price && paid.is_positive() {
        PaymentStatus::FullyPaid
    } else if paid.is_positive() {
        PaymentStatus::PartiallyPaid
    } else {
        PaymentStatus::Unpaid
    }
}

/// Re-derives an order's financial fields from its full payment set, inside the caller's transaction.
///
/// `extra_price` is the sum of extra charges still on the books (pending + paid), `total_price` is
/// `base_price + extra_price`, and `payment_status` follows [`derive_payment_status`]. Call this after every
/// payment create/update/delete; calling it again with an unchanged ledger is a no-op.
pub(crate) async fn sync_order_finances(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Order, MarketplaceError> {
    let order =
        super::orders::fetch_order(order_id, conn).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
    let payments = fetch_payments_for_order(order_id, conn).await?;
    let extra_price: Money = payments
        .iter()
        .filter(|p| p.kind == PaymentKind::Extra && p.status != PaymentState::Refunded)
        .map(|p| p.amount)
        .sum();
    let total_price = order.base_price + extra_price;
    let payment_status = derive_payment_status(&payments, total_price);
    trace!(
        "💰️ Order {order_id} finances resync: extra {extra_price}, total {total_price}, status {payment_status}"
    );
    super::orders::update_finances(order_id, extra_price, total_price, payment_status, conn).await
}
