use log::debug;
use rme_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Payment, PaymentState, Payout},
    traits::MarketplaceError,
};

/// Computes the commission split for a completed order's ledger. `total_payment` is the sum of paid charges;
/// the commission is rounded to the cent before the net is taken so that
/// `net_payout = total_payment - commission` holds exactly.
pub fn commission_split(payments: &[Payment], commission_percent: f64) -> (Money, Money, Money) {
    let total_payment: Money =
        payments.iter().filter(|p| p.status == PaymentState::Paid).map(|p| p.amount).sum();
    let commission = total_payment.percentage(commission_percent);
    let net_payout = total_payment - commission;
    (total_payment, commission, net_payout)
}

/// Creates or overwrites the single payout row for the order. Re-completion after a refund cycle recomputes the
/// figures and resets the payout to `Pending`; it never produces a second row.
pub(crate) async fn upsert_payout(
    order_id: i64,
    expert_id: i64,
    total_payment: Money,
    commission: Money,
    net_payout: Money,
    conn: &mut SqliteConnection,
) -> Result<Payout, MarketplaceError> {
    let payout: Payout = sqlx::query_as(
        r#"
            INSERT INTO payouts (order_id, expert_id, total_payment, commission, net_payout)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO UPDATE SET
                expert_id = excluded.expert_id,
                total_payment = excluded.total_payment,
                commission = excluded.commission,
                net_payout = excluded.net_payout,
                status = 'Pending',
                released_at = NULL,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(expert_id)
    .bind(total_payment)
    .bind(commission)
    .bind(net_payout)
    .fetch_one(conn)
    .await?;
    debug!("💰️ Payout [{}] for order {order_id}: {total_payment} - {commission} = {net_payout}", payout.id);
    Ok(payout)
}

pub async fn fetch_payout(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payout>, MarketplaceError> {
    let payout = sqlx::query_as("SELECT * FROM payouts WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payout)
}

pub async fn fetch_payout_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, MarketplaceError> {
    let payout =
        sqlx::query_as("SELECT * FROM payouts WHERE order_id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(payout)
}

/// Releases a pending payout. The `status = 'Pending'` guard turns a double release into a typed error.
pub(crate) async fn release_payout(payout_id: i64, conn: &mut SqliteConnection) -> Result<Payout, MarketplaceError> {
    let payout: Option<Payout> = sqlx::query_as(
        r#"
            UPDATE payouts
            SET status = 'Released', released_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Pending'
            RETURNING *
        "#,
    )
    .bind(payout_id)
    .fetch_optional(conn)
    .await?;
    payout.ok_or_else(|| {
        MarketplaceError::invalid_state(format!("Payout {payout_id} is not pending and cannot be released"))
    })
}

/// Removes the order's payout row, if any. Part of the refund-approval transaction.
pub(crate) async fn delete_payout_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<u64, MarketplaceError> {
    let result = sqlx::query("DELETE FROM payouts WHERE order_id = $1").bind(order_id).execute(conn).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db_types::PaymentKind;

    fn paid(amount: i64) -> Payment {
        let now = Utc::now();
        Payment {
            id: 0,
            order_id: 1,
            kind: PaymentKind::Initial,
            amount: Money::from_cents(amount),
            reason: None,
            status: PaymentState::Paid,
            paid_at: Some(now),
            transaction_ref: Some("ref".into()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn ten_percent_of_a_hundred() {
        let (total, commission, net) = commission_split(&[paid(10_000)], 10.0);
        assert_eq!(total, Money::from_units(100));
        assert_eq!(commission, Money::from_units(10));
        assert_eq!(net, Money::from_units(90));
    }

    #[test]
    fn net_is_exactly_total_minus_commission_despite_rounding() {
        // 12.5% of 99.99 is 12.49875; the commission rounds, the net absorbs the remainder.
        let (total, commission, net) = commission_split(&[paid(9_999)], 12.5);
        assert_eq!(total, Money::from_cents(9_999));
        assert_eq!(commission, Money::from_cents(1_250));
        assert_eq!(net, total - commission);
    }

    #[test]
    fn pending_payments_are_excluded_from_the_split() {
        let mut pending = paid(5_000);
        pending.status = PaymentState::Pending;
        let (total, _, _) = commission_split(&[paid(10_000), pending], 10.0);
        assert_eq!(total, Money::from_cents(10_000));
    }

    #[test]
    fn zero_commission_pays_out_everything() {
        let (total, commission, net) = commission_split(&[paid(10_000)], 0.0);
        assert_eq!(commission, Money::from_cents(0));
        assert_eq!(net, total);
    }
}
