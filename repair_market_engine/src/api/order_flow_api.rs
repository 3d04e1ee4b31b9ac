use std::fmt::Debug;

use futures_util::future::join_all;
use log::*;
use rme_common::Money;

use crate::{
    api::guards::{require_admin, require_customer, require_expert},
    db_types::{Actor, Order, Payment, PaymentState, Payout},
    events::{EventProducers, OrderCompletedEvent},
    helpers::is_valid_phone,
    traits::{MarketplaceDatabase, MarketplaceError, PaymentGateway},
};

/// `OrderFlowApi` is the primary API for an order's financial life: extra charges, payment collection,
/// completion gating, delivery and payout release.
///
/// Order status only ever moves forward, except the refund short-circuit owned by
/// [`RefundApi`](crate::RefundApi):
///
/// | From \ To   | Completed | Delivered | Refunded |
/// |-------------|-----------|-----------|----------|
/// | InProgress  | 1         | Err       | refund   |
/// | Completed   | Err       | 2         | refund   |
/// | Delivered   | Err       | Err       | Err      |
///
/// ### (1) `InProgress` to `Completed`
/// Requires the ledger to be fully paid. The expert's payout is computed in the same transaction.
///
/// ### (2) `Completed` to `Delivered`
/// The customer confirms receipt; a pending payout is released as a side effect. Releasing a payout directly
/// also advances the order here.
pub struct OrderFlowApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
}

impl<B, G> Debug for OrderFlowApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B, G> OrderFlowApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers }
    }
}

impl<B, G> OrderFlowApi<B, G>
where
    B: MarketplaceDatabase,
    G: PaymentGateway,
{
    /// The order's expert asks for an additional charge (parts, extra labour). Creates a pending `Extra`
    /// payment; the order's `extra_price`, `total_price` and `payment_status` are re-derived in the same
    /// transaction, so `total_price = base_price + extra_price` holds when this returns.
    pub async fn request_additional_payment(
        &self,
        order_id: i64,
        amount: Money,
        reason: &str,
        actor: &Actor,
    ) -> Result<(Payment, Order), MarketplaceError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        require_expert(actor, order.expert_id, "request an additional payment on another expert's order")?;
        if !amount.is_positive() {
            return Err(MarketplaceError::ValidationError("Payment amount must be positive".to_string()));
        }
        let (payment, order) = self.db.add_extra_payment(order_id, amount, Some(reason.to_string())).await?;
        debug!("🔄️💰️ Extra charge of {amount} added to order {order_id}. Total is now {}", order.total_price);
        Ok((payment, order))
    }

    /// Amends a pending extra charge. Only the expert who owns the order may amend, only while the charge is
    /// pending and the order in progress; the derived fields are recomputed afterwards.
    pub async fn update_additional_payment(
        &self,
        payment_id: i64,
        amount: Money,
        reason: &str,
        actor: &Actor,
    ) -> Result<(Payment, Order), MarketplaceError> {
        let payment = self.db.fetch_payment(payment_id).await?.ok_or(MarketplaceError::PaymentNotFound(payment_id))?;
        let order =
            self.db.fetch_order(payment.order_id).await?.ok_or(MarketplaceError::OrderNotFound(payment.order_id))?;
        require_expert(actor, order.expert_id, "amend a charge on another expert's order")?;
        if !amount.is_positive() {
            return Err(MarketplaceError::ValidationError("Payment amount must be positive".to_string()));
        }
        self.db.update_extra_payment(payment_id, amount, Some(reason.to_string())).await
    }

    /// Withdraws a pending extra charge and recomputes the order's derived fields.
    pub async fn delete_additional_payment(&self, payment_id: i64, actor: &Actor) -> Result<Order, MarketplaceError> {
        let payment = self.db.fetch_payment(payment_id).await?.ok_or(MarketplaceError::PaymentNotFound(payment_id))?;
        let order =
            self.db.fetch_order(payment.order_id).await?.ok_or(MarketplaceError::OrderNotFound(payment.order_id))?;
        require_expert(actor, order.expert_id, "withdraw a charge on another expert's order")?;
        self.db.delete_extra_payment(payment_id).await
    }

    /// Collects one pending payment through the payment gateway.
    ///
    /// The charge is sent *before* any database transaction opens. A gateway rejection, cancellation or
    /// timeout surfaces as a payment error and the ledger is untouched; only a successful charge reaches the
    /// store, where the payment is stamped paid and the order's payment status re-derived atomically.
    pub async fn pay(&self, payment_id: i64, phone: &str, actor: &Actor) -> Result<(Payment, Order), MarketplaceError> {
        let payment = self.db.fetch_payment(payment_id).await?.ok_or(MarketplaceError::PaymentNotFound(payment_id))?;
        let order =
            self.db.fetch_order(payment.order_id).await?.ok_or(MarketplaceError::OrderNotFound(payment.order_id))?;
        require_customer(actor, order.customer_id, "pay for another customer's order")?;
        if payment.status != PaymentState::Pending {
            return Err(MarketplaceError::invalid_state(format!("Payment {payment_id} is not awaiting payment")));
        }
        if !is_valid_phone(phone) {
            return Err(MarketplaceError::ValidationError(format!("'{phone}' is not a valid phone number")));
        }
        let reference = format!("order-{}-payment-{payment_id}", order.id);
        let receipt = self.gateway.charge(phone, payment.amount, &reference).await?;
        trace!("🔄️💰️ Gateway accepted charge {reference} as {}", receipt.reference_id);
        let (payment, order) = self.db.apply_charge(payment_id, &receipt.reference_id).await?;
        debug!(
            "🔄️💰️ Payment [{payment_id}] of {} collected for order {}. Order is {}",
            payment.amount, order.id, order.payment_status
        );
        Ok((payment, order))
    }

    /// Settles every pending payment on the order internally, without a gateway charge. Admin only; used for
    /// charges collected out of band. References are deterministic so a replayed settlement is traceable.
    pub async fn settle_order(&self, order_id: i64, actor: &Actor) -> Result<Order, MarketplaceError> {
        require_admin(actor, "settle an order internally")?;
        self.db.settle_order(order_id).await
    }

    /// The expert marks the work done. Requires a fully paid ledger and an in-progress order; stamps
    /// `completed_at`, stores the notes and computes the payout in one transaction. The customer is notified.
    pub async fn mark_completed(
        &self,
        order_id: i64,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<(Order, Payout), MarketplaceError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        require_expert(actor, order.expert_id, "complete another expert's order")?;
        let (order, payout) = self.db.complete_order(order_id, notes).await?;
        self.call_order_completed_hook(&order, &payout).await;
        debug!("🔄️✅️ Order [{order_id}] completed. Payout of {} pending", payout.net_payout);
        Ok((order, payout))
    }

    /// The customer confirms receipt. Requires a completed order; releases the pending payout when one exists.
    pub async fn mark_delivered(
        &self,
        order_id: i64,
        actor: &Actor,
    ) -> Result<(Order, Option<Payout>), MarketplaceError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        require_customer(actor, order.customer_id, "confirm delivery of another customer's order")?;
        let (order, payout) = self.db.deliver_order(order_id).await?;
        debug!("🔄️✅️ Order [{order_id}] delivered");
        Ok((order, payout))
    }

    /// Releases a pending payout to its expert. Admin only. Advances the order to `Delivered` if the customer
    /// has not confirmed yet.
    pub async fn release_payout(&self, payout_id: i64, actor: &Actor) -> Result<(Payout, Order), MarketplaceError> {
        require_admin(actor, "release a payout")?;
        self.db.release_payout(payout_id).await
    }

    async fn call_order_completed_hook(&self, order: &Order, payout: &Payout) {
        trace!("🔄️✅️ Notifying order completed hook subscribers");
        let event = OrderCompletedEvent::new(order.clone(), payout.clone());
        join_all(self.producers.order_completed_producer.iter().map(|emitter| emitter.publish_event(event.clone())))
            .await;
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
