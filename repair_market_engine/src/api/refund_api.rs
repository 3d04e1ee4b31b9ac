use std::fmt::Debug;

use futures_util::future::join_all;
use log::*;

use crate::{
    api::guards::{require_admin, require_customer},
    db_types::{Actor, Order, RefundDecision, RefundRequest},
    events::{EventProducers, RefundDecidedEvent, RefundRequestedEvent},
    traits::{MarketplaceDatabase, MarketplaceError},
};

/// `RefundApi` unwinds orders: a customer contests an order, an admin decides, and an approval reverses the
/// whole financial chain back to an open request.
pub struct RefundApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for RefundApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi")
    }
}

impl<B> RefundApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> RefundApi<B>
where B: MarketplaceDatabase
{
    /// Opens a refund request for the order's full current price. At most one refund may be outstanding per
    /// order; a second request fails with a conflict. The order's expert is notified.
    pub async fn request_refund(
        &self,
        order_id: i64,
        reason: &str,
        actor: &Actor,
    ) -> Result<RefundRequest, MarketplaceError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        require_customer(actor, order.customer_id, "request a refund on another customer's order")?;
        let refund =
            self.db.insert_refund_request(order_id, order.customer_id, Some(reason.to_string())).await?;
        self.call_refund_requested_hook(&refund, &order).await;
        debug!("↩️ Refund [{}] of {} requested on order {order_id}", refund.id, refund.amount);
        Ok(refund)
    }

    /// Records the admin's decision on a refund.
    ///
    /// Approval executes the full reversal as one transaction: every payment refunded, the order moved to its
    /// refunded terminal state, the payout deleted, the request reopened for bidding and the winning bid
    /// un-accepted. A rejection only stamps the decision. Customer and expert are notified either way.
    pub async fn decide_refund(
        &self,
        refund_id: i64,
        decision: RefundDecision,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<RefundRequest, MarketplaceError> {
        require_admin(actor, "decide a refund")?;
        let (refund, order) = self.db.decide_refund(refund_id, decision, notes).await?;
        self.call_refund_decided_hook(&refund, &order).await;
        debug!("↩️ Refund [{refund_id}] decided: {}", refund.status);
        Ok(refund)
    }

    /// Edits the free-text decision notes. Always allowed, even on decided refunds; no side effects.
    pub async fn update_decision_notes(
        &self,
        refund_id: i64,
        notes: &str,
        actor: &Actor,
    ) -> Result<RefundRequest, MarketplaceError> {
        require_admin(actor, "edit refund decision notes")?;
        self.db.update_refund_notes(refund_id, notes).await
    }

    async fn call_refund_requested_hook(&self, refund: &RefundRequest, order: &Order) {
        trace!("↩️ Notifying refund requested hook subscribers");
        let event = RefundRequestedEvent::new(refund.clone(), order.clone());
        join_all(self.producers.refund_requested_producer.iter().map(|emitter| emitter.publish_event(event.clone())))
            .await;
    }

    async fn call_refund_decided_hook(&self, refund: &RefundRequest, order: &Order) {
        trace!("↩️ Notifying refund decided hook subscribers");
        let event = RefundDecidedEvent::new(refund.clone(), order.clone());
        join_all(self.producers.refund_decided_producer.iter().map(|emitter| emitter.publish_event(event.clone())))
            .await;
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
