//! `SqliteDatabase` is a concrete implementation of a repair market engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`traits`] module.
//!
//! Every multi-entity operation opens one transaction, re-verifies entity state inside it (callers' pre-checks
//! are advisory), composes the functions from [`super::db`], and commits. An early error return drops the
//! transaction, which rolls the whole operation back.
use std::fmt::Debug;

use chrono::Utc;
use log::*;
use rme_common::Money;
use sqlx::SqlitePool;

use super::db::{bids, db_url, new_pool, orders, payments, payouts, refunds, requests, service_types};
use crate::{
    api::order_objects::OrderQueryFilter,
    db_types::{
        Bid,
        NewBid,
        NewRequest,
        NewServiceType,
        Order,
        OrderStatus,
        Payment,
        PaymentKind,
        PaymentState,
        PaymentStatus,
        Payout,
        PayoutStatus,
        RefundDecision,
        RefundRequest,
        Request,
        RequestStatus,
        ServiceType,
    },
    helpers::{deadline_after, settlement_reference},
    traits::{MarketReads, MarketplaceDatabase, MarketplaceError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl MarketplaceDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_service_type(&self, service_type: NewServiceType) -> Result<ServiceType, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let service_type = service_types::insert_service_type(service_type, &mut conn).await?;
        debug!("🗃️ Service type [{}] registered at {}%", service_type.name, service_type.commission_percent);
        Ok(service_type)
    }

    async fn insert_request(&self, request: NewRequest) -> Result<Request, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let request = requests::insert_request(request, &mut conn).await?;
        Ok(request)
    }

    async fn open_request_for_bidding(&self, request_id: i64) -> Result<Request, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let request =
            requests::fetch_request(request_id, &mut tx).await?.ok_or(MarketplaceError::RequestNotFound(request_id))?;
        if request.status != RequestStatus::Pending {
            return Err(MarketplaceError::invalid_state(format!(
                "Request {request_id} is {} and cannot be opened for bidding",
                request.status
            )));
        }
        let request = requests::update_request_status(request_id, RequestStatus::Bidding, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Request [{request_id}] is now open for bidding");
        Ok(request)
    }

    async fn reject_request(&self, request_id: i64) -> Result<Request, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let request =
            requests::fetch_request(request_id, &mut tx).await?.ok_or(MarketplaceError::RequestNotFound(request_id))?;
        if !matches!(request.status, RequestStatus::Pending | RequestStatus::Bidding) {
            return Err(MarketplaceError::invalid_state(format!(
                "Request {request_id} is {} and cannot be rejected",
                request.status
            )));
        }
        let request = requests::update_request_status(request_id, RequestStatus::Rejected, &mut tx).await?;
        tx.commit().await?;
        Ok(request)
    }

    async fn insert_bid(&self, bid: NewBid) -> Result<Bid, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let request = requests::fetch_request(bid.request_id, &mut tx)
            .await?
            .ok_or(MarketplaceError::RequestNotFound(bid.request_id))?;
        if request.status != RequestStatus::Bidding {
            return Err(MarketplaceError::RequestNotBiddable(request.id));
        }
        let bid = bids::insert_bid(bid, &mut tx).await?;
        tx.commit().await?;
        Ok(bid)
    }

    /// Accepts a bid and creates the order, atomically. The request's status is re-read inside the transaction,
    /// so of two concurrent acceptances on the same request, the loser finds the request already `Closed` and
    /// the whole call rolls back with [`MarketplaceError::RequestNotBiddable`].
    async fn accept_bid(&self, bid_id: i64) -> Result<(Bid, Order), MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let bid = bids::fetch_bid(bid_id, &mut tx).await?.ok_or(MarketplaceError::BidNotFound(bid_id))?;
        let request = requests::fetch_request(bid.request_id, &mut tx)
            .await?
            .ok_or(MarketplaceError::RequestNotFound(bid.request_id))?;
        if request.status != RequestStatus::Bidding {
            return Err(MarketplaceError::RequestNotBiddable(request.id));
        }
        bids::clear_accepted_for_request(request.id, &mut tx).await?;
        let bid = bids::set_accepted(bid_id, true, &mut tx).await?;
        requests::update_request_status(request.id, RequestStatus::Closed, &mut tx).await?;
        let deadline = deadline_after(Utc::now(), bid.duration, bid.duration_unit);
        let order = orders::insert_order_for_bid(&bid, request.customer_id, deadline, &mut tx).await?;
        payments::insert_payment(order.id, PaymentKind::Initial, bid.cost, None, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Bid [{bid_id}] accepted. Order [{}] created with deadline {}", order.id, order.deadline);
        Ok((bid, order))
    }

    async fn add_extra_payment(
        &self,
        order_id: i64,
        amount: Money,
        reason: Option<String>,
    ) -> Result<(Payment, Order), MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        if order.status != OrderStatus::InProgress {
            return Err(MarketplaceError::invalid_state(format!(
                "Order {order_id} is {} and no longer accepts extra charges",
                order.status
            )));
        }
        let payment = payments::insert_payment(order_id, PaymentKind::Extra, amount, reason, &mut tx).await?;
        let order = payments::sync_order_finances(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok((payment, order))
    }

    async fn update_extra_payment(
        &self,
        payment_id: i64,
        amount: Money,
        reason: Option<String>,
    ) -> Result<(Payment, Order), MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let payment =
            payments::fetch_payment(payment_id, &mut tx).await?.ok_or(MarketplaceError::PaymentNotFound(payment_id))?;
        let order = orders::fetch_order(payment.order_id, &mut tx)
            .await?
            .ok_or(MarketplaceError::OrderNotFound(payment.order_id))?;
        if order.status != OrderStatus::InProgress {
            return Err(MarketplaceError::invalid_state(format!(
                "Order {} is {} and its charges can no longer change",
                order.id, order.status
            )));
        }
        let payment = payments::update_pending_extra(payment_id, amount, reason, &mut tx).await?;
        let order = payments::sync_order_finances(order.id, &mut tx).await?;
        tx.commit().await?;
        Ok((payment, order))
    }

    async fn delete_extra_payment(&self, payment_id: i64) -> Result<Order, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let payment =
            payments::fetch_payment(payment_id, &mut tx).await?.ok_or(MarketplaceError::PaymentNotFound(payment_id))?;
        let order = orders::fetch_order(payment.order_id, &mut tx)
            .await?
            .ok_or(MarketplaceError::OrderNotFound(payment.order_id))?;
        if order.status != OrderStatus::InProgress {
            return Err(MarketplaceError::invalid_state(format!(
                "Order {} is {} and its charges can no longer change",
                order.id, order.status
            )));
        }
        payments::delete_pending_extra(payment_id, &mut tx).await?;
        let order = payments::sync_order_finances(order.id, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn apply_charge(&self, payment_id: i64, transaction_ref: &str) -> Result<(Payment, Order), MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::mark_paid(payment_id, transaction_ref, &mut tx).await?;
        let order = payments::sync_order_finances(payment.order_id, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Payment [{payment_id}] settled as {transaction_ref}. Order {} is now {}",
            order.id, order.payment_status
        );
        Ok((payment, order))
    }

    async fn settle_order(&self, order_id: i64) -> Result<Order, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        if order.status.is_terminal() {
            return Err(MarketplaceError::invalid_state(format!(
                "Order {order_id} is {} and cannot be settled",
                order.status
            )));
        }
        let ledger = payments::fetch_payments_for_order(order_id, &mut tx).await?;
        let now = Utc::now();
        let mut settled = 0;
        for payment in ledger.iter().filter(|p| p.status == PaymentState::Pending) {
            let reference = settlement_reference(order_id, payment.id, now);
            payments::mark_paid(payment.id, &reference, &mut tx).await?;
            settled += 1;
        }
        let order = payments::sync_order_finances(order_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{order_id}] settled internally: {settled} payments marked paid");
        Ok(order)
    }

    async fn complete_order(&self, order_id: i64, notes: Option<String>) -> Result<(Order, Payout), MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        if order.status != OrderStatus::InProgress {
            return Err(MarketplaceError::invalid_state(format!(
                "Order {order_id} is {} and cannot be completed",
                order.status
            )));
        }
        if order.payment_status != PaymentStatus::FullyPaid {
            return Err(MarketplaceError::invalid_state(format!(
                "Order {order_id} is {} and must be fully paid before completion",
                order.payment_status
            )));
        }
        let order = orders::mark_completed(order_id, notes, &mut tx).await?;
        let request = requests::fetch_request(order.request_id, &mut tx)
            .await?
            .ok_or(MarketplaceError::RequestNotFound(order.request_id))?;
        let service_type = service_types::fetch_service_type(request.service_type_id, &mut tx)
            .await?
            .ok_or(MarketplaceError::ServiceTypeNotFound(request.service_type_id))?;
        let ledger = payments::fetch_payments_for_order(order_id, &mut tx).await?;
        let (total_payment, commission, net_payout) =
            payouts::commission_split(&ledger, service_type.commission_percent);
        let payout =
            payouts::upsert_payout(order_id, order.expert_id, total_payment, commission, net_payout, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Order [{order_id}] completed. Payout of {} is pending for expert {}",
            payout.net_payout, order.expert_id
        );
        Ok((order, payout))
    }

    async fn deliver_order(&self, order_id: i64) -> Result<(Order, Option<Payout>), MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        if order.status != OrderStatus::Completed {
            return Err(MarketplaceError::invalid_state(format!(
                "Order {order_id} is {} and cannot be marked delivered",
                order.status
            )));
        }
        let order = orders::update_order_status(order_id, OrderStatus::Delivered, &mut tx).await?;
        let payout = match payouts::fetch_payout_for_order(order_id, &mut tx).await? {
            Some(payout) if payout.status == PayoutStatus::Pending => {
                Some(payouts::release_payout(payout.id, &mut tx).await?)
            },
            other => other,
        };
        tx.commit().await?;
        debug!("🗃️ Order [{order_id}] delivered");
        Ok((order, payout))
    }

    async fn release_payout(&self, payout_id: i64) -> Result<(Payout, Order), MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let payout = payouts::release_payout(payout_id, &mut tx).await?;
        let order = orders::fetch_order(payout.order_id, &mut tx)
            .await?
            .ok_or(MarketplaceError::OrderNotFound(payout.order_id))?;
        // Releasing the money implies the customer has their repair; pull the order along to Delivered.
        let order = if order.status == OrderStatus::Completed {
            orders::update_order_status(order.id, OrderStatus::Delivered, &mut tx).await?
        } else {
            order
        };
        tx.commit().await?;
        debug!("🗃️ Payout [{payout_id}] of {} released to expert {}", payout.net_payout, payout.expert_id);
        Ok((payout, order))
    }

    async fn insert_refund_request(
        &self,
        order_id: i64,
        customer_id: i64,
        reason: Option<String>,
    ) -> Result<RefundRequest, MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        if refunds::fetch_open_refund_for_order(order_id, &mut tx).await?.is_some() {
            return Err(MarketplaceError::RefundAlreadyOpen(order_id));
        }
        let refund = refunds::insert_refund(order_id, customer_id, order.total_price, reason, &mut tx).await?;
        tx.commit().await?;
        Ok(refund)
    }

    async fn decide_refund(
        &self,
        refund_id: i64,
        decision: RefundDecision,
        notes: Option<String>,
    ) -> Result<(RefundRequest, Order), MarketplaceError> {
        let mut tx = self.pool.begin().await?;
        refunds::fetch_refund(refund_id, &mut tx).await?.ok_or(MarketplaceError::RefundNotFound(refund_id))?;
        let refund = refunds::decide(refund_id, decision.into(), notes, &mut tx).await?;
        let order = orders::fetch_order(refund.order_id, &mut tx)
            .await?
            .ok_or(MarketplaceError::OrderNotFound(refund.order_id))?;
        let order = match decision {
            RefundDecision::Rejected => order,
            RefundDecision::Approved => {
                payments::mark_all_refunded(order.id, &mut tx).await?;
                let order = orders::mark_refunded(order.id, &mut tx).await?;
                let removed = payouts::delete_payout_for_order(order.id, &mut tx).await?;
                requests::update_request_status(order.request_id, RequestStatus::Bidding, &mut tx).await?;
                bids::set_accepted(order.bid_id, false, &mut tx).await?;
                debug!(
                    "↩️ Refund [{refund_id}] approved: order {} reversed, {removed} payout(s) removed, request {} \
                     reopened for bidding",
                    order.id, order.request_id
                );
                order
            },
        };
        tx.commit().await?;
        Ok((refund, order))
    }

    async fn update_refund_notes(&self, refund_id: i64, notes: &str) -> Result<RefundRequest, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        refunds::update_notes(refund_id, notes, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), MarketplaceError> {
        self.pool.close().await;
        Ok(())
    }
}

impl MarketReads for SqliteDatabase {
    async fn fetch_service_type(&self, id: i64) -> Result<Option<ServiceType>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        service_types::fetch_service_type(id, &mut conn).await
    }

    async fn fetch_request(&self, id: i64) -> Result<Option<Request>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_request(id, &mut conn).await
    }

    async fn fetch_bid(&self, id: i64) -> Result<Option<Bid>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        bids::fetch_bid(id, &mut conn).await
    }

    async fn fetch_bids_for_request(&self, request_id: i64) -> Result<Vec<Bid>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        bids::fetch_bids_for_request(request_id, &mut conn).await
    }

    async fn fetch_accepted_bid(&self, request_id: i64) -> Result<Option<Bid>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        bids::fetch_accepted_bid(request_id, &mut conn).await
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(id, &mut conn).await
    }

    async fn fetch_order_for_bid(&self, bid_id: i64) -> Result<Option<Order>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_for_bid(bid_id, &mut conn).await
    }

    async fn fetch_payment(&self, id: i64) -> Result<Option<Payment>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(id, &mut conn).await
    }

    async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payments_for_order(order_id, &mut conn).await
    }

    async fn fetch_payout_for_order(&self, order_id: i64) -> Result<Option<Payout>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        payouts::fetch_payout_for_order(order_id, &mut conn).await
    }

    async fn fetch_payout(&self, id: i64) -> Result<Option<Payout>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        payouts::fetch_payout(id, &mut conn).await
    }

    async fn fetch_refund(&self, id: i64) -> Result<Option<RefundRequest>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        refunds::fetch_refund(id, &mut conn).await
    }

    async fn fetch_open_refund_for_order(&self, order_id: i64) -> Result<Option<RefundRequest>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        refunds::fetch_open_refund_for_order(order_id, &mut conn).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
