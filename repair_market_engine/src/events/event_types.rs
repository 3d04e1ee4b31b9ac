use serde::{Deserialize, Serialize};

use crate::db_types::{Bid, Order, Payout, RefundRequest, RefundStatus, Role};

/// A rendered message for the notification sink: who to tell, and what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: i64,
    pub user_type: Role,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidAcceptedEvent {
    pub bid: Bid,
    pub order: Order,
}

impl BidAcceptedEvent {
    pub fn new(bid: Bid, order: Order) -> Self {
        Self { bid, order }
    }

    /// The expert learns their bid won and an order now exists.
    pub fn notifications(&self) -> Vec<Notification> {
        vec![Notification {
            user_id: self.bid.expert_id,
            user_type: Role::Expert,
            title: "Bid accepted".to_string(),
            message: format!(
                "Your bid of {} on request {} was accepted. Order {} is due by {}.",
                self.bid.cost, self.bid.request_id, self.order.id, self.order.deadline
            ),
        }]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCompletedEvent {
    pub order: Order,
    pub payout: Payout,
}

impl OrderCompletedEvent {
    pub fn new(order: Order, payout: Payout) -> Self {
        Self { order, payout }
    }

    /// The customer is asked to confirm receipt.
    pub fn notifications(&self) -> Vec<Notification> {
        vec![Notification {
            user_id: self.order.customer_id,
            user_type: Role::Customer,
            title: "Order completed".to_string(),
            message: format!("Order {} has been marked completed. Please confirm receipt.", self.order.id),
        }]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequestedEvent {
    pub refund: RefundRequest,
    pub order: Order,
}

impl RefundRequestedEvent {
    pub fn new(refund: RefundRequest, order: Order) -> Self {
        Self { refund, order }
    }

    /// The expert hears that their order is being contested.
    pub fn notifications(&self) -> Vec<Notification> {
        vec![Notification {
            user_id: self.order.expert_id,
            user_type: Role::Expert,
            title: "Refund requested".to_string(),
            message: format!(
                "The customer has requested a refund of {} on order {}.",
                self.refund.amount, self.order.id
            ),
        }]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundDecidedEvent {
    pub refund: RefundRequest,
    pub order: Order,
}

impl RefundDecidedEvent {
    pub fn new(refund: RefundRequest, order: Order) -> Self {
        Self { refund, order }
    }

    /// Customer and expert both hear the outcome, whichever way it went.
    pub fn notifications(&self) -> Vec<Notification> {
        let outcome = match self.refund.status {
            RefundStatus::Approved => "approved",
            RefundStatus::Rejected => "rejected",
            RefundStatus::Requested => "pending",
        };
        let message = format!("The refund of {} on order {} was {outcome}.", self.refund.amount, self.order.id);
        vec![
            Notification {
                user_id: self.order.customer_id,
                user_type: Role::Customer,
                title: "Refund decision".to_string(),
                message: message.clone(),
            },
            Notification {
                user_id: self.order.expert_id,
                user_type: Role::Expert,
                title: "Refund decision".to_string(),
                message,
            },
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    BidAccepted(BidAcceptedEvent),
    OrderCompleted(OrderCompletedEvent),
    RefundRequested(RefundRequestedEvent),
    RefundDecided(RefundDecidedEvent),
}
