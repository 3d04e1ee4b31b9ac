use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
pub use rme_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(String);

//--------------------------------------        Role         ---------------------------------------------------------
/// The role attached to an authenticated caller. The request-handling layer authenticates users; the engine only
/// ever sees an [`Actor`] carrying one of these roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum Role {
    Customer,
    Expert,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Customer => write!(f, "Customer"),
            Role::Expert => write!(f, "Expert"),
            Role::Admin => write!(f, "Admin"),
        }
    }
}

//--------------------------------------       Actor         ---------------------------------------------------------
/// A role-tagged capability identifying who is performing an operation.
///
/// Every API call takes an `Actor` and runs exactly one ownership check against it. Admins pass every ownership
/// check; customers and experts only pass checks against their own id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl Actor {
    pub fn customer(id: i64) -> Self {
        Self { id, role: Role::Customer }
    }

    pub fn expert(id: i64) -> Self {
        Self { id, role: Role::Expert }
    }

    pub fn admin(id: i64) -> Self {
        Self { id, role: Role::Admin }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True if this actor may act as the customer owning `customer_id`.
    pub fn owns_as_customer(&self, customer_id: i64) -> bool {
        self.is_admin() || (self.role == Role::Customer && self.id == customer_id)
    }

    /// True if this actor may act as the expert owning `expert_id`.
    pub fn owns_as_expert(&self, expert_id: i64) -> bool {
        self.is_admin() || (self.role == Role::Expert && self.id == expert_id)
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} #{}", self.role, self.id)
    }
}

//--------------------------------------     ServiceType     ---------------------------------------------------------
/// A category of repair work. The platform's commission on an order is defined per service type and read at payout
/// computation time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ServiceType {
    pub id: i64,
    pub name: String,
    pub commission_percent: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewServiceType {
    pub name: String,
    pub commission_percent: f64,
}

impl NewServiceType {
    pub fn new<S: Into<String>>(name: S, commission_percent: f64) -> Self {
        Self { name: name.into(), commission_percent }
    }
}

//--------------------------------------   RequestStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Submitted by a customer, not yet open for bidding.
    Pending,
    /// Open: experts may place bids.
    Bidding,
    /// A bid has been accepted and an order exists. Refund approval moves the request back to `Bidding`.
    Closed,
    /// Declined by an admin. Terminal.
    Rejected,
}

impl Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "Pending"),
            RequestStatus::Bidding => write!(f, "Bidding"),
            RequestStatus::Closed => write!(f, "Closed"),
            RequestStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

impl FromStr for RequestStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Bidding" => Ok(Self::Bidding),
            "Closed" => Ok(Self::Closed),
            "Rejected" => Ok(Self::Rejected),
            s => Err(ConversionError(format!("Invalid request status: {s}"))),
        }
    }
}

impl From<String> for RequestStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid request status: {value}. But this conversion cannot fail. Defaulting to Pending");
            RequestStatus::Pending
        })
    }
}

//--------------------------------------      Request        ---------------------------------------------------------
/// A customer-submitted repair job. Requests collect bids while `Bidding` and close when one is accepted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Request {
    pub id: i64,
    pub customer_id: i64,
    pub service_type_id: i64,
    pub title: String,
    pub details: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRequest {
    pub customer_id: i64,
    pub service_type_id: i64,
    pub title: String,
    pub details: Option<String>,
}

impl NewRequest {
    pub fn new<S: Into<String>>(customer_id: i64, service_type_id: i64, title: S) -> Self {
        Self { customer_id, service_type_id, title: title.into(), details: None }
    }

    pub fn with_details<S: Into<String>>(mut self, details: S) -> Self {
        self.details = Some(details.into());
        self
    }
}

//--------------------------------------    DurationUnit     ---------------------------------------------------------
/// The unit a bid's duration is quoted in. Unrecognized units fall back to days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum DurationUnit {
    Hours,
    Days,
    Weeks,
}

impl Display for DurationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DurationUnit::Hours => write!(f, "Hours"),
            DurationUnit::Days => write!(f, "Days"),
            DurationUnit::Weeks => write!(f, "Weeks"),
        }
    }
}

impl FromStr for DurationUnit {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" | "hours" => Ok(Self::Hours),
            "day" | "days" => Ok(Self::Days),
            "week" | "weeks" => Ok(Self::Weeks),
            s => Err(ConversionError(format!("Invalid duration unit: {s}"))),
        }
    }
}

impl From<String> for DurationUnit {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid duration unit: {value}. Defaulting to Days");
            DurationUnit::Days
        })
    }
}

//--------------------------------------        Bid          ---------------------------------------------------------
/// An expert's proposed cost and duration for a request. At most one bid per request carries `is_accepted = true`,
/// and an expert bids at most once per request.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Bid {
    pub id: i64,
    pub request_id: i64,
    pub expert_id: i64,
    pub cost: Money,
    pub duration: i64,
    pub duration_unit: DurationUnit,
    pub is_accepted: bool,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBid {
    pub request_id: i64,
    pub expert_id: i64,
    pub cost: Money,
    pub duration: i64,
    pub duration_unit: DurationUnit,
    pub note: Option<String>,
}

impl NewBid {
    pub fn new(request_id: i64, expert_id: i64, cost: Money, duration: i64, duration_unit: DurationUnit) -> Self {
        Self { request_id, expert_id, cost, duration, duration_unit, note: None }
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }
}

//--------------------------------------    OrderStatus      ---------------------------------------------------------
/// Order lifecycle states. Transitions only move forward, except the refund short-circuit:
///
/// ```text
/// InProgress -> Completed   (requires FullyPaid)
/// InProgress -> Refunded
/// Completed  -> Delivered
/// Completed  -> Refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    InProgress,
    Completed,
    Delivered,
    Refunded,
}

impl OrderStatus {
    /// Terminal orders accept no further ledger mutations.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Refunded)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::InProgress => write!(f, "InProgress"),
            OrderStatus::Completed => write!(f, "Completed"),
            OrderStatus::Delivered => write!(f, "Delivered"),
            OrderStatus::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "InProgress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            "Delivered" => Ok(Self::Delivered),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to InProgress");
            OrderStatus::InProgress
        })
    }
}

//--------------------------------------   PaymentStatus     ---------------------------------------------------------
/// The order-level payment aggregate. Always derived from the full set of the order's payments; never set by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    FullyPaid,
    Refunded,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Unpaid => write!(f, "Unpaid"),
            PaymentStatus::PartiallyPaid => write!(f, "PartiallyPaid"),
            PaymentStatus::FullyPaid => write!(f, "FullyPaid"),
            PaymentStatus::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unpaid" => Ok(Self::Unpaid),
            "PartiallyPaid" => Ok(Self::PartiallyPaid),
            "FullyPaid" => Ok(Self::FullyPaid),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment status: {value}. But this conversion cannot fail. Defaulting to Unpaid");
            PaymentStatus::Unpaid
        })
    }
}

//--------------------------------------       Order         ---------------------------------------------------------
/// The contractual and financial record created when a bid is accepted.
///
/// `total_price = base_price + extra_price` holds after every mutation; both derived fields are recomputed from
/// the payment ledger inside the same transaction as any ledger change.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub bid_id: i64,
    pub request_id: i64,
    pub customer_id: i64,
    pub expert_id: i64,
    pub base_price: Money,
    pub extra_price: Money,
    pub total_price: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub deadline: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    PaymentKind      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentKind {
    /// The charge created with the order, for the accepted bid's cost.
    Initial,
    /// An additional charge requested by the expert while work is in progress.
    Extra,
}

impl Display for PaymentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentKind::Initial => write!(f, "Initial"),
            PaymentKind::Extra => write!(f, "Extra"),
        }
    }
}

impl From<String> for PaymentKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Initial" => Self::Initial,
            "Extra" => Self::Extra,
            _ => {
                error!("Invalid payment kind: {value}. Defaulting to Extra");
                Self::Extra
            },
        }
    }
}

//--------------------------------------    PaymentState     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentState {
    Pending,
    Paid,
    Refunded,
}

impl Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentState::Pending => write!(f, "Pending"),
            PaymentState::Paid => write!(f, "Paid"),
            PaymentState::Refunded => write!(f, "Refunded"),
        }
    }
}

impl From<String> for PaymentState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Pending" => Self::Pending,
            "Paid" => Self::Paid,
            "Refunded" => Self::Refunded,
            _ => {
                error!("Invalid payment state: {value}. Defaulting to Pending");
                Self::Pending
            },
        }
    }
}

//--------------------------------------      Payment        ---------------------------------------------------------
/// One charge event against an order. The ledger is append-only apart from pending extra charges, which the
/// requesting expert may amend or withdraw before they are paid.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub kind: PaymentKind,
    pub amount: Money,
    pub reason: Option<String>,
    pub status: PaymentState,
    pub paid_at: Option<DateTime<Utc>>,
    pub transaction_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    PayoutStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PayoutStatus {
    Pending,
    Released,
}

impl Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutStatus::Pending => write!(f, "Pending"),
            PayoutStatus::Released => write!(f, "Released"),
        }
    }
}

impl From<String> for PayoutStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Pending" => Self::Pending,
            "Released" => Self::Released,
            _ => {
                error!("Invalid payout status: {value}. Defaulting to Pending");
                Self::Pending
            },
        }
    }
}

//--------------------------------------       Payout        ---------------------------------------------------------
/// The net amount owed to the expert once an order completes. One row per order; recomputed (not duplicated) if
/// the order completes again after a refund cycle. `net_payout = total_payment - commission` always.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Payout {
    pub id: i64,
    pub order_id: i64,
    pub expert_id: i64,
    pub total_payment: Money,
    pub commission: Money,
    pub net_payout: Money,
    pub status: PayoutStatus,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    RefundStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum RefundStatus {
    Requested,
    Approved,
    Rejected,
}

impl RefundStatus {
    /// Requested and approved refunds block a second refund on the same order.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, RefundStatus::Requested | RefundStatus::Approved)
    }
}

impl Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefundStatus::Requested => write!(f, "Requested"),
            RefundStatus::Approved => write!(f, "Approved"),
            RefundStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

impl From<String> for RefundStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Requested" => Self::Requested,
            "Approved" => Self::Approved,
            "Rejected" => Self::Rejected,
            _ => {
                error!("Invalid refund status: {value}. Defaulting to Requested");
                Self::Requested
            },
        }
    }
}

/// An admin's verdict on a refund request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundDecision {
    Approved,
    Rejected,
}

impl From<RefundDecision> for RefundStatus {
    fn from(value: RefundDecision) -> Self {
        match value {
            RefundDecision::Approved => RefundStatus::Approved,
            RefundDecision::Rejected => RefundStatus::Rejected,
        }
    }
}

//--------------------------------------   RefundRequest     ---------------------------------------------------------
/// A customer-initiated reversal of an order. At most one outstanding refund request exists per order.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct RefundRequest {
    pub id: i64,
    pub order_id: i64,
    pub customer_id: i64,
    pub amount: Money,
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub decision_notes: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn duration_unit_parsing_is_lenient() {
        assert_eq!("hours".parse::<DurationUnit>().unwrap(), DurationUnit::Hours);
        assert_eq!(" Week ".parse::<DurationUnit>().unwrap(), DurationUnit::Weeks);
        assert!("fortnights".parse::<DurationUnit>().is_err());
        assert_eq!(DurationUnit::from("fortnights".to_string()), DurationUnit::Days);
    }

    #[test]
    fn actor_ownership_checks() {
        let customer = Actor::customer(7);
        let expert = Actor::expert(7);
        let admin = Actor::admin(1);
        assert!(customer.owns_as_customer(7));
        assert!(!customer.owns_as_customer(8));
        assert!(!customer.owns_as_expert(7));
        assert!(expert.owns_as_expert(7));
        assert!(!expert.owns_as_customer(7));
        assert!(admin.owns_as_customer(7) && admin.owns_as_expert(7));
    }

    #[test]
    fn terminal_orders() {
        assert!(!OrderStatus::InProgress.is_terminal());
        assert!(!OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
    }

    #[test]
    fn outstanding_refunds() {
        assert!(RefundStatus::Requested.is_outstanding());
        assert!(RefundStatus::Approved.is_outstanding());
        assert!(!RefundStatus::Rejected.is_outstanding());
    }
}
