use thiserror::Error;

use rme_common::Money;

use crate::{
    db_types::{
        Bid,
        NewBid,
        NewRequest,
        NewServiceType,
        Order,
        Payment,
        Payout,
        RefundDecision,
        RefundRequest,
        Request,
        ServiceType,
    },
    traits::{market_reads::MarketReads, payment_gateway::GatewayError},
};

/// This trait defines the highest level of behaviour for backends supporting the repair market engine.
///
/// Every method that touches more than one row executes as a single atomic transaction: the backend re-verifies
/// entity state inside the transaction (callers' pre-checks are advisory only), and any failure rolls the whole
/// transaction back. No partially-applied state is ever visible to a concurrent reader.
#[allow(async_fn_in_trait)]
pub trait MarketplaceDatabase: Clone + MarketReads {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Registers a service type with its commission rate.
    async fn insert_service_type(&self, service_type: NewServiceType) -> Result<ServiceType, MarketplaceError>;

    /// Stores a new repair request with `Pending` status.
    async fn insert_request(&self, request: NewRequest) -> Result<Request, MarketplaceError>;

    /// Moves a request from `Pending` to `Bidding`.
    async fn open_request_for_bidding(&self, request_id: i64) -> Result<Request, MarketplaceError>;

    /// Moves a request from `Pending` or `Bidding` to `Rejected`.
    async fn reject_request(&self, request_id: i64) -> Result<Request, MarketplaceError>;

    /// Stores a bid against a `Bidding` request. A second bid by the same expert on the same request fails with
    /// [`MarketplaceError::BidAlreadyPlaced`].
    async fn insert_bid(&self, bid: NewBid) -> Result<Bid, MarketplaceError>;

    /// Accepts the bid and creates the order, in one transaction:
    /// * the target bid is marked accepted and every sibling bid un-accepted,
    /// * the request moves to `Closed`,
    /// * the order is created (`InProgress`, `Unpaid`, deadline derived from the bid's duration),
    /// * the initial pending payment for the bid's cost is written to the ledger.
    ///
    /// Fails with [`MarketplaceError::RequestNotBiddable`] unless the request is `Bidding`; two concurrent calls
    /// on bids of the same request serialize on the request row, and the loser observes exactly that error.
    async fn accept_bid(&self, bid_id: i64) -> Result<(Bid, Order), MarketplaceError>;

    /// Appends a pending `Extra` payment to an in-progress order's ledger and re-derives the order's
    /// `extra_price`, `total_price` and `payment_status` in the same transaction.
    async fn add_extra_payment(
        &self,
        order_id: i64,
        amount: Money,
        reason: Option<String>,
    ) -> Result<(Payment, Order), MarketplaceError>;

    /// Amends a pending `Extra` payment. Only pending extra charges on non-terminal orders may change; the
    /// order's derived fields are recomputed afterwards.
    async fn update_extra_payment(
        &self,
        payment_id: i64,
        amount: Money,
        reason: Option<String>,
    ) -> Result<(Payment, Order), MarketplaceError>;

    /// Withdraws a pending `Extra` payment and recomputes the order's derived fields.
    async fn delete_extra_payment(&self, payment_id: i64) -> Result<Order, MarketplaceError>;

    /// Marks a single pending payment as paid, stamping `paid_at` and the gateway's `transaction_ref`, then
    /// re-derives the order's payment status. The gateway charge has already succeeded by the time this runs.
    async fn apply_charge(&self, payment_id: i64, transaction_ref: &str) -> Result<(Payment, Order), MarketplaceError>;

    /// Marks every pending payment on the order as paid with deterministic settlement references, then
    /// re-derives the order's payment status once. Used for internal/bulk settlement.
    async fn settle_order(&self, order_id: i64) -> Result<Order, MarketplaceError>;

    /// Completes an order: requires `InProgress` status and a `FullyPaid` ledger; stamps `completed_at` and the
    /// completion notes, and upserts the expert's payout (commission from the request's service type) in the
    /// same transaction.
    ///
    /// A retried completion fails with [`MarketplaceError::InvalidStateChange`] rather than silently recomputing
    /// the payout; the upsert exists because a refunded request can be re-bid and completed again later.
    async fn complete_order(&self, order_id: i64, notes: Option<String>) -> Result<(Order, Payout), MarketplaceError>;

    /// Confirms receipt: requires `Completed` status; moves the order to `Delivered` and releases a pending
    /// payout when one exists.
    async fn deliver_order(&self, order_id: i64) -> Result<(Order, Option<Payout>), MarketplaceError>;

    /// Releases a pending payout, stamping `released_at`, and advances the order to `Delivered` if it is not
    /// already there.
    async fn release_payout(&self, payout_id: i64) -> Result<(Payout, Order), MarketplaceError>;

    /// Opens a refund request for the order's current `total_price`. Fails with
    /// [`MarketplaceError::RefundAlreadyOpen`] while another refund on the order is requested or approved.
    async fn insert_refund_request(
        &self,
        order_id: i64,
        customer_id: i64,
        reason: Option<String>,
    ) -> Result<RefundRequest, MarketplaceError>;

    /// Records the admin's decision. Approval reverses the order in one transaction:
    /// * every payment on the order becomes `Refunded`,
    /// * the order becomes `Refunded`/`Refunded`,
    /// * the payout row (if any) is deleted,
    /// * the originating request reopens to `Bidding`,
    /// * the winning bid is un-accepted.
    ///
    /// Sibling bids are kept: they become regular competing bids again. Prior orders stay terminal.
    async fn decide_refund(
        &self,
        refund_id: i64,
        decision: RefundDecision,
        notes: Option<String>,
    ) -> Result<(RefundRequest, Order), MarketplaceError>;

    /// Edits a decision's free-text notes. Always allowed, regardless of refund state; no side effects.
    async fn update_refund_notes(&self, refund_id: i64, notes: &str) -> Result<RefundRequest, MarketplaceError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), MarketplaceError> {
        Ok(())
    }
}

/// The classification the request-handling layer maps to its wire-level error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidState,
    Conflict,
    Payment,
    Validation,
    Internal,
}

#[derive(Debug, Clone, Error)]
pub enum MarketplaceError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested service type {0} does not exist")]
    ServiceTypeNotFound(i64),
    #[error("The requested repair request {0} does not exist")]
    RequestNotFound(i64),
    #[error("The requested bid {0} does not exist")]
    BidNotFound(i64),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(i64),
    #[error("The requested payment {0} does not exist")]
    PaymentNotFound(i64),
    #[error("The requested payout {0} does not exist")]
    PayoutNotFound(i64),
    #[error("The requested refund {0} does not exist")]
    RefundNotFound(i64),
    #[error("Expert {expert_id} has already placed a bid on request {request_id}")]
    BidAlreadyPlaced { request_id: i64, expert_id: i64 },
    #[error("Request {0} is not open for bidding")]
    RequestNotBiddable(i64),
    #[error("A refund request is already outstanding for order {0}")]
    RefundAlreadyOpen(i64),
    #[error("Illegal state change. {0}")]
    InvalidStateChange(String),
    #[error("{actor} may not {action}")]
    PermissionDenied { actor: String, action: String },
    #[error("Invalid input: {0}")]
    ValidationError(String),
    #[error("{0}")]
    PaymentError(#[from] GatewayError),
}

impl MarketplaceError {
    pub fn forbidden<A: std::fmt::Display, S: Into<String>>(actor: A, action: S) -> Self {
        MarketplaceError::PermissionDenied { actor: actor.to_string(), action: action.into() }
    }

    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        MarketplaceError::InvalidStateChange(msg.into())
    }

    /// The coarse classification for this error. Request layers branch on this; the variants carry the detail.
    pub fn kind(&self) -> ErrorKind {
        use MarketplaceError::*;
        match self {
            DatabaseError(_) => ErrorKind::Internal,
            ServiceTypeNotFound(_) | RequestNotFound(_) | BidNotFound(_) | OrderNotFound(_) | PaymentNotFound(_) |
            PayoutNotFound(_) | RefundNotFound(_) => ErrorKind::NotFound,
            BidAlreadyPlaced { .. } | RefundAlreadyOpen(_) => ErrorKind::Conflict,
            RequestNotBiddable(_) | InvalidStateChange(_) => ErrorKind::InvalidState,
            PermissionDenied { .. } => ErrorKind::Forbidden,
            ValidationError(_) => ErrorKind::Validation,
            PaymentError(_) => ErrorKind::Payment,
        }
    }
}

impl From<sqlx::Error> for MarketplaceError {
    fn from(e: sqlx::Error) -> Self {
        MarketplaceError::DatabaseError(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_kinds_follow_the_taxonomy() {
        assert_eq!(MarketplaceError::OrderNotFound(1).kind(), ErrorKind::NotFound);
        assert_eq!(MarketplaceError::BidAlreadyPlaced { request_id: 1, expert_id: 2 }.kind(), ErrorKind::Conflict);
        assert_eq!(MarketplaceError::RefundAlreadyOpen(1).kind(), ErrorKind::Conflict);
        assert_eq!(MarketplaceError::RequestNotBiddable(1).kind(), ErrorKind::InvalidState);
        assert_eq!(MarketplaceError::invalid_state("no").kind(), ErrorKind::InvalidState);
        assert_eq!(MarketplaceError::forbidden("Expert #2", "complete order 1").kind(), ErrorKind::Forbidden);
        assert_eq!(MarketplaceError::ValidationError("bad phone".into()).kind(), ErrorKind::Validation);
        assert_eq!(MarketplaceError::PaymentError(GatewayError::timeout()).kind(), ErrorKind::Payment);
        assert_eq!(MarketplaceError::DatabaseError("boom".into()).kind(), ErrorKind::Internal);
    }
}
