use crate::{
    api::order_objects::OrderQueryFilter,
    db_types::{Bid, Order, Payment, Payout, RefundRequest, Request, ServiceType},
    traits::MarketplaceError,
};

/// Read-side access to the entity store: lookups by id and filtered fetches by foreign key and status.
/// These run on a plain pooled connection; the mutation methods on
/// [`MarketplaceDatabase`](crate::traits::MarketplaceDatabase) re-read whatever they need inside their own
/// transactions.
#[allow(async_fn_in_trait)]
pub trait MarketReads {
    async fn fetch_service_type(&self, id: i64) -> Result<Option<ServiceType>, MarketplaceError>;

    async fn fetch_request(&self, id: i64) -> Result<Option<Request>, MarketplaceError>;

    async fn fetch_bid(&self, id: i64) -> Result<Option<Bid>, MarketplaceError>;

    async fn fetch_bids_for_request(&self, request_id: i64) -> Result<Vec<Bid>, MarketplaceError>;

    /// The accepted bid for a request, if the request is closed.
    async fn fetch_accepted_bid(&self, request_id: i64) -> Result<Option<Bid>, MarketplaceError>;

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, MarketplaceError>;

    /// The order created from the given bid, if the bid was ever accepted.
    async fn fetch_order_for_bid(&self, bid_id: i64) -> Result<Option<Order>, MarketplaceError>;

    async fn fetch_payment(&self, id: i64) -> Result<Option<Payment>, MarketplaceError>;

    async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, MarketplaceError>;

    async fn fetch_payout_for_order(&self, order_id: i64) -> Result<Option<Payout>, MarketplaceError>;

    async fn fetch_payout(&self, id: i64) -> Result<Option<Payout>, MarketplaceError>;

    async fn fetch_refund(&self, id: i64) -> Result<Option<RefundRequest>, MarketplaceError>;

    /// The outstanding (requested or approved) refund for an order, if one exists.
    async fn fetch_open_refund_for_order(&self, order_id: i64) -> Result<Option<RefundRequest>, MarketplaceError>;

    /// Fetches orders matching the filter, ordered by creation time.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, MarketplaceError>;
}
