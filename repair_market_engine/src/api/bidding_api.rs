use std::fmt::Debug;

use futures_util::future::join_all;
use log::*;

use crate::{
    api::guards::{require_admin, require_customer, require_expert},
    db_types::{Actor, Bid, NewBid, NewRequest, Order, Request, RequestStatus},
    events::{BidAcceptedEvent, EventProducers},
    traits::{MarketplaceDatabase, MarketplaceError},
};

/// `BiddingApi` covers the life of a request before an order exists: submission, opening for bids, rejection,
/// bidding, and the acceptance that hands over to the order flow.
pub struct BiddingApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for BiddingApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BiddingApi")
    }
}

impl<B> BiddingApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> BiddingApi<B>
where B: MarketplaceDatabase
{
    /// Submit a new repair request. The request starts in `Pending` status; an admin opens it for bidding.
    ///
    /// The service type must exist and be active, and the title must not be blank.
    pub async fn submit_request(&self, request: NewRequest, actor: &Actor) -> Result<Request, MarketplaceError> {
        require_customer(actor, request.customer_id, "submit a request for another customer")?;
        if request.title.trim().is_empty() {
            return Err(MarketplaceError::ValidationError("Request title cannot be blank".to_string()));
        }
        let service_type = self
            .db
            .fetch_service_type(request.service_type_id)
            .await?
            .ok_or(MarketplaceError::ServiceTypeNotFound(request.service_type_id))?;
        if !service_type.active {
            return Err(MarketplaceError::ValidationError(format!(
                "Service type '{}' is not accepting new requests",
                service_type.name
            )));
        }
        let request = self.db.insert_request(request).await?;
        debug!("🔄️📝️ Request [{}] submitted under '{}'", request.id, service_type.name);
        Ok(request)
    }

    /// Open a pending request for bidding. Admin only.
    pub async fn open_for_bidding(&self, request_id: i64, actor: &Actor) -> Result<Request, MarketplaceError> {
        require_admin(actor, "open a request for bidding")?;
        self.db.open_request_for_bidding(request_id).await
    }

    /// Reject a pending or bidding request. Admin only. Terminal.
    pub async fn reject_request(&self, request_id: i64, actor: &Actor) -> Result<Request, MarketplaceError> {
        require_admin(actor, "reject a request")?;
        self.db.reject_request(request_id).await
    }

    /// Place a bid on a bidding request. An expert bids at most once per request; a duplicate fails with a
    /// conflict, and a request that is not `Bidding` fails with an invalid-state error.
    pub async fn place_bid(&self, bid: NewBid, actor: &Actor) -> Result<Bid, MarketplaceError> {
        require_expert(actor, bid.expert_id, "bid on behalf of another expert")?;
        if !bid.cost.is_positive() {
            return Err(MarketplaceError::ValidationError("Bid cost must be positive".to_string()));
        }
        if bid.duration <= 0 {
            return Err(MarketplaceError::ValidationError("Bid duration must be positive".to_string()));
        }
        self.db.insert_bid(bid).await
    }

    /// Accept a bid on behalf of the request's customer.
    ///
    /// Runs as one transaction in the backend: the winning bid is accepted, every sibling un-accepted, the
    /// request closed, and the order created with its initial pending payment. Two concurrent acceptances on
    /// the same request serialize in the store; the loser observes an invalid-state error and nothing else
    /// changes. The winning expert is notified on success.
    pub async fn accept_bid(&self, bid_id: i64, actor: &Actor) -> Result<(Bid, Order), MarketplaceError> {
        let bid = self.db.fetch_bid(bid_id).await?.ok_or(MarketplaceError::BidNotFound(bid_id))?;
        let request =
            self.db.fetch_request(bid.request_id).await?.ok_or(MarketplaceError::RequestNotFound(bid.request_id))?;
        require_customer(actor, request.customer_id, "accept a bid on another customer's request")?;
        // Advisory pre-check; the backend re-reads the request inside the acceptance transaction.
        if request.status != RequestStatus::Bidding {
            return Err(MarketplaceError::RequestNotBiddable(request.id));
        }
        let (bid, order) = self.db.accept_bid(bid_id).await?;
        self.call_bid_accepted_hook(&bid, &order).await;
        debug!("🔄️📝️ Bid [{bid_id}] accepted by {actor}. Order [{}] is in progress", order.id);
        Ok((bid, order))
    }

    async fn call_bid_accepted_hook(&self, bid: &Bid, order: &Order) {
        trace!("🔄️📝️ Notifying bid accepted hook subscribers");
        let event = BidAcceptedEvent::new(bid.clone(), order.clone());
        join_all(self.producers.bid_accepted_producer.iter().map(|emitter| emitter.publish_event(event.clone())))
            .await;
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
