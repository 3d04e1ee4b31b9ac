//! Shared scaffolding for the integration tests: a fresh database per test, the three API surfaces wired to a
//! test gateway, and seed helpers that drive the real bidding flow end to end.
#![allow(dead_code)]

use repair_market_engine::{
    db_types::{Actor, Bid, DurationUnit, Money, NewBid, NewRequest, NewServiceType, Order, PaymentState, Request},
    events::EventProducers,
    test_utils::{
        prepare_env::{cleanup_database, prepare_test_env, random_db_path},
        TestGateway,
    },
    BiddingApi,
    MarketReads,
    MarketplaceDatabase,
    OrderFlowApi,
    RefundApi,
    SqliteDatabase,
};

pub const ADMIN: i64 = 1;
pub const CUSTOMER: i64 = 101;
pub const OTHER_CUSTOMER: i64 = 102;
pub const EXPERT: i64 = 201;
pub const RIVAL_EXPERT: i64 = 202;

pub const PHONE: &str = "+254712345678";

pub struct TestMarket {
    pub db: SqliteDatabase,
    pub url: String,
    pub gateway: TestGateway,
    pub bidding: BiddingApi<SqliteDatabase>,
    pub orders: OrderFlowApi<SqliteDatabase, TestGateway>,
    pub refunds: RefundApi<SqliteDatabase>,
}

impl TestMarket {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let gateway = TestGateway::new();
        let bidding = BiddingApi::new(db.clone(), producers.clone());
        let orders = OrderFlowApi::new(db.clone(), gateway.clone(), producers.clone());
        let refunds = RefundApi::new(db.clone(), producers);
        Self { db, url, gateway, bidding, orders, refunds }
    }

    pub async fn teardown(mut self) {
        self.db.close().await.expect("Error closing database");
        cleanup_database(&self.url).await;
    }
}

pub fn admin() -> Actor {
    Actor::admin(ADMIN)
}

pub fn customer() -> Actor {
    Actor::customer(CUSTOMER)
}

pub fn expert() -> Actor {
    Actor::expert(EXPERT)
}

/// Drives the whole bidding flow with the real APIs: service type, request, open, one bid from [`EXPERT`],
/// acceptance by [`CUSTOMER`]. Returns the closed request, winning bid and fresh order.
pub async fn seed_accepted_order(
    market: &TestMarket,
    service_name: &str,
    commission_percent: f64,
    cost: Money,
    duration: i64,
    unit: DurationUnit,
) -> (Request, Bid, Order) {
    let service_type = market
        .db
        .insert_service_type(NewServiceType::new(service_name, commission_percent))
        .await
        .expect("Error creating service type");
    let request = market
        .bidding
        .submit_request(NewRequest::new(CUSTOMER, service_type.id, "Cracked laptop screen"), &customer())
        .await
        .expect("Error submitting request");
    market.bidding.open_for_bidding(request.id, &admin()).await.expect("Error opening request");
    let bid = market
        .bidding
        .place_bid(NewBid::new(request.id, EXPERT, cost, duration, unit), &expert())
        .await
        .expect("Error placing bid");
    let (bid, order) = market.bidding.accept_bid(bid.id, &customer()).await.expect("Error accepting bid");
    let request = market.db.fetch_request(request.id).await.unwrap().unwrap();
    (request, bid, order)
}

/// Pays every pending payment on the order through the test gateway, as the customer.
pub async fn pay_in_full(market: &TestMarket, order_id: i64) -> Order {
    let ledger = market.db.fetch_payments_for_order(order_id).await.expect("Error fetching ledger");
    let mut latest = market.db.fetch_order(order_id).await.unwrap().unwrap();
    for payment in ledger.into_iter().filter(|p| p.status == PaymentState::Pending) {
        let (_, order) = market.orders.pay(payment.id, PHONE, &customer()).await.expect("Error paying");
        latest = order;
    }
    latest
}
