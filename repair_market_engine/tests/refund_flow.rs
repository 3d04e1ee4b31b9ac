mod support;

use repair_market_engine::{
    db_types::{
        Actor,
        DurationUnit,
        Money,
        NewBid,
        OrderStatus,
        PaymentState,
        PaymentStatus,
        RefundDecision,
        RefundStatus,
        RequestStatus,
    },
    ErrorKind,
    MarketReads,
};
use support::{admin, customer, expert, pay_in_full, seed_accepted_order, TestMarket, OTHER_CUSTOMER, RIVAL_EXPERT};

/// Runs the full happy path up to a completed, fully paid order with one extra charge (total 120.00).
async fn completed_order(market: &TestMarket) -> i64 {
    let (_, _, order) =
        seed_accepted_order(market, "Electronics", 10.0, Money::from_units(100), 2, DurationUnit::Days).await;
    market
        .orders
        .request_additional_payment(order.id, Money::from_units(20), "parts", &expert())
        .await
        .unwrap();
    pay_in_full(market, order.id).await;
    let (order, _) = market.orders.mark_completed(order.id, None, &expert()).await.unwrap();
    order.id
}

#[tokio::test]
async fn one_outstanding_refund_per_order() {
    let market = TestMarket::new().await;
    let order_id = completed_order(&market).await;

    let refund = market.refunds.request_refund(order_id, "Stopped working again", &customer()).await.unwrap();
    assert_eq!(refund.status, RefundStatus::Requested);
    assert_eq!(refund.amount, Money::from_units(120));

    let err = market.refunds.request_refund(order_id, "Still broken", &customer()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    market.teardown().await;
}

#[tokio::test]
async fn refunds_are_gated_by_ownership_and_role() {
    let market = TestMarket::new().await;
    let order_id = completed_order(&market).await;

    let err = market
        .refunds
        .request_refund(order_id, "Not my order though", &Actor::customer(OTHER_CUSTOMER))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let refund = market.refunds.request_refund(order_id, "Stopped working", &customer()).await.unwrap();
    let err = market
        .refunds
        .decide_refund(refund.id, RefundDecision::Approved, None, &customer())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    market.teardown().await;
}

#[tokio::test]
async fn approval_reverses_the_whole_chain() {
    let market = TestMarket::new().await;
    let order_id = completed_order(&market).await;
    let order = market.db.fetch_order(order_id).await.unwrap().unwrap();
    assert!(market.db.fetch_payout_for_order(order_id).await.unwrap().is_some());

    let refund = market.refunds.request_refund(order_id, "Stopped working again", &customer()).await.unwrap();
    let refund = market
        .refunds
        .decide_refund(refund.id, RefundDecision::Approved, Some("Verified by support".into()), &admin())
        .await
        .unwrap();
    assert_eq!(refund.status, RefundStatus::Approved);
    assert!(refund.decided_at.is_some());

    // order terminal, both status fields refunded
    let reversed = market.db.fetch_order(order_id).await.unwrap().unwrap();
    assert_eq!(reversed.status, OrderStatus::Refunded);
    assert_eq!(reversed.payment_status, PaymentStatus::Refunded);

    // every payment refunded
    let ledger = market.db.fetch_payments_for_order(order_id).await.unwrap();
    assert!(!ledger.is_empty());
    assert!(ledger.iter().all(|p| p.status == PaymentState::Refunded));

    // payout gone
    assert!(market.db.fetch_payout_for_order(order_id).await.unwrap().is_none());

    // request reopened, winning bid unaccepted
    let request = market.db.fetch_request(order.request_id).await.unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Bidding);
    let bid = market.db.fetch_bid(order.bid_id).await.unwrap().unwrap();
    assert!(!bid.is_accepted);

    market.teardown().await;
}

#[tokio::test]
async fn a_reopened_request_can_be_bid_on_again() {
    let market = TestMarket::new().await;
    let order_id = completed_order(&market).await;
    let order = market.db.fetch_order(order_id).await.unwrap().unwrap();

    let refund = market.refunds.request_refund(order_id, "Came back broken", &customer()).await.unwrap();
    market.refunds.decide_refund(refund.id, RefundDecision::Approved, None, &admin()).await.unwrap();

    let bid = market
        .bidding
        .place_bid(
            NewBid::new(order.request_id, RIVAL_EXPERT, Money::from_units(90), 3, DurationUnit::Days),
            &Actor::expert(RIVAL_EXPERT),
        )
        .await
        .unwrap();
    let (bid, new_order) = market.bidding.accept_bid(bid.id, &customer()).await.unwrap();
    assert!(bid.is_accepted);
    assert_ne!(new_order.id, order_id);
    assert_eq!(new_order.status, OrderStatus::InProgress);

    // the refunded order itself stays terminal
    let old = market.db.fetch_order(order_id).await.unwrap().unwrap();
    assert_eq!(old.status, OrderStatus::Refunded);

    market.teardown().await;
}

#[tokio::test]
async fn rejection_changes_nothing_but_the_refund() {
    let market = TestMarket::new().await;
    let order_id = completed_order(&market).await;

    let refund = market.refunds.request_refund(order_id, "Changed my mind", &customer()).await.unwrap();
    let refund = market
        .refunds
        .decide_refund(refund.id, RefundDecision::Rejected, Some("Within warranty terms".into()), &admin())
        .await
        .unwrap();
    assert_eq!(refund.status, RefundStatus::Rejected);

    let order = market.db.fetch_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.payment_status, PaymentStatus::FullyPaid);
    assert!(market.db.fetch_payout_for_order(order_id).await.unwrap().is_some());

    // a rejected refund is not outstanding: the customer may ask again
    let second = market.refunds.request_refund(order_id, "It broke again", &customer()).await.unwrap();
    assert_eq!(second.status, RefundStatus::Requested);

    market.teardown().await;
}

#[tokio::test]
async fn decisions_are_immutable_except_for_notes() {
    let market = TestMarket::new().await;
    let order_id = completed_order(&market).await;

    let refund = market.refunds.request_refund(order_id, "Faulty repair", &customer()).await.unwrap();
    market.refunds.decide_refund(refund.id, RefundDecision::Rejected, None, &admin()).await.unwrap();

    let err = market
        .refunds
        .decide_refund(refund.id, RefundDecision::Approved, None, &admin())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // free-text notes editing is always allowed and has no side effects
    let refund = market
        .refunds
        .update_decision_notes(refund.id, "Rejected; see ticket #4711", &admin())
        .await
        .unwrap();
    assert_eq!(refund.status, RefundStatus::Rejected);
    assert_eq!(refund.decision_notes.as_deref(), Some("Rejected; see ticket #4711"));
    let order = market.db.fetch_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);

    market.teardown().await;
}
