mod support;

use repair_market_engine::{
    db_types::{Actor, DurationUnit, Money, OrderStatus, PaymentState, PaymentStatus, PayoutStatus},
    ErrorKind,
    GatewayError,
    MarketReads,
};
use support::{
    admin,
    customer,
    expert,
    pay_in_full,
    seed_accepted_order,
    TestMarket,
    OTHER_CUSTOMER,
    PHONE,
    RIVAL_EXPERT,
};

#[tokio::test]
async fn paying_in_full_gates_completion_and_computes_the_payout() {
    let market = TestMarket::new().await;
    let (_, _, order) =
        seed_accepted_order(&market, "Electronics", 10.0, Money::from_units(100), 2, DurationUnit::Days).await;

    // completion is gated on a fully paid ledger
    let err = market.orders.mark_completed(order.id, None, &expert()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let order = pay_in_full(&market, order.id).await;
    assert_eq!(order.payment_status, PaymentStatus::FullyPaid);
    let charges = market.gateway.charges();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].amount, Money::from_units(100));
    assert_eq!(charges[0].phone, PHONE);

    let (order, payout) =
        market.orders.mark_completed(order.id, Some("Replaced the panel".into()), &expert()).await.unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert!(order.completed_at.is_some());
    assert_eq!(order.completion_notes.as_deref(), Some("Replaced the panel"));
    assert_eq!(payout.total_payment, Money::from_units(100));
    assert_eq!(payout.commission, Money::from_units(10));
    assert_eq!(payout.net_payout, Money::from_units(90));
    assert_eq!(payout.status, PayoutStatus::Pending);

    // a retried completion is an error, not a silent recompute
    let err = market.orders.mark_completed(order.id, None, &expert()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // delivery releases the payout
    let (order, payout) = market.orders.mark_delivered(order.id, &customer()).await.unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
    let payout = payout.expect("payout should exist");
    assert_eq!(payout.status, PayoutStatus::Released);
    assert!(payout.released_at.is_some());

    market.teardown().await;
}

#[tokio::test]
async fn extra_charges_flow_through_the_derived_totals() {
    let market = TestMarket::new().await;
    let (_, _, order) =
        seed_accepted_order(&market, "Electronics", 10.0, Money::from_units(100), 2, DurationUnit::Days).await;

    let (extra, order) = market
        .orders
        .request_additional_payment(order.id, Money::from_units(20), "parts", &expert())
        .await
        .unwrap();
    assert_eq!(order.extra_price, Money::from_units(20));
    assert_eq!(order.total_price, Money::from_units(120));
    assert_eq!(order.total_price, order.base_price + order.extra_price);
    assert_eq!(order.payment_status, PaymentStatus::Unpaid);

    // pay only the initial charge: paid < total, so the order is partially paid
    let ledger = market.db.fetch_payments_for_order(order.id).await.unwrap();
    let initial = ledger.iter().find(|p| p.id != extra.id).unwrap();
    let (_, order) = market.orders.pay(initial.id, PHONE, &customer()).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::PartiallyPaid);
    let err = market.orders.mark_completed(order.id, None, &expert()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // amending the pending extra reshapes the totals
    let (_, order) = market
        .orders
        .update_additional_payment(extra.id, Money::from_units(35), "parts and labour", &expert())
        .await
        .unwrap();
    assert_eq!(order.extra_price, Money::from_units(35));
    assert_eq!(order.total_price, Money::from_units(135));
    assert_eq!(order.total_price, order.base_price + order.extra_price);

    // withdrawing it restores the base price and the ledger is fully paid again
    let order = market.orders.delete_additional_payment(extra.id, &expert()).await.unwrap();
    assert_eq!(order.extra_price, Money::from_cents(0));
    assert_eq!(order.total_price, Money::from_units(100));
    assert_eq!(order.payment_status, PaymentStatus::FullyPaid);

    market.teardown().await;
}

#[tokio::test]
async fn payout_is_computed_on_the_full_collected_amount() {
    let market = TestMarket::new().await;
    let (_, _, order) =
        seed_accepted_order(&market, "Electronics", 10.0, Money::from_units(100), 2, DurationUnit::Days).await;
    market
        .orders
        .request_additional_payment(order.id, Money::from_units(20), "parts", &expert())
        .await
        .unwrap();
    let order = pay_in_full(&market, order.id).await;
    assert_eq!(order.payment_status, PaymentStatus::FullyPaid);
    assert_eq!(order.total_price, Money::from_units(120));

    let (_, payout) = market.orders.mark_completed(order.id, None, &expert()).await.unwrap();
    assert_eq!(payout.total_payment, Money::from_units(120));
    assert_eq!(payout.commission, Money::from_units(12));
    assert_eq!(payout.net_payout, Money::from_units(108));
    assert_eq!(payout.net_payout, payout.total_payment - payout.commission);

    market.teardown().await;
}

#[tokio::test]
async fn a_failed_charge_leaves_the_ledger_untouched() {
    let market = TestMarket::new().await;
    let (_, _, order) =
        seed_accepted_order(&market, "Electronics", 10.0, Money::from_units(100), 2, DurationUnit::Days).await;

    let ledger = market.db.fetch_payments_for_order(order.id).await.unwrap();
    let payment = &ledger[0];

    market.gateway.fail_next(GatewayError::from_code("INSUFFICIENT_FUNDS"));
    let err = market.orders.pay(payment.id, PHONE, &customer()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Payment);

    let payment = market.db.fetch_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentState::Pending);
    assert!(payment.transaction_ref.is_none());
    let order = market.db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Unpaid);

    // the same goes for a timed-out charge
    market.gateway.fail_next(GatewayError::timeout());
    let err = market.orders.pay(payment.id, PHONE, &customer()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Payment);
    let order = market.db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Unpaid);

    market.teardown().await;
}

#[tokio::test]
async fn payment_input_validation_and_ownership() {
    let market = TestMarket::new().await;
    let (_, _, order) =
        seed_accepted_order(&market, "Electronics", 10.0, Money::from_units(100), 2, DurationUnit::Days).await;
    let ledger = market.db.fetch_payments_for_order(order.id).await.unwrap();
    let payment = &ledger[0];

    let err = market.orders.pay(payment.id, "not-a-phone", &customer()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = market.orders.pay(payment.id, PHONE, &Actor::customer(OTHER_CUSTOMER)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = market
        .orders
        .request_additional_payment(order.id, Money::from_cents(0), "free", &expert())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = market
        .orders
        .request_additional_payment(order.id, Money::from_units(5), "parts", &Actor::expert(RIVAL_EXPERT))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    // double settlement of the same payment is an invalid state, not a second charge
    let (paid, _) = market.orders.pay(payment.id, PHONE, &customer()).await.unwrap();
    let err = market.orders.pay(paid.id, PHONE, &customer()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(market.gateway.charges().len(), 1);

    market.teardown().await;
}

#[tokio::test]
async fn internal_settlement_is_admin_only_and_deterministic() {
    let market = TestMarket::new().await;
    let (_, _, order) =
        seed_accepted_order(&market, "Electronics", 10.0, Money::from_units(100), 2, DurationUnit::Days).await;
    market
        .orders
        .request_additional_payment(order.id, Money::from_units(20), "parts", &expert())
        .await
        .unwrap();

    let err = market.orders.settle_order(order.id, &customer()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let order = market.orders.settle_order(order.id, &admin()).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::FullyPaid);
    let ledger = market.db.fetch_payments_for_order(order.id).await.unwrap();
    assert!(ledger.iter().all(|p| p.status == PaymentState::Paid));
    assert!(ledger.iter().all(|p| p.transaction_ref.as_deref().unwrap_or("").starts_with("settle-")));
    // no gateway involvement
    assert!(market.gateway.charges().is_empty());

    market.teardown().await;
}

#[tokio::test]
async fn delivery_requires_a_completed_order() {
    let market = TestMarket::new().await;
    let (_, _, order) =
        seed_accepted_order(&market, "Electronics", 10.0, Money::from_units(100), 2, DurationUnit::Days).await;

    let err = market.orders.mark_delivered(order.id, &customer()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    market.teardown().await;
}

#[tokio::test]
async fn terminal_orders_accept_no_new_charges() {
    let market = TestMarket::new().await;
    let (_, _, order) =
        seed_accepted_order(&market, "Electronics", 10.0, Money::from_units(100), 2, DurationUnit::Days).await;
    let order = pay_in_full(&market, order.id).await;
    market.orders.mark_completed(order.id, None, &expert()).await.unwrap();

    let err = market
        .orders
        .request_additional_payment(order.id, Money::from_units(10), "late parts", &expert())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    market.teardown().await;
}

#[tokio::test]
async fn releasing_a_payout_advances_the_order() {
    let market = TestMarket::new().await;
    let (_, _, order) =
        seed_accepted_order(&market, "Electronics", 10.0, Money::from_units(100), 2, DurationUnit::Days).await;
    let order = pay_in_full(&market, order.id).await;
    let (order, payout) = market.orders.mark_completed(order.id, None, &expert()).await.unwrap();

    let err = market.orders.release_payout(payout.id, &expert()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let (payout, order) = market.orders.release_payout(payout.id, &admin()).await.unwrap();
    assert_eq!(payout.status, PayoutStatus::Released);
    assert_eq!(order.status, OrderStatus::Delivered);

    // releasing twice is an invalid state
    let err = market.orders.release_payout(payout.id, &admin()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    market.teardown().await;
}
