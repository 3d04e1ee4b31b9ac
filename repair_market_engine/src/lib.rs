//! Repair Market Engine
//!
//! The engine coordinates a marketplace where customers post repair jobs, experts bid on them, and accepted
//! bids become paid, fulfillable service orders. This library contains the core order lifecycle and financial
//! state machine; it is transport-agnostic, and expects a request-handling layer to supply authenticated
//! actors and validated payloads.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). You should never need to access the database directly.
//!    Instead, use the public API provided by the engine. The exception is the data types used in the database.
//!    These are defined in the `db_types` module and are public.
//! 2. The engine public API ([`mod@api`]): [`BiddingApi`] for the request/bid phase, [`OrderFlowApi`] for
//!    payment collection, completion and payouts, and [`RefundApi`] for reversals. Backends implement the
//!    traits in [`mod@traits`]; every multi-entity operation is atomic in the backend.
//!
//! The engine also provides a set of events that can be subscribed to. These events are emitted when certain
//! actions occur within the engine (a bid is accepted, an order completes, a refund is decided) and are the
//! feed for the notification sink. Delivery is fire-and-forget: a failing subscriber never rolls back the
//! operation that emitted the event.
pub mod api;
pub mod db_types;
pub mod events;
pub mod helpers;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use api::{order_objects, BiddingApi, OrderFlowApi, RefundApi};
pub use traits::{
    ChargeReceipt,
    ErrorKind,
    GatewayError,
    MarketReads,
    MarketplaceDatabase,
    MarketplaceError,
    PaymentGateway,
};
