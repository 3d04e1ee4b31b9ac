//! The contracts between the engine's API layer and its collaborators: the entity store (with its atomic
//! multi-entity operations) and the outbound payment gateway.

mod market_reads;
mod marketplace_database;
mod payment_gateway;

pub use market_reads::MarketReads;
pub use marketplace_database::{ErrorKind, MarketplaceDatabase, MarketplaceError};
pub use payment_gateway::{human_message, ChargeReceipt, GatewayError, PaymentGateway};
