//! The outbound payment gateway contract.
//!
//! The engine never talks to a payment provider directly. A live adapter (mobile-money, card, whatever the
//! deployment uses) implements [`PaymentGateway`] and is injected into the order flow API. Gateway calls happen
//! *before* the surrounding database transaction opens, so a rejected or timed-out charge leaves the ledger
//! untouched.

use serde_json::Value;
use thiserror::Error;

use rme_common::Money;

/// A successful charge, as reported by the provider.
#[derive(Debug, Clone)]
pub struct ChargeReceipt {
    /// The provider's reference for the charge. Stored on the payment as `transaction_ref`.
    pub reference_id: String,
    /// The provider's raw response payload, kept for dispute trails.
    pub raw_response: Value,
}

impl ChargeReceipt {
    pub fn new<S: Into<String>>(reference_id: S) -> Self {
        Self { reference_id: reference_id.into(), raw_response: Value::Null }
    }

    pub fn with_raw_response(mut self, raw: Value) -> Self {
        self.raw_response = raw;
        self
    }
}

/// A rejected charge. `code` is the provider's machine-readable failure code; `message` is the human-readable
/// mapping the request layer can show to the user.
#[derive(Debug, Clone, Error)]
#[error("Payment gateway rejected the charge ({code}): {message}")]
pub struct GatewayError {
    pub code: String,
    pub message: String,
}

impl GatewayError {
    pub fn new<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self { code: code.into(), message: message.into() }
    }

    /// Builds an error from a bare provider code, mapping known codes to a human message.
    pub fn from_code<C: Into<String>>(code: C) -> Self {
        let code = code.into();
        let message = human_message(&code).to_string();
        Self { code, message }
    }

    /// A charge that never completed. Cancellation and timeout both translate to a failed payment with no
    /// ledger mutation.
    pub fn timeout() -> Self {
        Self::from_code("TIMEOUT")
    }
}

/// Maps a provider failure code to a message fit for end users.
pub fn human_message(code: &str) -> &'static str {
    match code {
        "INSUFFICIENT_FUNDS" => "The paying account does not have enough funds for this charge",
        "INVALID_ACCOUNT" => "The phone number is not registered with the payment provider",
        "LIMIT_EXCEEDED" => "The charge exceeds the account's transaction limit",
        "TIMEOUT" => "The payment provider did not respond in time; no money has moved",
        "DECLINED" => "The payment was declined by the provider",
        _ => "The payment could not be processed",
    }
}

/// The charge operation a live payment provider adapter must support.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway: Clone {
    /// Sends a charge of `amount` to the account behind `phone`. `reference` is the engine's idempotency
    /// reference for the charge; providers echo it back in their receipts.
    async fn charge(&self, phone: &str, amount: Money, reference: &str) -> Result<ChargeReceipt, GatewayError>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_codes_map_to_specific_messages() {
        let err = GatewayError::from_code("INSUFFICIENT_FUNDS");
        assert!(err.message.contains("enough funds"));
        let err = GatewayError::timeout();
        assert_eq!(err.code, "TIMEOUT");
        assert!(err.message.contains("no money has moved"));
    }

    #[test]
    fn unknown_codes_get_a_generic_message() {
        let err = GatewayError::from_code("E_WEIRD_42");
        assert_eq!(err.code, "E_WEIRD_42");
        assert_eq!(err.message, "The payment could not be processed");
    }
}
