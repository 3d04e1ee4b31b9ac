//! An in-memory payment gateway for tests: records every charge, hands out sequential references, and can be
//! primed to fail the next charge with a given gateway error.

use std::sync::{Arc, Mutex};

use rme_common::Money;
use serde_json::json;

use crate::traits::{ChargeReceipt, GatewayError, PaymentGateway};

#[derive(Debug, Clone)]
pub struct ChargeRecord {
    pub phone: String,
    pub amount: Money,
    pub reference: String,
}

#[derive(Default)]
struct GatewayState {
    next_failure: Option<GatewayError>,
    charges: Vec<ChargeRecord>,
    counter: u64,
}

#[derive(Clone, Default)]
pub struct TestGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl TestGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `charge` call returns this error instead of a receipt.
    pub fn fail_next(&self, err: GatewayError) {
        self.state.lock().unwrap().next_failure = Some(err);
    }

    /// Everything that has been successfully charged so far.
    pub fn charges(&self) -> Vec<ChargeRecord> {
        self.state.lock().unwrap().charges.clone()
    }
}

impl PaymentGateway for TestGateway {
    async fn charge(&self, phone: &str, amount: Money, reference: &str) -> Result<ChargeReceipt, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.next_failure.take() {
            return Err(err);
        }
        state.counter += 1;
        let reference_id = format!("test-txn-{}", state.counter);
        state.charges.push(ChargeRecord {
            phone: phone.to_string(),
            amount,
            reference: reference.to_string(),
        });
        let receipt = ChargeReceipt::new(reference_id).with_raw_response(json!({
            "phone": phone,
            "amount": amount.value(),
            "reference": reference,
        }));
        Ok(receipt)
    }
}
