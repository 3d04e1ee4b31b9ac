//! Authorization guards.
//!
//! Each API operation runs exactly one of these before touching the store. The ownership facts they check
//! (customer/expert ids on an order) are immutable once written, so checking outside the mutation's transaction
//! is sound; state checks, by contrast, are always re-run inside the transaction.

use crate::{db_types::Actor, traits::MarketplaceError};

pub(crate) fn require_admin(actor: &Actor, action: &str) -> Result<(), MarketplaceError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(MarketplaceError::forbidden(actor, action))
    }
}

pub(crate) fn require_customer(actor: &Actor, customer_id: i64, action: &str) -> Result<(), MarketplaceError> {
    if actor.owns_as_customer(customer_id) {
        Ok(())
    } else {
        Err(MarketplaceError::forbidden(actor, action))
    }
}

pub(crate) fn require_expert(actor: &Actor, expert_id: i64, action: &str) -> Result<(), MarketplaceError> {
    if actor.owns_as_expert(expert_id) {
        Ok(())
    } else {
        Err(MarketplaceError::forbidden(actor, action))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::traits::ErrorKind;

    #[test]
    fn admin_passes_every_guard() {
        let admin = Actor::admin(1);
        assert!(require_admin(&admin, "do anything").is_ok());
        assert!(require_customer(&admin, 42, "act for a customer").is_ok());
        assert!(require_expert(&admin, 42, "act for an expert").is_ok());
    }

    #[test]
    fn owners_pass_and_strangers_do_not() {
        let customer = Actor::customer(42);
        assert!(require_customer(&customer, 42, "pay").is_ok());
        let err = require_customer(&customer, 43, "pay").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = require_expert(&customer, 42, "complete").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = require_admin(&customer, "settle").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
