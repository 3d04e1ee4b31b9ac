//! Small pure helpers used across the engine: deadline arithmetic, deterministic settlement references and
//! phone validation.

use std::{fmt::Write as _, sync::OnceLock};

use blake2::{Blake2b512, Digest};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::db_types::DurationUnit;

/// Computes an order deadline from a bid's quoted duration. `Hours`, `Days` and `Weeks` convert directly;
/// callers that parse units from untrusted strings already fall back to days before reaching here.
pub fn deadline_after(start: DateTime<Utc>, duration: i64, unit: DurationUnit) -> DateTime<Utc> {
    let span = match unit {
        DurationUnit::Hours => Duration::hours(duration),
        DurationUnit::Days => Duration::days(duration),
        DurationUnit::Weeks => Duration::weeks(duration),
    };
    start + span
}

/// Builds the deterministic transaction reference used when the platform settles a payment internally (no live
/// gateway charge). The reference is a recognizable `settle-` prefix followed by a blake2 digest over the order
/// id, payment id and settlement timestamp, so bulk settlements of the same ledger rows are reproducible and
/// easily distinguished from gateway references.
pub fn settlement_reference(order_id: i64, payment_id: i64, settled_at: DateTime<Utc>) -> String {
    let preimage = format!("{order_id}:{payment_id}:{}", settled_at.timestamp());
    let digest = Blake2b512::digest(preimage.as_bytes());
    let mut reference = String::with_capacity(7 + 32);
    reference.push_str("settle-");
    for byte in &digest[..16] {
        let _ = write!(reference, "{byte:02x}");
    }
    reference
}

/// Loose E.164-ish validation for the phone numbers charges are sent to. The request layer is expected to have
/// normalized input already; this is the engine's last line before money moves.
pub fn is_valid_phone(phone: &str) -> bool {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    let re = PHONE.get_or_init(|| Regex::new(r"^\+?[0-9]{7,15}$").unwrap());
    re.is_match(phone)
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn deadline_unit_conversion() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(deadline_after(start, 6, DurationUnit::Hours), start + Duration::hours(6));
        assert_eq!(deadline_after(start, 2, DurationUnit::Days), start + Duration::hours(48));
        assert_eq!(deadline_after(start, 1, DurationUnit::Weeks), start + Duration::days(7));
    }

    #[test]
    fn settlement_references_are_deterministic() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let a = settlement_reference(1, 2, at);
        let b = settlement_reference(1, 2, at);
        let c = settlement_reference(1, 3, at);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("settle-"));
        assert_eq!(a.len(), 7 + 32);
    }

    #[test]
    fn phone_validation() {
        assert!(is_valid_phone("+254712345678"));
        assert!(is_valid_phone("0712345678"));
        assert!(!is_valid_phone("071 234"));
        assert!(!is_valid_phone("not-a-phone"));
        assert!(!is_valid_phone(""));
    }
}
