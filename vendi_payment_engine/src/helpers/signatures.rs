//! HMAC signature primitives for the two payment-confirmation channels.
//!
//! Both channels must authenticate independently before any state is touched:
//! * The client-confirmed verify call carries a signature over the canonical string
//!   `"{gateway_order_id}|{gateway_payment_id}"`, signed with the gateway key secret.
//! * The webhook carries a signature over the exact raw request body, signed with the webhook secret. The body must be
//!   verified *before* it is parsed as JSON.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over `payload`, hex-encoded.
pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.finalize().into_bytes().iter().fold(String::with_capacity(64), |mut s, b| {
        use std::fmt::Write;
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Byte-wise comparison that does not short-circuit, so the comparison time does not leak the position of the first
/// mismatch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// The expected signature for a client-confirmed payment.
pub fn checkout_signature(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> String {
    hmac_sha256_hex(secret, format!("{gateway_order_id}|{gateway_payment_id}").as_bytes())
}

pub fn verify_checkout_signature(
    secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    provided: &str,
) -> bool {
    let expected = checkout_signature(secret, gateway_order_id, gateway_payment_id);
    constant_time_eq(expected.as_bytes(), provided.trim().to_ascii_lowercase().as_bytes())
}

/// Verifies a webhook signature against the raw, unparsed request body.
pub fn verify_webhook_signature(secret: &str, raw_body: &[u8], provided: &str) -> bool {
    let expected = hmac_sha256_hex(secret, raw_body);
    constant_time_eq(expected.as_bytes(), provided.trim().to_ascii_lowercase().as_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_hmac_vector() {
        // RFC 4231 test case 2.
        let sig = hmac_sha256_hex("Jefe", b"what do ya want for nothing?");
        assert_eq!(sig, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
    }

    #[test]
    fn checkout_signature_round_trip() {
        let sig = checkout_signature("key_secret", "ord_123", "pay_456");
        assert!(verify_checkout_signature("key_secret", "ord_123", "pay_456", &sig));
        assert!(verify_checkout_signature("key_secret", "ord_123", "pay_456", &sig.to_uppercase()));
        assert!(!verify_checkout_signature("key_secret", "ord_123", "pay_457", &sig));
        assert!(!verify_checkout_signature("other_secret", "ord_123", "pay_456", &sig));
    }

    #[test]
    fn webhook_signature_rejects_tampered_body() {
        let body = br#"{"event":"payment.captured"}"#;
        let sig = hmac_sha256_hex("hook_secret", body);
        assert!(verify_webhook_signature("hook_secret", body, &sig));
        assert!(!verify_webhook_signature("hook_secret", br#"{"event":"payment.failed"}"#, &sig));
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
