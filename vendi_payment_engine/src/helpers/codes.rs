//! Identifier and pickup-code generation.

use rand::Rng;

use crate::db_types::OrderId;

/// Generates a fresh opaque order id. 64 bits of randomness, hex-encoded.
pub fn new_order_id() -> OrderId {
    OrderId(format!("{:016x}", rand::random::<u64>()))
}

/// Generates a random numeric pickup code of the given number of digits, without a leading zero.
///
/// Codes are short on purpose. They are scoped to a single machine and only live while a single order is awaiting
/// pickup there, so the caller is responsible for retrying on collision with another active code on the same machine.
pub fn random_pickup_code<R: Rng>(rng: &mut R, digits: u32) -> String {
    let lower = 10u64.pow(digits - 1);
    let upper = 10u64.pow(digits);
    rng.gen_range(lower..upper).to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pickup_codes_have_requested_length() {
        let mut rng = rand::thread_rng();
        for digits in 4..=6 {
            for _ in 0..50 {
                let code = random_pickup_code(&mut rng, digits);
                assert_eq!(code.len(), digits as usize);
                assert!(!code.starts_with('0'));
            }
        }
    }

    #[test]
    fn order_ids_are_opaque_hex() {
        let id = new_order_id();
        assert_eq!(id.as_str().len(), 16);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
