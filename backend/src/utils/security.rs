use rand::Rng;
use sha2::{Digest, Sha256};

/// Zero-padded six digit code suitable for typing from an e-mail.
pub fn generate_numeric_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", value)
}

pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_code_is_six_digits() {
        for _ in 0..50 {
            let code = generate_numeric_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(sha256_hex("abc"), sha256_hex("abc"));
        assert_ne!(sha256_hex("abc"), sha256_hex("abd"));
        assert_eq!(sha256_hex("").len(), 64);
    }
}
