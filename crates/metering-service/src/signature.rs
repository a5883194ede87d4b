//! Webhook signature verification.
//!
//! The payment processor signs each delivery with HMAC-SHA256 over the raw
//! body; the hex digest arrives in the `x-billing-signature` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verification failures. The caller maps these to a 400 so the processor
/// does not retry a delivery we will never accept.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The signature header was absent.
    #[error("missing signature header")]
    Missing,

    /// The signature did not match the body.
    #[error("signature mismatch")]
    Mismatch,
}

/// Verify a webhook delivery against the shared secret.
///
/// # Errors
///
/// Returns [`SignatureError`] when the header is absent or does not match.
pub fn verify_webhook(
    secret: &str,
    body: &str,
    signature: Option<&str>,
) -> Result<(), SignatureError> {
    let provided = signature.ok_or(SignatureError::Missing)?;
    let expected = hmac_sha256_hex(secret, body);

    if constant_time_eq(&expected, provided) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Hex-encoded HMAC-SHA256 of `message` under `secret`.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    // INVARIANT: HMAC-SHA256 accepts keys of any length (RFC 2104), so
    // construction cannot fail for any secret the config can hold.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts any key length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string equality, for signature and API-key comparison.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_accepted() {
        let body = r#"{"id":"evt_1"}"#;
        let sig = hmac_sha256_hex("whsec_test", body);
        assert!(verify_webhook("whsec_test", body, Some(&sig)).is_ok());
    }

    #[test]
    fn missing_signature_rejected() {
        assert!(matches!(
            verify_webhook("whsec_test", "{}", None),
            Err(SignatureError::Missing)
        ));
    }

    #[test]
    fn tampered_body_rejected() {
        let sig = hmac_sha256_hex("whsec_test", r#"{"id":"evt_1"}"#);
        assert!(matches!(
            verify_webhook("whsec_test", r#"{"id":"evt_2"}"#, Some(&sig)),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn wrong_secret_rejected() {
        let body = "payload";
        let sig = hmac_sha256_hex("secret_a", body);
        assert!(verify_webhook("secret_b", body, Some(&sig)).is_err());
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
        assert!(constant_time_eq("", ""));
    }
}
