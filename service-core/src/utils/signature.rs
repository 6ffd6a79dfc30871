use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Generate an HMAC-SHA256 signature over a payload.
///
/// The payload is hashed first so the signed input has a fixed length
/// regardless of document size.
pub fn sign_payload(secret: &str, payload: &str) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    let payload_hash = hex::encode(Sha256::digest(payload.as_bytes()));
    mac.update(payload_hash.as_bytes());
    let result = mac.finalize();

    Ok(hex::encode(result.into_bytes()))
}

/// Verify an HMAC-SHA256 payload signature using constant-time comparison.
pub fn verify_payload(secret: &str, payload: &str, signature: &str) -> Result<bool, anyhow::Error> {
    let expected_signature = sign_payload(secret, payload)?;

    let expected_bytes = expected_signature.as_bytes();
    let signature_bytes = signature.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_generation_and_verification() {
        let secret = "my_secret_key";
        let payload = r#"<loginTicketRequest version="1.0"><service>wsfe</service></loginTicketRequest>"#;

        let signature = sign_payload(secret, payload).unwrap();
        assert!(!signature.is_empty());

        assert!(verify_payload(secret, payload, &signature).unwrap());
    }

    #[test]
    fn test_invalid_signature() {
        let secret = "my_secret_key";
        let payload = "ticket request";

        let signature = sign_payload(secret, payload).unwrap();
        let flipped = if signature.starts_with('0') { "1" } else { "0" };
        let invalid_signature = format!("{}{}", flipped, &signature[1..]);

        assert!(!verify_payload(secret, payload, &invalid_signature).unwrap());
    }

    #[test]
    fn test_tampered_payload() {
        let secret = "my_secret_key";
        let payload = "ticket request";

        let signature = sign_payload(secret, payload).unwrap();

        assert!(!verify_payload(secret, "ticket request v2", &signature).unwrap());
    }
}
