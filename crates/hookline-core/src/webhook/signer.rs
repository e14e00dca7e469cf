//! HMAC-SHA256 signing and constant-time verification of webhook payloads.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header names accepted for inbound signature verification, in the order
/// they are checked. Matching is case-insensitive.
pub const SIGNATURE_HEADERS: &[&str] = &[
    "X-Webhook-Signature",
    "X-Hub-Signature-256",
    "X-Signature-256",
    "Webhook-Signature",
];

/// HMAC-SHA256 signer/verifier bound to a shared secret.
#[derive(Debug, Clone)]
pub struct Signer {
    secret: String,
}

impl Signer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Hex-encoded HMAC-SHA256 of `payload` under the configured secret.
    pub fn sign(&self, payload: &[u8]) -> String {
        hex::encode(Self::mac(&self.secret, payload))
    }

    /// Hex-encoded HMAC-SHA256 over `"<ts>.<payload>"`, for replay
    /// protection.
    pub fn sign_with_timestamp(&self, timestamp: i64, payload: &[u8]) -> String {
        let mut message = format!("{}.", timestamp).into_bytes();
        message.extend_from_slice(payload);
        hex::encode(Self::mac(&self.secret, &message))
    }

    /// Decode both sides as hex then compare in constant time. Malformed
    /// hex is treated as a verification failure, not an error.
    pub fn verify(&self, payload: &[u8], signature: &str) -> bool {
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };
        let expected = Self::mac(&self.secret, payload);
        constant_time_eq(&expected, &provided)
    }

    /// Write the standard signature headers for an outbound request.
    pub fn add_headers(&self, headers: &mut std::collections::HashMap<String, String>, payload: &[u8]) {
        headers.insert("X-Webhook-Signature".to_string(), self.sign(payload));
        headers.insert(
            "X-Webhook-Signature-Algorithm".to_string(),
            "sha256".to_string(),
        );
    }

    fn mac(secret: &str, payload: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Free-standing verification helper for callers that only have the raw
/// secret, not a constructed [`Signer`].
pub fn verify_signature(payload: &[u8], secret: &str, signature: &str) -> bool {
    Signer::new(secret).verify(payload, signature)
}

/// Extract a hex signature from a header map, accepting any of the names in
/// [`SIGNATURE_HEADERS`] case-insensitively and stripping a leading `algo=`
/// prefix (e.g. `sha256=<hex>`) if present.
pub fn extract_signature(headers: &std::collections::HashMap<String, String>) -> Option<String> {
    let lowered: std::collections::HashMap<String, &String> =
        headers.iter().map(|(k, v)| (k.to_lowercase(), v)).collect();

    for name in SIGNATURE_HEADERS {
        if let Some(value) = lowered.get(&name.to_lowercase()) {
            let stripped = match value.split_once('=') {
                Some((_, rest)) => rest,
                None => value.as_str(),
            };
            return Some(stripped.to_string());
        }
    }
    None
}

/// XOR-accumulate comparison: both inputs are always fully scanned so the
/// runtime does not depend on where the first mismatch occurs.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_then_verify_round_trip() {
        let signer = Signer::new("s3cr3t");
        let payload = b"{\"id\":\"e1\"}";
        let signature = signer.sign(payload);
        assert!(signer.verify(payload, &signature));
    }

    #[test]
    fn test_verify_rejects_wrong_secret_or_payload() {
        let signer = Signer::new("s3cr3t");
        let other = Signer::new("different");
        let payload = b"payload";
        let signature = signer.sign(payload);

        assert!(!other.verify(payload, &signature));
        assert!(!signer.verify(b"tampered", &signature));
    }

    #[test]
    fn test_verify_rejects_malformed_hex() {
        let signer = Signer::new("s3cr3t");
        assert!(!signer.verify(b"payload", "not-hex!!"));
    }

    #[test]
    fn test_extract_signature_accepts_known_headers_and_strips_algo_prefix() {
        let mut headers = std::collections::HashMap::new();
        headers.insert(
            "x-hub-signature-256".to_string(),
            "sha256=deadbeef".to_string(),
        );
        assert_eq!(extract_signature(&headers), Some("deadbeef".to_string()));
    }

    #[test]
    fn test_extract_signature_missing_returns_none() {
        let headers = std::collections::HashMap::new();
        assert_eq!(extract_signature(&headers), None);
    }
}
