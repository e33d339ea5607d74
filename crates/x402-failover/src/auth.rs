//! Request authentication helpers.
//!
//! Outbound facilitator calls can be signed with a shared secret
//! (`X-Facilitator-Auth`). Inbound operator endpoints compare bearer tokens
//! without leaking timing.

use alloy::hex;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "X-Facilitator-Auth";

/// Sign a request body with a shared secret. Returns lowercase hex.
pub fn sign_body(secret: &[u8], body: &[u8]) -> String {
    hex::encode(mac_for(secret, body).finalize().into_bytes())
}

fn mac_for(secret: &[u8], body: &[u8]) -> HmacSha256 {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    };
    mac.update(body);
    mac
}

/// Compare two secrets in constant time, independent of their lengths.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    Sha256::digest(a).ct_eq(&Sha256::digest(b)).into()
}

/// Check an `Authorization: Bearer <token>` header value against the expected token.
pub fn bearer_matches(header: Option<&str>, expected: &str) -> bool {
    header
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()))
}
