//! Platform request signing.
//!
//! Every call to the marketplace API carries an HMAC-SHA-256 signature over
//! the canonical string `{partner_id}{path}{timestamp}`, keyed with the
//! partner secret and rendered as lowercase hex. The digest is a wire
//! contract: it must match the platform's own computation byte for byte.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign a platform request path for the given partner at `timestamp`
/// (seconds since epoch).
pub fn sign_request(secret: &str, partner_id: i64, path: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA-256 accepts keys of any size");
    mac.update(partner_id.to_string().as_bytes());
    mac.update(path.as_bytes());
    mac.update(timestamp.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
