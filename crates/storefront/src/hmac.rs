//! HMAC-SHA256 signing for payment gateway traffic.
//!
//! The gateway signs a canonical message built from every `checkout-*`
//! parameter (lowercased key, sorted, `key:value`, one per line) followed by
//! a newline and the raw body. The same construction is used for outbound
//! requests, gateway responses and inbound callbacks.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::constants::CHECKOUT_PREFIX;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 over the given bytes using the shared secret.
/// Returns the hex-encoded MAC.
pub fn compute_hmac(secret: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    let result = mac.finalize();
    hex::encode(result.into_bytes())
}

/// Verify an HMAC-SHA256 signature against the expected message.
/// Returns `true` if the signature is valid.
///
/// Uses constant-time comparison to prevent timing attacks.
/// Invalid hex signatures are handled without timing side-channels.
pub fn verify_hmac(secret: &[u8], message: &[u8], signature: &str) -> bool {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);

    // Decode hex first - if invalid, compare against zeros to maintain constant-time
    let expected = hex::decode(signature).unwrap_or_else(|_| vec![0u8; 32]);

    // hmac crate's verify_slice uses constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

/// Build the canonical message for a set of parameters and a body.
///
/// Only `checkout-*` keys take part; matching is case-insensitive and the
/// output is independent of the input order.
pub fn canonical_message<'a, I>(params: I, body: &[u8]) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let signed: BTreeMap<String, &str> = params
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .filter(|(k, _)| k.starts_with(CHECKOUT_PREFIX))
        .collect();

    let mut message = Vec::with_capacity(body.len() + signed.len() * 32);
    for (key, value) in &signed {
        message.extend_from_slice(key.as_bytes());
        message.push(b':');
        message.extend_from_slice(value.as_bytes());
        message.push(b'\n');
    }
    message.extend_from_slice(body);
    message
}

/// Sign `checkout-*` parameters plus body.
pub fn sign_params<'a, I>(secret: &[u8], params: I, body: &[u8]) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    compute_hmac(secret, &canonical_message(params, body))
}

/// Verify a signature produced by [`sign_params`].
pub fn verify_params<'a, I>(secret: &[u8], params: I, body: &[u8], signature: &str) -> bool
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    verify_hmac(secret, &canonical_message(params, body), signature)
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().fold(String::new(), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{b:02x}");
            s
        })
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, ()> {
        if !s.len().is_multiple_of(2) || !s.is_ascii() {
            return Err(());
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
            .collect()
    }
}
