//! Cookie signing and verification.
//!
//! A signed cookie stores `s:<value>.<signature>` where the signature is
//! the base64url-encoded (unpadded) HMAC-SHA256 of the value. Verification
//! accepts a list of secrets so keys can rotate: new cookies are signed
//! with the first secret while cookies signed with an older secret keep
//! verifying until they expire.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// The prefix marking a signed cookie value on the wire.
const SIGNED_PREFIX: &str = "s:";

/// The prefix marking a JSON-typed cookie value on the wire.
pub(crate) const JSON_PREFIX: &str = "j:";

/// An immutable list of signing secrets. The first entry signs new
/// cookies; every entry participates in verification.
///
#[derive(Clone)]
pub struct SecretChain {
    secrets: Arc<[String]>,
}

/// The outcome of reading a signed cookie: either the verified original
/// value or a marker that the cookie was present but failed verification.
/// The marker lets applications distinguish "absent" from "tampered".
///
#[derive(Clone, Debug, PartialEq)]
pub enum SignedCookie {
    Valid(String),
    Tampered,
}

impl SecretChain {
    /// Returns a new chain from one or more secrets.
    ///
    /// # Panics
    ///
    /// Panics if `secrets` is empty. Signing requires at least one secret.
    ///
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let secrets: Arc<[String]> = secrets.into_iter().map(Into::into).collect();

        assert!(
            !secrets.is_empty(),
            "a secret chain requires at least one secret"
        );

        Self { secrets }
    }

    /// Returns the secret used to sign new values.
    ///
    pub fn signing_secret(&self) -> &str {
        &self.secrets[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.secrets.iter().map(String::as_str)
    }
}

impl From<&str> for SecretChain {
    fn from(secret: &str) -> Self {
        Self::new([secret])
    }
}

impl std::fmt::Debug for SecretChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose secret material through Debug output.
        f.debug_struct("SecretChain")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

fn mac(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length.
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key of any length")
}

/// Sign `value` with `secret`, producing the wire form
/// `s:<value>.<base64url signature>` without padding.
///
pub fn sign(value: &str, secret: &str) -> String {
    let mut mac = mac(secret);

    mac.update(value.as_bytes());

    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{}{}.{}", SIGNED_PREFIX, value, signature)
}

/// Verify a wire value against any secret in the chain and return the
/// original value. Returns [`SignedCookie::Tampered`] when the value does
/// not carry the signed prefix, is malformed, or fails verification
/// against every secret. Verification is constant-time.
///
pub fn unsign(input: &str, secrets: &SecretChain) -> SignedCookie {
    let Some(rest) = input.strip_prefix(SIGNED_PREFIX) else {
        return SignedCookie::Tampered;
    };

    let Some((value, signature)) = rest.rsplit_once('.') else {
        return SignedCookie::Tampered;
    };

    let Ok(signature) = URL_SAFE_NO_PAD.decode(signature) else {
        return SignedCookie::Tampered;
    };

    for secret in secrets.iter() {
        let mut mac = mac(secret);

        mac.update(value.as_bytes());

        // verify_slice performs a constant-time comparison.
        if mac.verify_slice(&signature).is_ok() {
            return SignedCookie::Valid(value.to_owned());
        }
    }

    SignedCookie::Tampered
}

impl SignedCookie {
    /// Returns the verified value, if any.
    ///
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Valid(value) => Some(value),
            Self::Tampered => None,
        }
    }

    /// Decode a verified `j:`-prefixed JSON cookie value.
    ///
    pub fn as_json(&self) -> Option<serde_json::Value> {
        let value = self.value()?;
        let json = value.strip_prefix(JSON_PREFIX)?;

        serde_json::from_str(json).ok()
    }

    pub fn is_tampered(&self) -> bool {
        matches!(self, Self::Tampered)
    }
}

#[cfg(test)]
mod tests {
    use super::{sign, unsign, SecretChain, SignedCookie};

    #[test]
    fn round_trip() {
        let secrets = SecretChain::from("keyboard cat");
        let signed = sign("hello", "keyboard cat");

        assert!(signed.starts_with("s:hello."));
        assert!(!signed.ends_with('='));
        assert_eq!(unsign(&signed, &secrets), SignedCookie::Valid("hello".into()));
    }

    #[test]
    fn any_single_byte_flip_is_tampered() {
        let secrets = SecretChain::from("keyboard cat");
        let signed = sign("7", "keyboard cat");

        for index in 0..signed.len() {
            let mut bytes = signed.clone().into_bytes();
            bytes[index] ^= 0x01;

            if let Ok(flipped) = String::from_utf8(bytes) {
                assert_eq!(
                    unsign(&flipped, &secrets),
                    SignedCookie::Tampered,
                    "flip at {} verified",
                    index
                );
            }
        }
    }

    #[test]
    fn rotation_verifies_against_older_secrets() {
        let old = sign("uid", "old secret");
        let rotated = SecretChain::new(["new secret", "old secret"]);

        assert_eq!(unsign(&old, &rotated), SignedCookie::Valid("uid".into()));

        // A chain without the old secret no longer verifies.
        let without = SecretChain::from("new secret");
        assert_eq!(unsign(&old, &without), SignedCookie::Tampered);
    }

    #[test]
    fn unsigned_values_are_tampered() {
        let secrets = SecretChain::from("secret");

        assert_eq!(unsign("plain", &secrets), SignedCookie::Tampered);
        assert_eq!(unsign("s:no-signature", &secrets), SignedCookie::Tampered);
    }

    #[test]
    fn json_typed_values_decode() {
        let cookie = SignedCookie::Valid("j:{\"a\":1}".into());

        assert_eq!(cookie.as_json(), Some(serde_json::json!({"a": 1})));
        assert_eq!(SignedCookie::Tampered.as_json(), None);
    }
}
