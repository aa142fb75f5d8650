//! TOTP two-factor authentication (RFC 6238).
//!
//! SHA-1, 6 digits, 30-second steps, one step of clock skew in either
//! direction. Secrets are 20 random bytes, base32-encoded for authenticator
//! apps and stored encrypted under the master key (see `crypto`).

use base32::Alphabet;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{AppError, Result};

type HmacSha1 = Hmac<Sha1>;

const BASE32: Alphabet = Alphabet::Rfc4648 { padding: false };

/// Time step in seconds.
pub const STEP_SECS: i64 = 30;

/// Accepted clock skew, in steps, on each side of "now".
const SKEW_STEPS: i64 = 1;

const CODE_DIGITS: usize = 6;
const SECRET_BYTES: usize = 20;

/// Generate a new base32-encoded TOTP secret.
pub fn generate_secret() -> String {
    use rand::RngCore;
    use rand::rngs::OsRng;
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base32::encode(BASE32, &bytes)
}

fn decode_secret(secret: &str) -> Result<Vec<u8>> {
    base32::decode(BASE32, secret.trim())
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| AppError::Internal("Invalid TOTP secret encoding".into()))
}

/// HOTP dynamic truncation (RFC 4226 §5.3) reduced to 6 digits.
fn hotp(key: &[u8], counter: u64) -> u32 {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let bin = ((digest[offset] & 0x7f) as u32) << 24
        | (digest[offset + 1] as u32) << 16
        | (digest[offset + 2] as u32) << 8
        | (digest[offset + 3] as u32);

    bin % 1_000_000
}

/// The code an authenticator shows for `secret` at unix time `now`.
pub fn code_at(secret: &str, now: i64) -> Result<String> {
    let key = decode_secret(secret)?;
    let counter = (now / STEP_SECS).max(0) as u64;
    Ok(format!("{:0width$}", hotp(&key, counter), width = CODE_DIGITS))
}

/// Check a presented code against `secret` at unix time `now`, allowing
/// one step of skew either way. Malformed codes verify false, never error.
pub fn verify(secret: &str, code: &str, now: i64) -> Result<bool> {
    let code = code.trim();
    if code.len() != CODE_DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(false);
    }

    let key = decode_secret(secret)?;
    let current = now / STEP_SECS;
    for skew in -SKEW_STEPS..=SKEW_STEPS {
        let counter = current + skew;
        if counter < 0 {
            continue;
        }
        let expected = format!("{:0width$}", hotp(&key, counter as u64), width = CODE_DIGITS);
        if expected == code {
            return Ok(true);
        }
    }
    Ok(false)
}

/// otpauth URI for enrolling the secret in an authenticator app.
pub fn provisioning_uri(secret: &str, account: &str) -> String {
    format!(
        "otpauth://totp/KKS:{account}?secret={secret}&issuer=KKS&algorithm=SHA1&digits=6&period=30"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 appendix B reference secret ("12345678901234567890" in ASCII).
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn matches_rfc6238_sha1_vectors() {
        let vectors = [
            (59, "287082"),
            (1_111_111_109, "081804"),
            (1_111_111_111, "050471"),
            (1_234_567_890, "005924"),
            (2_000_000_000, "279037"),
            (20_000_000_000, "353130"),
        ];
        for (time, expected) in vectors {
            assert_eq!(code_at(RFC_SECRET, time).unwrap(), expected, "t={}", time);
        }
    }

    #[test]
    fn verify_accepts_current_code() {
        let now = 1_700_000_000;
        let code = code_at(RFC_SECRET, now).unwrap();
        assert!(verify(RFC_SECRET, &code, now).unwrap());
    }

    #[test]
    fn verify_tolerates_one_step_of_skew() {
        let now = 1_700_000_000;
        let previous = code_at(RFC_SECRET, now - STEP_SECS).unwrap();
        let next = code_at(RFC_SECRET, now + STEP_SECS).unwrap();
        assert!(verify(RFC_SECRET, &previous, now).unwrap());
        assert!(verify(RFC_SECRET, &next, now).unwrap());
    }

    #[test]
    fn verify_rejects_outside_skew() {
        let now = 1_700_000_000;
        let stale = code_at(RFC_SECRET, now - 2 * STEP_SECS).unwrap();
        assert!(!verify(RFC_SECRET, &stale, now).unwrap());
    }

    #[test]
    fn verify_rejects_malformed_codes() {
        let now = 1_700_000_000;
        for bad in ["", "12345", "1234567", "12a456", "绳绳绳绳绳绳"] {
            assert!(!verify(RFC_SECRET, bad, now).unwrap());
        }
    }

    #[test]
    fn verify_trims_whitespace() {
        let now = 1_700_000_000;
        let code = code_at(RFC_SECRET, now).unwrap();
        assert!(verify(RFC_SECRET, &format!(" {} ", code), now).unwrap());
    }

    #[test]
    fn generated_secrets_decode_and_differ() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b);
        assert_eq!(decode_secret(&a).unwrap().len(), SECRET_BYTES);
    }

    #[test]
    fn invalid_secret_errors() {
        assert!(code_at("not!base32!", 0).is_err());
    }

    #[test]
    fn provisioning_uri_carries_parameters() {
        let uri = provisioning_uri("ABC234", "kari@kks.no");
        assert!(uri.starts_with("otpauth://totp/KKS:kari@kks.no?"));
        assert!(uri.contains("secret=ABC234"));
        assert!(uri.contains("issuer=KKS"));
        assert!(uri.contains("period=30"));
    }
}
