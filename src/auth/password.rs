//! Salted PBKDF2-HMAC-SHA256 password hashes.
//!
//! Encoded form: `pbkdf2-sha256$<rounds>$<salt hex>$<hash hex>`.

use anyhow::{anyhow, Context, Result};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

const SCHEME: &str = "pbkdf2-sha256";
pub const DEFAULT_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str, rounds: u32) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let mut hash = derive(password, &salt, rounds);
    let encoded = format!("{}${}${}${}", SCHEME, rounds, hex::encode(salt), hex::encode(hash));
    hash.zeroize();
    encoded
}

/// Check `password` against an encoded hash. Malformed records are errors,
/// not mismatches.
pub fn verify_password(password: &str, encoded: &str) -> Result<bool> {
    let mut parts = encoded.split('$');
    let (Some(scheme), Some(rounds), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(anyhow!("malformed password hash"));
    };
    if scheme != SCHEME {
        return Err(anyhow!("unsupported password hash scheme '{}'", scheme));
    }
    let rounds: u32 = rounds.parse().context("malformed password hash rounds")?;
    if rounds == 0 {
        return Err(anyhow!("password hash rounds must be non-zero"));
    }
    let salt = hex::decode(salt).context("malformed password hash salt")?;
    let expected = hex::decode(expected).context("malformed password hash digest")?;
    if expected.len() != HASH_LEN {
        return Err(anyhow!("password hash digest has wrong length"));
    }
    let mut actual = derive(password, &salt, rounds);
    let matches = constant_time_eq(&actual, &expected);
    actual.zeroize();
    Ok(matches)
}

fn derive(password: &str, salt: &[u8], rounds: u32) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut out);
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
