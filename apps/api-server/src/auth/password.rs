use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const SCHEME: &str = "pbkdf2_sha256";
const ITERATIONS: u32 = 310_000;
const SALT_BYTES: usize = 16;
const DERIVED_BYTES: usize = 32;

/// Hashes a password into the `scheme$iterations$salt$digest` form. Policy
/// validation happens before this is called; blank input is still rejected.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    if password.is_empty() {
        anyhow::bail!("Password cannot be blank");
    }

    let mut salt = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut salt);
    let derived = derive(password.as_bytes(), &salt, ITERATIONS);

    Ok(format!(
        "{}${}${}${}",
        SCHEME,
        ITERATIONS,
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(derived)
    ))
}

/// Constant-time verification against a stored hash. Any malformed hash
/// verifies false rather than erroring.
pub fn verify_password(password_hash: &str, password: &str) -> bool {
    let Some((iterations, salt, expected)) = parse_hash(password_hash) else {
        return false;
    };
    if password.is_empty() {
        return false;
    }

    let derived = derive(password.as_bytes(), &salt, iterations);
    derived.ct_eq(expected.as_slice()).into()
}

fn parse_hash(password_hash: &str) -> Option<(u32, Vec<u8>, Vec<u8>)> {
    let mut parts = password_hash.splitn(4, '$');
    if parts.next()? != SCHEME {
        return None;
    }
    let iterations: u32 = parts.next()?.parse().ok()?;
    let salt = STANDARD_NO_PAD.decode(parts.next()?).ok()?;
    let expected = STANDARD_NO_PAD.decode(parts.next()?).ok()?;
    Some((iterations, salt, expected))
}

fn derive(password: &[u8], salt: &[u8], iterations: u32) -> [u8; DERIVED_BYTES] {
    let mut out = [0u8; DERIVED_BYTES];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}
