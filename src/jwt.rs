//! Key-pair authentication for targets that set `private_key_path`.
use std::path::Path;

pub use jwt_simple::algorithms::RS256KeyPair;
use jwt_simple::prelude::*;

use crate::errors::SnowflakeResult;

/// Load an unencrypted PKCS#8 PEM private key
pub fn load_key_pair(path: &Path) -> SnowflakeResult<RS256KeyPair> {
    let pem = std::fs::read_to_string(path)?;
    Ok(RS256KeyPair::from_pem(&pem)?)
}

/// SHA-256 fingerprint of the public key, in the padded standard base64 Snowflake stores
pub fn public_key_fingerprint(key_pair: &RS256KeyPair) -> String {
    let mut fingerprint = key_pair
        .public_key()
        .sha256_thumbprint()
        .replace('-', "+")
        .replace('_', "/");
    while fingerprint.len() % 4 != 0 {
        fingerprint.push('=');
    }
    fingerprint
}

/// Sign the login token sent with `AUTHENTICATOR = SNOWFLAKE_JWT`
pub fn login_token(key_pair: &RS256KeyPair, account: &str, user: &str) -> SnowflakeResult<String> {
    // The issuer uses the bare account locator: AAA00000.us-east-1 becomes AAA00000
    let locator = account.split('.').next().unwrap_or(account);
    let qualified_user = format!(
        "{}.{}",
        locator.to_ascii_uppercase(),
        user.to_ascii_uppercase()
    );
    let fingerprint = public_key_fingerprint(key_pair);
    log::debug!("Public key fingerprint: {fingerprint}");
    let claims = Claims::create(Duration::from_mins(5))
        .with_issuer(format!("{qualified_user}.SHA256:{fingerprint}"))
        .with_subject(qualified_user);
    Ok(key_pair.sign(claims)?)
}
