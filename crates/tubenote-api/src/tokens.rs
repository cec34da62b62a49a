use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use tubenote_types::api::{Claims, RefreshClaims};

use crate::config::Config;

/// HS256 keys for both token kinds. Separate secrets mean a refresh token can
/// never pass as an access token or vice versa.
pub struct Keys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl Keys {
    pub fn new(config: &Config) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn create_access(&self, user_id: Uuid, username: &str) -> anyhow::Result<(String, Claims)> {
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            exp: expiry(self.access_ttl) as usize,
        };
        let token = encode(&Header::default(), &claims, &self.access_encoding)?;
        Ok((token, claims))
    }

    pub fn verify_access(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        decode::<Claims>(token, &self.access_decoding, &Validation::default()).map(|data| data.claims)
    }

    /// Returns the token and its unix expiry, which the caller persists
    /// alongside the `jti`.
    pub fn create_refresh(&self, user_id: Uuid, jti: Uuid) -> anyhow::Result<(String, i64)> {
        let exp = expiry(self.refresh_ttl);
        let claims = RefreshClaims {
            sub: user_id,
            jti,
            exp: exp as usize,
        };
        let token = encode(&Header::default(), &claims, &self.refresh_encoding)?;
        Ok((token, exp))
    }

    pub fn verify_refresh(&self, token: &str) -> jsonwebtoken::errors::Result<RefreshClaims> {
        decode::<RefreshClaims>(token, &self.refresh_decoding, &Validation::default())
            .map(|data| data.claims)
    }
}

fn expiry(ttl: Duration) -> i64 {
    chrono::Utc::now().timestamp() + ttl.as_secs() as i64
}

/// Hex SHA-256. Only digests of bearer secrets are stored.
pub fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// 256 random bits, base64url without padding. Used for email and CSRF tokens.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
