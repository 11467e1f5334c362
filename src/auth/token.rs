use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header,
    Validation,
};
use time::OffsetDateTime;
use tracing::{debug, error};

use super::{Assertions, Claims, Error, Identity};

/// HS256 tokens carrying `username`, `role` and `exp`.
pub struct TokenAssertions {
    expiration_time: Duration,
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
}

impl TokenAssertions {
    pub const COOKIE: &'static str = "token";

    pub fn new(secret: &[u8], expiration_time: Duration) -> Self {
        let mut validation = Validation::default();
        validation.leeway = 0;
        Self {
            expiration_time,
            decoding_key: DecodingKey::from_secret(secret),
            encoding_key: EncodingKey::from_secret(secret),
            validation,
        }
    }
}

#[async_trait]
impl Assertions for TokenAssertions {
    fn cookie_name(&self) -> &'static str {
        Self::COOKIE
    }

    async fn issue(&self, identity: Identity) -> Result<String, Error> {
        let expires_at = OffsetDateTime::now_utc() + self.expiration_time;
        encode(
            &Header::default(),
            &Claims {
                username: identity.username,
                role: identity.role,
                exp: expires_at.unix_timestamp(),
            },
            &self.encoding_key,
        )
        .map_err(|e| {
            error!("failed to sign token: {e}");
            Error::Issue
        })
    }

    async fn recover(&self, assertion: &str) -> Result<Claims, Error> {
        decode::<Claims>(assertion, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("token rejected: {e}");
                match e.kind() {
                    ErrorKind::ExpiredSignature => Error::Expired,
                    _ => Error::Invalid,
                }
            })
    }

    async fn revoke(&self, _: &str) {}
}
