//! Identity assertions: what a browser carries between requests to prove who
//! signed in.
//!
//! Two interchangeable implementations exist. [`TokenAssertions`] hands out
//! a self-contained signed token, [`SessionAssertions`] hands out an opaque
//! id whose identity is kept in server memory. Handlers only ever see the
//! [`Assertions`] trait.

pub mod session;
pub mod token;

use std::sync::Arc;

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{config, db::user::Role};

pub use self::{session::SessionAssertions, token::TokenAssertions};

/// Signed-in caller, as recovered from an assertion.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Identity {
    pub username: String,
    pub role: Role,
}

/// Everything an assertion states about its bearer.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Claims {
    pub username: String,
    pub role: Role,
    /// Unix timestamp, in seconds.
    pub exp: i64,
}

impl Claims {
    pub fn identity(self) -> Identity {
        Identity {
            username: self.username,
            role: self.role,
        }
    }
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Error {
    #[display("Token expired")]
    Expired,
    #[display("Invalid token")]
    Invalid,
    #[display("Failed to issue token")]
    Issue,
}

impl std::error::Error for Error {}

#[async_trait]
pub trait Assertions: Send + Sync {
    /// Cookie the assertion travels in.
    fn cookie_name(&self) -> &'static str;

    async fn issue(&self, identity: Identity) -> Result<String, Error>;

    async fn recover(&self, assertion: &str) -> Result<Claims, Error>;

    /// Makes `assertion` unusable, where the implementation can.
    async fn revoke(&self, assertion: &str);
}

pub fn from_config(config: &config::Auth) -> Arc<dyn Assertions> {
    match config {
        config::Auth::Token {
            secret,
            expiration_time,
        } => Arc::new(TokenAssertions::new(
            secret.as_bytes(),
            *expiration_time,
        )),
        config::Auth::Session { expiration_time } => {
            Arc::new(SessionAssertions::new(*expiration_time))
        }
    }
}
