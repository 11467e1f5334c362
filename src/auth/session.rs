use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{Assertions, Claims, Error, Identity};

/// Opaque session ids backed by an in-memory table.
///
/// Sessions do not survive a restart.
pub struct SessionAssertions {
    expiration_time: Duration,
    sessions: Mutex<HashMap<Uuid, Claims>>,
}

impl SessionAssertions {
    pub const COOKIE: &'static str = "session";

    pub fn new(expiration_time: Duration) -> Self {
        Self {
            expiration_time,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Sessions held in memory, expired ones included until the next purge.
    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// Valid through the second named by `exp`, as tokens are.
fn is_expired(claims: &Claims, now: i64) -> bool {
    claims.exp < now
}

#[async_trait]
impl Assertions for SessionAssertions {
    fn cookie_name(&self) -> &'static str {
        Self::COOKIE
    }

    async fn issue(&self, identity: Identity) -> Result<String, Error> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            username: identity.username,
            role: identity.role,
            exp: (now + self.expiration_time).unix_timestamp(),
        };
        let id = Uuid::new_v4();

        let now = now.unix_timestamp();
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, session| !is_expired(session, now));
        sessions.insert(id, claims);

        Ok(id.to_string())
    }

    async fn recover(&self, assertion: &str) -> Result<Claims, Error> {
        let id = assertion.parse::<Uuid>().map_err(|_| Error::Invalid)?;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let mut sessions = self.sessions.lock().await;
        let claims = sessions.get(&id).ok_or(Error::Invalid)?;
        if is_expired(claims, now) {
            debug!("session {id} expired");
            sessions.remove(&id);
            return Err(Error::Expired);
        }
        Ok(claims.clone())
    }

    async fn revoke(&self, assertion: &str) {
        if let Ok(id) = assertion.parse::<Uuid>() {
            if self.sessions.lock().await.remove(&id).is_some() {
                debug!("session {id} revoked");
            }
        }
    }
}
