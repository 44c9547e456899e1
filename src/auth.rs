use std::time::Duration;

use tracing::{debug, warn};

use crate::config::session_key;
use crate::core::db::Store;
use crate::core::errors::ServiceResult;
use crate::core::helpers::{new_session_token, now_millis};
use crate::models::models::{SessionData, UserId};

/// Opaque session tokens mapped to a user id at `session:{token}`.
#[derive(Clone)]
pub struct SessionStore {
    store: Store,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(store: Store, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn create(&self, user_id: UserId) -> ServiceResult<String> {
        let token = new_session_token();
        let user_id = user_id.to_string();
        let created_at = now_millis().to_string();
        self.store
            .hset_multiple(
                &session_key(&token),
                &[("user_id", user_id.as_str()), ("created_at", created_at.as_str())],
            )
            .await?;
        Ok(token)
    }

    /// Returns the session behind `token`, or `None` when it is unknown or
    /// expired. Expired sessions are deleted on sight.
    pub async fn resolve(&self, token: &str) -> ServiceResult<Option<SessionData>> {
        let key = session_key(token);
        let fields = self.store.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let parsed = fields
            .get("user_id")
            .and_then(|v| v.parse::<UserId>().ok())
            .zip(fields.get("created_at").and_then(|v| v.parse::<i64>().ok()));
        let Some((user_id, created_at)) = parsed else {
            warn!("Dropping corrupt session record");
            self.store.del(&key).await?;
            return Ok(None);
        };

        let age_ms = now_millis().saturating_sub(created_at);
        if age_ms < 0 || age_ms as u128 > self.ttl.as_millis() {
            debug!(user_id, "Session expired");
            self.store.del(&key).await?;
            return Ok(None);
        }

        Ok(Some(SessionData { user_id, created_at }))
    }

    pub async fn destroy(&self, token: &str) -> ServiceResult<()> {
        self.store.del(&session_key(token)).await?;
        Ok(())
    }
}
