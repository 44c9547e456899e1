use std::collections::HashSet;

use tracing::{error, info};

use crate::config::{followers_key, following_key};
use crate::core::db::Store;
use crate::core::errors::{ServiceError, ServiceResult};

/// Follow edges, kept as a forward set (`following:{user}`) and a reverse set
/// (`followers:{user}`).
#[derive(Clone)]
pub struct SocialGraph {
    store: Store,
}

impl SocialGraph {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Records `follower -> followee` in both sets. Re-following is a no-op.
    ///
    /// If the reverse write fails, a forward edge created by this call is
    /// removed again so the two sets do not drift apart.
    pub async fn follow(&self, follower: &str, followee: &str) -> ServiceResult<()> {
        if follower == followee {
            return Err(ServiceError::Validation("You cannot follow yourself".to_string()));
        }

        let added = self.store.sadd(&following_key(follower), followee).await?;

        if let Err(err) = self.store.sadd(&followers_key(followee), follower).await {
            if added {
                if let Err(rollback) = self.store.srem(&following_key(follower), followee).await {
                    error!(
                        follower,
                        followee,
                        error = %rollback,
                        "Follow rollback failed, edge sets diverged"
                    );
                }
            }
            return Err(err.into());
        }

        if added {
            info!(follower, followee, "Followed");
        }
        Ok(())
    }

    /// Removes the edge from both sets. Posts already delivered stay where they are.
    ///
    /// Removal is idempotent, so a partial failure is repaired by retrying.
    pub async fn unfollow(&self, follower: &str, followee: &str) -> ServiceResult<()> {
        let removed = self.store.srem(&following_key(follower), followee).await?;
        self.store.srem(&followers_key(followee), follower).await?;
        if removed {
            info!(follower, followee, "Unfollowed");
        }
        Ok(())
    }

    pub async fn get_following(&self, username: &str) -> ServiceResult<HashSet<String>> {
        Ok(self.store.smembers(&following_key(username)).await?)
    }

    pub async fn get_followers(&self, username: &str) -> ServiceResult<HashSet<String>> {
        Ok(self.store.smembers(&followers_key(username)).await?)
    }
}
