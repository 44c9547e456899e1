use tracing::{debug, info, warn};

use crate::config::{user_key, PasswordPolicy, NEXT_USER_ID_KEY, USERS_KEY};
use crate::core::db::Store;
use crate::core::errors::{ServiceError, ServiceResult, StoreError};
use crate::core::helpers::{hash_password, verify_password};
use crate::models::models::UserId;

/// Username → id mapping plus per-user credential records.
///
/// `users` maps every username to its id; `user:{id}` holds the username and
/// the argon2 hash.
#[derive(Clone)]
pub struct IdentityStore {
    store: Store,
    policy: PasswordPolicy,
}

impl IdentityStore {
    pub fn new(store: Store, policy: PasswordPolicy) -> Self {
        Self { store, policy }
    }

    /// Allocates the next user id for an unseen username.
    ///
    /// The id comes from an atomic counter and the mapping is written with
    /// `HSETNX`, so two concurrent signups for one name cannot both win. The
    /// loser's id is burned, never reused.
    pub async fn register(&self, username: &str) -> ServiceResult<UserId> {
        let user_id = self.allocate_id(username).await?;
        self.claim(username, user_id).await
    }

    /// Like [`register`](Self::register), but the credential is written
    /// before the username is claimed. A failed credential write leaves the
    /// name free; a lost race leaves only an unreachable `user:{id}` record.
    pub async fn register_with_credential(
        &self,
        username: &str,
        password_hash: &str,
    ) -> ServiceResult<UserId> {
        let user_id = self.allocate_id(username).await?;
        self.set_credential(user_id, username, password_hash).await?;

        match self.claim(username, user_id).await {
            Err(ServiceError::AlreadyExists(what)) => {
                if let Err(err) = self.store.del(&user_key(user_id)).await {
                    warn!(user_id, error = %err, "Could not drop orphaned credential");
                }
                Err(ServiceError::AlreadyExists(what))
            }
            other => other,
        }
    }

    async fn allocate_id(&self, username: &str) -> ServiceResult<UserId> {
        if self.find_id(username).await?.is_some() {
            return Err(ServiceError::AlreadyExists(format!("username {}", username)));
        }

        let raw_id = self.store.incr(NEXT_USER_ID_KEY).await?;
        let user_id = u64::try_from(raw_id).map_err(|_| StoreError::Corrupt {
            key: NEXT_USER_ID_KEY.to_string(),
            reason: format!("negative counter {}", raw_id),
        })?;
        Ok(user_id)
    }

    async fn claim(&self, username: &str, user_id: UserId) -> ServiceResult<UserId> {
        if !self
            .store
            .hset_nx(USERS_KEY, username, &user_id.to_string())
            .await?
        {
            warn!(username, burned_id = user_id, "Lost signup race");
            return Err(ServiceError::AlreadyExists(format!("username {}", username)));
        }

        info!(user_id, username, "Registered user");
        Ok(user_id)
    }

    /// Stores (or replaces) the credential for `user_id`, keeping the username
    /// next to it for reverse lookups.
    pub async fn set_credential(
        &self,
        user_id: UserId,
        username: &str,
        password_hash: &str,
    ) -> ServiceResult<()> {
        self.store
            .hset_multiple(
                &user_key(user_id),
                &[("username", username), ("hash", password_hash)],
            )
            .await?;
        debug!(user_id, "Stored credential");
        Ok(())
    }

    pub async fn find_id(&self, username: &str) -> ServiceResult<Option<UserId>> {
        match self.store.hget(USERS_KEY, username).await? {
            Some(raw) => raw.parse::<UserId>().map(Some).map_err(|e| {
                StoreError::Corrupt {
                    key: format!("{}[{}]", USERS_KEY, username),
                    reason: e.to_string(),
                }
                .into()
            }),
            None => Ok(None),
        }
    }

    pub async fn lookup_id(&self, username: &str) -> ServiceResult<UserId> {
        self.find_id(username)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", username)))
    }

    pub async fn lookup_username(&self, user_id: UserId) -> ServiceResult<String> {
        self.store
            .hget(&user_key(user_id), "username")
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", user_id)))
    }

    /// Checks `plaintext` against the stored argon2 hash.
    ///
    /// Verification is CPU bound, so it runs on the blocking pool.
    pub async fn verify_password(&self, user_id: UserId, plaintext: &str) -> ServiceResult<bool> {
        let hash = self
            .store
            .hget(&user_key(user_id), "hash")
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("credential for user {}", user_id)))?;

        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || verify_password(&plaintext, &hash))
            .await
            .map_err(|e| ServiceError::Internal(format!("password check task failed: {}", e)))
    }

    pub async fn hash_password(&self, plaintext: &str) -> ServiceResult<String> {
        let plaintext = plaintext.to_string();
        let policy = self.policy;
        tokio::task::spawn_blocking(move || hash_password(&plaintext, &policy))
            .await
            .map_err(|e| ServiceError::Internal(format!("password hash task failed: {}", e)))?
            .map_err(|e| ServiceError::Internal(e.to_string()))
    }

    /// Every registered username, in no particular order.
    pub async fn usernames(&self) -> ServiceResult<Vec<String>> {
        Ok(self.store.hkeys(USERS_KEY).await?)
    }
}
