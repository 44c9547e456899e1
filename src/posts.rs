use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::{post_key, NEXT_POST_ID_KEY};
use crate::core::db::Store;
use crate::core::errors::{ServiceError, ServiceResult, StoreError};
use crate::models::models::{Post, PostId, UserId};

/// Write-once post records at `post:{id}`.
#[derive(Clone)]
pub struct PostStore {
    store: Store,
}

impl PostStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Allocates the next post id and persists the record.
    ///
    /// `message` is expected to be validated already.
    pub async fn create(
        &self,
        author_id: UserId,
        author_username: &str,
        message: &str,
        created_at: i64,
    ) -> ServiceResult<PostId> {
        let raw_id = self.store.incr(NEXT_POST_ID_KEY).await?;
        let post_id = u64::try_from(raw_id).map_err(|_| StoreError::Corrupt {
            key: NEXT_POST_ID_KEY.to_string(),
            reason: format!("negative counter {}", raw_id),
        })?;

        let author_id = author_id.to_string();
        let created_at = created_at.to_string();
        self.store
            .hset_multiple(
                &post_key(post_id),
                &[
                    ("author_id", author_id.as_str()),
                    ("author_username", author_username),
                    ("message", message),
                    ("created_at", created_at.as_str()),
                ],
            )
            .await?;

        debug!(post_id, author_username, "Stored post");
        Ok(post_id)
    }

    /// Missing records and records with unreadable fields are both `NotFound`.
    pub async fn get(&self, post_id: PostId) -> ServiceResult<Post> {
        let fields = self.store.hgetall(&post_key(post_id)).await?;
        if fields.is_empty() {
            return Err(ServiceError::NotFound(format!("post {}", post_id)));
        }

        decode_post(post_id, &fields).ok_or_else(|| {
            warn!(post_id, "Corrupt post record");
            ServiceError::NotFound(format!("post {}", post_id))
        })
    }
}

fn decode_post(post_id: PostId, fields: &HashMap<String, String>) -> Option<Post> {
    Some(Post {
        id: post_id,
        author_id: fields.get("author_id")?.parse().ok()?,
        author_username: fields.get("author_username")?.clone(),
        message: fields.get("message")?.clone(),
        created_at: fields.get("created_at")?.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn posts() -> (Store, PostStore) {
        let store = Store::memory(Duration::from_secs(1));
        (store.clone(), PostStore::new(store))
    }

    #[tokio::test]
    async fn create_then_get() {
        let (_, posts) = posts();
        let id = posts.create(1, "bob", "hello", 1_700_000_000_000).await.unwrap();
        let post = posts.get(id).await.unwrap();
        assert_eq!(
            post,
            Post {
                id,
                author_id: 1,
                author_username: "bob".into(),
                message: "hello".into(),
                created_at: 1_700_000_000_000,
            }
        );
    }

    #[tokio::test]
    async fn ids_are_sequential() {
        let (_, posts) = posts();
        let a = posts.create(1, "bob", "one", 0).await.unwrap();
        let b = posts.create(2, "alice", "two", 0).await.unwrap();
        assert_eq!((a, b), (1, 2));
    }

    #[tokio::test]
    async fn missing_post_is_not_found() {
        let (_, posts) = posts();
        assert!(matches!(posts.get(42).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn corrupt_post_is_not_found() {
        let (store, posts) = posts();
        store
            .hset_multiple(&post_key(5), &[("message", "no author")])
            .await
            .unwrap();
        assert!(matches!(posts.get(5).await, Err(ServiceError::NotFound(_))));
    }
}
