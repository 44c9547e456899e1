use std::collections::BTreeSet;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::timeline_key;
use crate::core::db::Store;
use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::helpers::{from_millis, now_millis, relative_age};
use crate::follow::SocialGraph;
use crate::models::models::{PostId, PublishReport, TimelineEntry};
use crate::posts::PostStore;
use crate::users::IdentityStore;

/// Pushes each new post into the author's timeline and every follower's.
#[derive(Clone)]
pub struct FanoutEngine {
    store: Store,
    identities: IdentityStore,
    posts: PostStore,
    graph: SocialGraph,
}

impl FanoutEngine {
    pub fn new(store: Store, identities: IdentityStore, posts: PostStore, graph: SocialGraph) -> Self {
        Self {
            store,
            identities,
            posts,
            graph,
        }
    }

    /// Creates the post and fans it out.
    ///
    /// Failing to reach the author's own timeline is an error. Follower
    /// deliveries run concurrently; each failure is logged and counted in the
    /// report but never fails the publish. Followers are read once, so anyone
    /// who follows after this point does not get the post.
    pub async fn publish(&self, author_username: &str, message: &str) -> ServiceResult<PublishReport> {
        let author_id = self.identities.lookup_id(author_username).await?;
        let post_id = self
            .posts
            .create(author_id, author_username, message, now_millis())
            .await?;

        self.store
            .lpush(&timeline_key(author_username), &post_id.to_string())
            .await?;

        let followers = match self.graph.get_followers(author_username).await {
            Ok(followers) => followers,
            Err(err) => {
                warn!(post_id, author = author_username, error = %err, "Could not read followers, post reached author only");
                return Ok(PublishReport {
                    post_id,
                    delivered: 0,
                    failed: 0,
                });
            }
        };

        let mut deliveries = JoinSet::new();
        for follower in followers.into_iter().filter(|f| f != author_username) {
            let store = self.store.clone();
            deliveries.spawn(async move {
                let result = store
                    .lpush(&timeline_key(&follower), &post_id.to_string())
                    .await;
                (follower, result)
            });
        }

        let mut report = PublishReport {
            post_id,
            delivered: 0,
            failed: 0,
        };
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.delivered += 1,
                Ok((follower, Err(err))) => {
                    warn!(post_id, follower = %follower, error = %err, "Timeline delivery failed");
                    report.failed += 1;
                }
                Err(err) => {
                    warn!(post_id, error = %err, "Timeline delivery task aborted");
                    report.failed += 1;
                }
            }
        }

        info!(
            post_id,
            author = author_username,
            delivered = report.delivered,
            failed = report.failed,
            "Published post"
        );
        Ok(report)
    }
}

/// Reads a user's precomputed timeline and resolves it for display.
#[derive(Clone)]
pub struct TimelineAssembler {
    store: Store,
    identities: IdentityStore,
    posts: PostStore,
    graph: SocialGraph,
}

impl TimelineAssembler {
    pub fn new(store: Store, identities: IdentityStore, posts: PostStore, graph: SocialGraph) -> Self {
        Self {
            store,
            identities,
            posts,
            graph,
        }
    }

    /// Up to `limit` newest entries, in stored order. Unresolvable references
    /// are skipped, so the result can be shorter than `limit`.
    pub async fn get_timeline(&self, username: &str, limit: usize) -> ServiceResult<Vec<TimelineEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let stop = isize::try_from(limit - 1).unwrap_or(isize::MAX);
        let references = self.store.lrange(&timeline_key(username), 0, stop).await?;
        let now = Utc::now();

        let mut entries = Vec::with_capacity(references.len());
        for raw in references.iter().take(limit) {
            let post_id: PostId = match raw.parse() {
                Ok(id) => id,
                Err(_) => {
                    warn!(username, reference = %raw, "Skipping unparsable timeline reference");
                    continue;
                }
            };

            let post = match self.posts.get(post_id).await {
                Ok(post) => post,
                Err(ServiceError::NotFound(_)) => {
                    debug!(username, post_id, "Skipping missing post");
                    continue;
                }
                Err(err) => return Err(err),
            };

            let Some(created_at) = from_millis(post.created_at) else {
                warn!(post_id, created_at = post.created_at, "Skipping post with invalid timestamp");
                continue;
            };

            entries.push(TimelineEntry {
                post_id,
                message: post.message,
                author_username: post.author_username,
                created_at,
                relative_age: relative_age(created_at, now),
            });
        }

        Ok(entries)
    }

    /// Everyone the caller does not follow yet, excluding the caller.
    pub async fn get_suggestions(&self, username: &str) -> ServiceResult<BTreeSet<String>> {
        let following = self.graph.get_following(username).await?;
        Ok(self
            .identities
            .usernames()
            .await?
            .into_iter()
            .filter(|candidate| candidate != username && !following.contains(candidate))
            .collect())
    }
}
