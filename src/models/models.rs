use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = u64;
pub type PostId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub author_username: String,
    pub message: String,
    /// Milliseconds since the epoch.
    pub created_at: i64,
}

/// A post resolved for display on a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub post_id: PostId,
    pub message: String,
    pub author_username: String,
    pub created_at: DateTime<Utc>,
    pub relative_age: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: UserId,
    pub created_at: i64,
}

/// Result of a signup-or-login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub user: User,
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub post_id: PostId,
    /// Follower timelines that received the post (the author's own excluded).
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HomePage {
    pub user: User,
    pub timeline: Vec<TimelineEntry>,
    pub suggestions: Vec<String>,
    pub following: Vec<String>,
}

// === Form bodies ===

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct FollowForm {
    #[serde(default)]
    pub username: String,
}
