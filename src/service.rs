use tracing::info;

use crate::auth::SessionStore;
use crate::config::{Config, MAX_USERNAME_LENGTH};
use crate::core::db::Store;
use crate::core::errors::{ServiceError, ServiceResult};
use crate::core::helpers::is_valid_username;
use crate::follow::SocialGraph;
use crate::models::models::{AuthOutcome, HomePage, PublishReport, User, UserId};
use crate::posts::PostStore;
use crate::timeline::{FanoutEngine, TimelineAssembler};
use crate::users::IdentityStore;

/// The social feed: every component wired over one shared [`Store`].
///
/// Methods take already-parsed input and the caller's user id; nothing here
/// knows about HTTP.
#[derive(Clone)]
pub struct Perch {
    store: Store,
    identities: IdentityStore,
    graph: SocialGraph,
    posts: PostStore,
    fanout: FanoutEngine,
    assembler: TimelineAssembler,
    sessions: SessionStore,
    timeline_window: usize,
    max_message_len: usize,
}

impl Perch {
    pub fn new(store: Store, config: &Config) -> Self {
        let identities = IdentityStore::new(store.clone(), config.password_policy);
        let graph = SocialGraph::new(store.clone());
        let posts = PostStore::new(store.clone());
        let fanout = FanoutEngine::new(store.clone(), identities.clone(), posts.clone(), graph.clone());
        let assembler =
            TimelineAssembler::new(store.clone(), identities.clone(), posts.clone(), graph.clone());
        let sessions = SessionStore::new(store.clone(), config.session_ttl);

        Self {
            store,
            identities,
            graph,
            posts,
            fanout,
            assembler,
            sessions,
            timeline_window: config.timeline_window,
            max_message_len: config.max_message_len,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn identities(&self) -> &IdentityStore {
        &self.identities
    }

    pub fn posts(&self) -> &PostStore {
        &self.posts
    }

    pub fn assembler(&self) -> &TimelineAssembler {
        &self.assembler
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn max_message_len(&self) -> usize {
        self.max_message_len
    }

    /// Logs in an existing user or signs up an unseen username.
    ///
    /// Both branches cost one argon2 operation, and a wrong password is
    /// reported the same way whatever the cause.
    pub async fn authenticate(&self, username: &str, password: &str) -> ServiceResult<AuthOutcome> {
        if username.is_empty() || password.is_empty() {
            return Err(ServiceError::Validation(
                "Please provide both username and password".to_string(),
            ));
        }
        if !is_valid_username(username) {
            return Err(ServiceError::Validation(format!(
                "Usernames are 1-{} letters, digits or underscores",
                MAX_USERNAME_LENGTH
            )));
        }

        if let Some(user_id) = self.identities.find_id(username).await? {
            return self.login(user_id, username, password).await;
        }

        match self.signup(username, password).await {
            Err(ServiceError::AlreadyExists(_)) => {
                // someone registered the name between our lookup and HSETNX
                let user_id = self.identities.lookup_id(username).await?;
                self.login(user_id, username, password).await
            }
            other => other,
        }
    }

    async fn signup(&self, username: &str, password: &str) -> ServiceResult<AuthOutcome> {
        let hash = self.identities.hash_password(password).await?;
        let user_id = self
            .identities
            .register_with_credential(username, &hash)
            .await?;

        info!(user_id, username, "Signed up");
        Ok(AuthOutcome {
            user: User {
                id: user_id,
                username: username.to_string(),
            },
            created: true,
        })
    }

    async fn login(&self, user_id: UserId, username: &str, password: &str) -> ServiceResult<AuthOutcome> {
        let verified = match self.identities.verify_password(user_id, password).await {
            Ok(verified) => verified,
            // registered but credential not written yet
            Err(ServiceError::NotFound(_)) => false,
            Err(err) => return Err(err),
        };
        if !verified {
            info!(user_id, "Rejected login");
            return Err(ServiceError::IncorrectPassword);
        }

        info!(user_id, username, "Logged in");
        Ok(AuthOutcome {
            user: User {
                id: user_id,
                username: username.to_string(),
            },
            created: false,
        })
    }

    pub async fn user(&self, user_id: UserId) -> ServiceResult<User> {
        let username = self.identities.lookup_username(user_id).await?;
        Ok(User { id: user_id, username })
    }

    /// Validates the message and fans it out from `user_id`.
    pub async fn publish(&self, user_id: UserId, message: &str) -> ServiceResult<PublishReport> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ServiceError::Validation("Please write a message".to_string()));
        }
        if message.chars().count() > self.max_message_len {
            return Err(ServiceError::Validation(format!(
                "Messages are limited to {} characters",
                self.max_message_len
            )));
        }

        let author = self.user(user_id).await?;
        self.fanout.publish(&author.username, message).await
    }

    pub async fn follow(&self, user_id: UserId, target: &str) -> ServiceResult<()> {
        let target = target.trim();
        if target.is_empty() {
            return Err(ServiceError::Validation("Please choose someone to follow".to_string()));
        }
        let follower = self.user(user_id).await?;
        self.identities.lookup_id(target).await?;
        self.graph.follow(&follower.username, target).await
    }

    pub async fn unfollow(&self, user_id: UserId, target: &str) -> ServiceResult<()> {
        let target = target.trim();
        if target.is_empty() {
            return Err(ServiceError::Validation("Please choose someone to unfollow".to_string()));
        }
        let follower = self.user(user_id).await?;
        self.graph.unfollow(&follower.username, target).await
    }

    /// Timeline window plus follow suggestions for the home page.
    pub async fn home(&self, user_id: UserId) -> ServiceResult<HomePage> {
        let user = self.user(user_id).await?;
        let timeline = self
            .assembler
            .get_timeline(&user.username, self.timeline_window)
            .await?;
        let suggestions = self.assembler.get_suggestions(&user.username).await?;
        let mut following: Vec<String> = self
            .graph
            .get_following(&user.username)
            .await?
            .into_iter()
            .collect();
        following.sort();

        Ok(HomePage {
            user,
            timeline,
            suggestions: suggestions.into_iter().collect(),
            following,
        })
    }
}
