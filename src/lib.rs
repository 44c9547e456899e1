//! perch: a small social feed.
//!
//! Users sign up or log in with one form, follow each other and post short
//! messages. Each post is pushed into the author's timeline and every
//! follower's timeline when it is published (fan-out on write), so reading a
//! timeline is a single range read of precomputed post ids.

pub mod auth;
pub mod config;
pub mod follow;
pub mod handlers;
pub mod posts;
pub mod service;
pub mod static_server;
pub mod templates;
pub mod timeline;
pub mod users;

pub mod core {
    pub mod db;
    pub mod errors;
    pub mod helpers;
    pub mod redis_store;
}

pub mod models {
    pub mod models;
}

pub use crate::config::Config;
pub use crate::core::db::{KeyValueStore, MemoryStore, Store};
pub use crate::core::errors::{ApiError, ServiceError, StoreError};
pub use crate::core::redis_store::RedisStore;
pub use crate::service::Perch;
