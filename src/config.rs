use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

// === Store keys ===
pub const USERS_KEY: &str = "users";
pub const NEXT_USER_ID_KEY: &str = "next_user_id";
pub const NEXT_POST_ID_KEY: &str = "next_post_id";

pub fn user_key(user_id: u64) -> String {
    format!("user:{}", user_id)
}

pub fn post_key(post_id: u64) -> String {
    format!("post:{}", post_id)
}

pub fn following_key(username: &str) -> String {
    format!("following:{}", username)
}

pub fn followers_key(username: &str) -> String {
    format!("followers:{}", username)
}

pub fn timeline_key(username: &str) -> String {
    format!("timeline:{}", username)
}

pub fn session_key(token: &str) -> String {
    format!("session:{}", token)
}

// === Limits ===
pub const MAX_USERNAME_LENGTH: usize = 32;
pub const DEFAULT_TIMELINE_WINDOW: usize = 50;
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 280;

/// Argon2 work factor used when hashing new passwords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        // argon2 crate defaults (OWASP minimum for argon2id)
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Unset means the in-process memory store.
    pub redis_url: Option<String>,
    pub session_ttl: Duration,
    pub store_timeout: Duration,
    pub timeline_window: usize,
    pub max_message_len: usize,
    pub password_policy: PasswordPolicy,
    pub secure_cookies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            redis_url: None,
            session_ttl: Duration::from_secs(10 * 60 * 60),
            store_timeout: Duration::from_millis(2000),
            timeline_window: DEFAULT_TIMELINE_WINDOW,
            max_message_len: DEFAULT_MAX_MESSAGE_LENGTH,
            password_policy: PasswordPolicy::default(),
            secure_cookies: false,
        }
    }
}

impl Config {
    /// Reads `PERCH_*` variables from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let session_minutes: u64 = parse_or(&lookup, "PERCH_SESSION_TTL_MINUTES", 600)?;
        let timeout_ms: u64 = parse_or(&lookup, "PERCH_STORE_TIMEOUT_MS", 2000)?;
        let session_secs = session_minutes
            .checked_mul(60)
            .filter(|secs| i64::try_from(*secs).is_ok())
            .ok_or_else(|| {
                anyhow::anyhow!("PERCH_SESSION_TTL_MINUTES is too large: {}", session_minutes)
            })?;

        let config = Config {
            host: lookup("PERCH_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PERCH_PORT", defaults.port)?,
            redis_url: lookup("PERCH_REDIS_URL").filter(|url| !url.trim().is_empty()),
            session_ttl: Duration::from_secs(session_secs),
            store_timeout: Duration::from_millis(timeout_ms),
            timeline_window: parse_or(&lookup, "PERCH_TIMELINE_WINDOW", defaults.timeline_window)?,
            max_message_len: parse_or(&lookup, "PERCH_MAX_MESSAGE_LEN", defaults.max_message_len)?,
            password_policy: PasswordPolicy {
                memory_kib: parse_or(&lookup, "PERCH_ARGON2_MEMORY_KIB", defaults.password_policy.memory_kib)?,
                iterations: parse_or(&lookup, "PERCH_ARGON2_ITERATIONS", defaults.password_policy.iterations)?,
                parallelism: parse_or(&lookup, "PERCH_ARGON2_PARALLELISM", defaults.password_policy.parallelism)?,
            },
            secure_cookies: parse_or(&lookup, "PERCH_SECURE_COOKIES", defaults.secure_cookies)?,
        };

        if config.session_ttl.is_zero() {
            anyhow::bail!("PERCH_SESSION_TTL_MINUTES must be at least 1");
        }
        if config.store_timeout.is_zero() {
            anyhow::bail!("PERCH_STORE_TIMEOUT_MS must be at least 1");
        }
        if config.timeline_window == 0 {
            anyhow::bail!("PERCH_TIMELINE_WINDOW must be at least 1");
        }

        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value {:?} for {}: {}", raw, name, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.redis_url, None);
        assert_eq!(config.session_ttl, Duration::from_secs(36_000));
        assert_eq!(config.timeline_window, DEFAULT_TIMELINE_WINDOW);
        assert_eq!(config.password_policy, PasswordPolicy::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("PERCH_PORT", "8080"),
            ("PERCH_REDIS_URL", "redis://127.0.0.1/"),
            ("PERCH_SESSION_TTL_MINUTES", "1"),
            ("PERCH_STORE_TIMEOUT_MS", "250"),
            ("PERCH_SECURE_COOKIES", "true"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1/"));
        assert_eq!(config.session_ttl, Duration::from_secs(60));
        assert_eq!(config.store_timeout, Duration::from_millis(250));
        assert!(config.secure_cookies);
    }

    #[test]
    fn blank_redis_url_means_memory_store() {
        let config = Config::from_lookup(lookup_from(&[("PERCH_REDIS_URL", "  ")])).unwrap();
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn garbage_values_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[("PERCH_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PERCH_PORT"));

        assert!(Config::from_lookup(lookup_from(&[("PERCH_SESSION_TTL_MINUTES", "0")])).is_err());
    }

    #[test]
    fn oversized_session_ttl_is_rejected() {
        let max = u64::MAX.to_string();
        let err = Config::from_lookup(lookup_from(&[("PERCH_SESSION_TTL_MINUTES", max.as_str())]))
            .unwrap_err();
        assert!(err.to_string().contains("PERCH_SESSION_TTL_MINUTES"));

        let past_i64 = (i64::MAX as u64 / 60 + 1).to_string();
        assert!(
            Config::from_lookup(lookup_from(&[("PERCH_SESSION_TTL_MINUTES", past_i64.as_str())]))
                .is_err()
        );
    }

    #[test]
    fn keys_follow_the_store_layout() {
        assert_eq!(user_key(7), "user:7");
        assert_eq!(post_key(3), "post:3");
        assert_eq!(timeline_key("bob"), "timeline:bob");
        assert_eq!(followers_key("bob"), "followers:bob");
        assert_eq!(following_key("alice"), "following:alice");
    }
}
