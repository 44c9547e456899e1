use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::OsRng;
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::config::{PasswordPolicy, MAX_USERNAME_LENGTH};

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

pub fn new_session_token() -> String {
    Uuid::new_v4().to_string()
}

pub fn hash_password(password: &str, policy: &PasswordPolicy) -> anyhow::Result<String> {
    let params = Params::new(policy.memory_kib, policy.iterations, policy.parallelism, None)
        .map_err(|e| anyhow::anyhow!("Invalid argon2 parameters: {}", e))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

/// Parameters come from the PHC string, so hashes made under an older policy still verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("Regex should compile"))
}

pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= MAX_USERNAME_LENGTH
        && username_regex().is_match(username)
}

/// Human readable age of `then` as seen from `now`, e.g. "5 minutes ago".
pub fn relative_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds().max(0);

    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;
    const MONTH: i64 = 30 * DAY;
    const YEAR: i64 = 365 * DAY;

    let (amount, unit) = match seconds {
        s if s < MINUTE => return "just now".to_string(),
        s if s < HOUR => (s / MINUTE, "minute"),
        s if s < DAY => (s / HOUR, "hour"),
        s if s < MONTH => (s / DAY, "day"),
        s if s < YEAR => (s / MONTH, "month"),
        s => (s / YEAR, "year"),
    };

    if amount == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", amount, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cheap_policy() -> PasswordPolicy {
        PasswordPolicy {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("hunter2", &cheap_policy()).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let a = hash_password("pw", &cheap_policy()).unwrap();
        let b = hash_password("pw", &cheap_policy()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("pw", "not-a-phc-string"));
        assert!(!verify_password("pw", ""));
    }

    #[test]
    fn bad_policy_is_an_error() {
        let policy = PasswordPolicy {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(hash_password("pw", &policy).is_err());
    }

    #[test]
    fn usernames() {
        assert!(is_valid_username("bob"));
        assert!(is_valid_username("Alice_99"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username("bob smith"));
        assert!(!is_valid_username("<script>"));
        assert!(!is_valid_username(&"a".repeat(MAX_USERNAME_LENGTH + 1)));
    }

    #[test]
    fn relative_ages() {
        let now = Utc::now();
        assert_eq!(relative_age(now, now), "just now");
        assert_eq!(relative_age(now - Duration::seconds(59), now), "just now");
        assert_eq!(relative_age(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(relative_age(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(relative_age(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(relative_age(now - Duration::days(1), now), "1 day ago");
        assert_eq!(relative_age(now - Duration::days(65), now), "2 months ago");
        assert_eq!(relative_age(now - Duration::days(800), now), "2 years ago");
        // clock skew
        assert_eq!(relative_age(now + Duration::minutes(2), now), "just now");
    }

    #[test]
    fn millis_roundtrip() {
        let millis = 1_700_000_000_123;
        assert_eq!(from_millis(millis).unwrap().timestamp_millis(), millis);
    }
}
