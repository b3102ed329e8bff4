//! Small helpers for reading typed configuration from the environment.

use std::str::FromStr;

/// Read an env var, falling back to a default when unset or empty.
pub fn env_or_default(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

/// Read a boolean flag from the environment.
///
/// Accepts `1`, `true`, `yes`, `on` (case-insensitive); everything else,
/// including an unset variable, yields the default.
pub fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Parse an env var into `T`, falling back to the default on absence or
/// parse failure.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_default_unset() {
        assert_eq!(env_or_default("COMMON_TEST_UNSET_VAR", "fallback"), "fallback");
    }

    #[test]
    fn test_env_parse_roundtrip() {
        std::env::set_var("COMMON_TEST_PARSE_VAR", "42");
        assert_eq!(env_parse::<u32>("COMMON_TEST_PARSE_VAR", 7), 42);
        std::env::remove_var("COMMON_TEST_PARSE_VAR");
        assert_eq!(env_parse::<u32>("COMMON_TEST_PARSE_VAR", 7), 7);
    }

    #[test]
    fn test_env_flag() {
        std::env::set_var("COMMON_TEST_FLAG_VAR", "TRUE");
        assert!(env_flag("COMMON_TEST_FLAG_VAR", false));
        std::env::set_var("COMMON_TEST_FLAG_VAR", "0");
        assert!(!env_flag("COMMON_TEST_FLAG_VAR", true));
        std::env::remove_var("COMMON_TEST_FLAG_VAR");
        assert!(env_flag("COMMON_TEST_FLAG_VAR", true));
    }
}
