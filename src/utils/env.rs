/// Get environment variable with WAYFARE_ prefix, falling back to unprefixed version
///
/// Checks `WAYFARE_{key}` first, then `{key}`, so deployments that already
/// export plain names such as `CACHE_TTL_MS` keep working.
///
/// # Examples
///
/// ```rust,ignore
/// // Checks WAYFARE_CACHE_TTL_MS first, then CACHE_TTL_MS
/// let ttl = get_env_with_prefix("CACHE_TTL_MS");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("WAYFARE_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Parse an environment value, keeping `current` when the variable is unset
/// or does not parse.
pub fn parse_env_or<T: std::str::FromStr>(key: &str, current: T) -> T {
    match get_env_with_prefix(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring unparseable environment value");
                current
            }
        },
        None => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_with_prefix() {
        unsafe {
            std::env::set_var("WAYFARE_ENV_TEST_VAR", "prefixed_value");
        }
        assert_eq!(get_env_with_prefix("ENV_TEST_VAR"), Some("prefixed_value".to_string()));
        unsafe {
            std::env::remove_var("WAYFARE_ENV_TEST_VAR");
        }

        unsafe {
            std::env::set_var("ENV_FALLBACK_VAR", "unprefixed_value");
        }
        assert_eq!(get_env_with_prefix("ENV_FALLBACK_VAR"), Some("unprefixed_value".to_string()));
        unsafe {
            std::env::remove_var("ENV_FALLBACK_VAR");
        }

        assert_eq!(get_env_with_prefix("ENV_NON_EXISTENT_VAR"), None);
    }

    #[test]
    fn test_parse_env_or_keeps_current_on_garbage() {
        unsafe {
            std::env::set_var("WAYFARE_ENV_PARSE_VAR", "not-a-number");
        }
        assert_eq!(parse_env_or("ENV_PARSE_VAR", 42u32), 42);
        unsafe {
            std::env::set_var("WAYFARE_ENV_PARSE_VAR", " 7 ");
        }
        assert_eq!(parse_env_or("ENV_PARSE_VAR", 42u32), 7);
        unsafe {
            std::env::remove_var("WAYFARE_ENV_PARSE_VAR");
        }
        assert_eq!(parse_env_or("ENV_PARSE_VAR", 42u32), 42);
    }
}
