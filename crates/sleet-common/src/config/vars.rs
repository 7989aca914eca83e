//! Environment variable interpolation for config files.
//!
//! Supports the following syntax:
//! - `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset or empty
//! - `$$` - escape sequence for literal `$`

use regex::Regex;
use std::env;
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("valid interpolation pattern")
});

/// Result of environment variable interpolation.
///
/// Errors are accumulated rather than returned on first failure, so a config
/// with several missing variables reports all of them at once.
#[derive(Debug)]
pub struct InterpolationResult {
    pub text: String,
    pub errors: Vec<String>,
}

impl InterpolationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            if &caps[0] == "$$" {
                return "$".to_string();
            }

            let name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str());

            match env::var(name) {
                Ok(value) => {
                    if value.is_empty() {
                        if let Some(default) = default {
                            return default.to_string();
                        }
                    }
                    value
                }
                Err(_) => match default {
                    Some(default) => default.to_string(),
                    None => {
                        errors.push(format!("environment variable '{name}' is not set"));
                        caps[0].to_string()
                    }
                },
            }
        })
        .to_string();

    InterpolationResult { text, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn with_env_var<F: FnOnce()>(key: &str, value: Option<&str>, f: F) {
        let original = env::var(key).ok();

        // SAFETY: these tests mutate process environment; values are restored below
        match value {
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }

        f();

        // SAFETY: restoring original environment state
        match original {
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
    }

    #[test]
    fn test_braced_substitution() {
        with_env_var("SLEET_TEST_BRACED", Some("hello"), || {
            let result = interpolate("queue: ${SLEET_TEST_BRACED}");
            assert!(result.is_ok());
            assert_eq!(result.text, "queue: hello");
        });
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        with_env_var("SLEET_TEST_MISSING", None, || {
            let result = interpolate("queue: ${SLEET_TEST_MISSING}");
            assert!(!result.is_ok());
            assert_eq!(result.errors.len(), 1);
            assert!(result.errors[0].contains("SLEET_TEST_MISSING"));
        });
    }

    #[test]
    fn test_default_when_unset() {
        with_env_var("SLEET_TEST_UNSET", None, || {
            let result = interpolate("queue: ${SLEET_TEST_UNSET:-fallback}");
            assert!(result.is_ok());
            assert_eq!(result.text, "queue: fallback");
        });
    }

    #[test]
    fn test_default_when_empty() {
        with_env_var("SLEET_TEST_EMPTY", Some(""), || {
            let result = interpolate("queue: ${SLEET_TEST_EMPTY:-fallback}");
            assert!(result.is_ok());
            assert_eq!(result.text, "queue: fallback");
        });
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate("salary: $$90000");
        assert!(result.is_ok());
        assert_eq!(result.text, "salary: $90000");
    }

    #[test]
    fn test_multiple_errors_accumulate() {
        with_env_var("SLEET_TEST_A", None, || {
            with_env_var("SLEET_TEST_B", None, || {
                let result = interpolate("a: ${SLEET_TEST_A}\nb: ${SLEET_TEST_B}");
                assert_eq!(result.errors.len(), 2);
            });
        });
    }
}
