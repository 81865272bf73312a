//! Environment variable plumbing shared by the config structs.

use std::str::FromStr;

use crate::error::ConfigError;

/// Read an optional variable. Unset and empty both mean absent.
pub fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidUnicode {
            key: key.to_string(),
        }),
    }
}

/// Read a required variable, with a hint naming what to set.
pub fn require_env(key: &str, hint: &str) -> Result<String, ConfigError> {
    optional_env(key)?.ok_or_else(|| ConfigError::MissingRequired {
        key: key.to_string(),
        hint: hint.to_string(),
    })
}

/// Parse an optional variable into any `FromStr` type.
pub fn parse_optional_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key)? {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{}': {}", raw, e),
        }),
    }
}

/// Parse an optional boolean variable. Accepts `1/0`, `true/false`,
/// `yes/no`, `on/off`, case-insensitive.
pub fn parse_bool_env(key: &str) -> Result<Option<bool>, ConfigError> {
    match optional_env(key)? {
        None => Ok(None),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{}' is not a boolean", other),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-global; each test uses a unique key.

    #[test]
    fn empty_counts_as_absent() {
        std::env::set_var("CAPGATE_TEST_EMPTY", "   ");
        assert!(optional_env("CAPGATE_TEST_EMPTY").unwrap().is_none());
        std::env::remove_var("CAPGATE_TEST_EMPTY");
    }

    #[test]
    fn missing_required_names_the_key() {
        let err = require_env("CAPGATE_TEST_MISSING", "set it to the endpoint URL").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("CAPGATE_TEST_MISSING"));
        assert!(message.contains("endpoint URL"));
    }

    #[test]
    fn bad_parse_is_invalid_value() {
        std::env::set_var("CAPGATE_TEST_NUM", "not-a-number");
        let err = parse_optional_env::<u64>("CAPGATE_TEST_NUM").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        std::env::remove_var("CAPGATE_TEST_NUM");
    }

    #[test]
    fn booleans_in_several_spellings() {
        std::env::set_var("CAPGATE_TEST_BOOL", "Yes");
        assert_eq!(parse_bool_env("CAPGATE_TEST_BOOL").unwrap(), Some(true));
        std::env::set_var("CAPGATE_TEST_BOOL", "off");
        assert_eq!(parse_bool_env("CAPGATE_TEST_BOOL").unwrap(), Some(false));
        std::env::set_var("CAPGATE_TEST_BOOL", "maybe");
        assert!(parse_bool_env("CAPGATE_TEST_BOOL").is_err());
        std::env::remove_var("CAPGATE_TEST_BOOL");
    }

    #[test]
    fn good_parse_round_trips() {
        std::env::set_var("CAPGATE_TEST_OK", "42");
        assert_eq!(parse_optional_env::<u64>("CAPGATE_TEST_OK").unwrap(), Some(42));
        std::env::remove_var("CAPGATE_TEST_OK");
    }
}
