use std::str::FromStr;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Read an env var, treating empty/whitespace-only values as unset.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid UTF-8".to_string(),
        }),
    }
}

/// First non-empty value among several env var aliases.
pub(crate) fn first_non_empty_env(keys: &[&str]) -> Result<Option<String>, ConfigError> {
    for key in keys {
        if let Some(value) = optional_env(key)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

pub(crate) fn optional_secret(key: &str) -> Result<Option<SecretString>, ConfigError> {
    Ok(optional_env(key)?.map(SecretString::from))
}

pub(crate) fn required_secret(key: &str, hint: &str) -> Result<SecretString, ConfigError> {
    optional_secret(key)?.ok_or_else(|| ConfigError::MissingRequired {
        key: key.to_string(),
        hint: hint.to_string(),
    })
}

/// Parse an optional env var into `T`, falling back to `default` when unset.
pub(crate) fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}

pub(crate) fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match optional_env(key)? {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a boolean, got '{raw}'"),
            }),
        },
    }
}

/// Trim trailing slashes so paths can be appended with `format!`.
pub(crate) fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Validate that `raw` is an absolute http(s) URL.
pub(crate) fn validate_http_url(key: &str, raw: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("must be a valid URL: {e}"),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(normalize_base_url(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_urls_lose_trailing_slashes() {
        assert_eq!(
            normalize_base_url("https://cloud-api.phala.network//"),
            "https://cloud-api.phala.network"
        );
    }

    #[test]
    fn non_http_urls_are_rejected() {
        assert!(validate_http_url("X", "ftp://example.com").is_err());
        assert!(validate_http_url("X", "not a url").is_err());
        assert_eq!(
            validate_http_url("X", "http://localhost:8090/").unwrap(),
            "http://localhost:8090"
        );
    }

    #[test]
    fn unset_vars_use_defaults() {
        assert_eq!(
            parse_env_or::<u32>("AGENT_LAUNCHPAD_TEST_UNSET_VAR", 7).unwrap(),
            7
        );
        assert!(parse_bool("AGENT_LAUNCHPAD_TEST_UNSET_VAR", true).unwrap());
    }
}
