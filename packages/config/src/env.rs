// ABOUTME: Environment variable parsing utilities
// ABOUTME: Strict parsers that report set-but-invalid values instead of falling back

use std::str::FromStr;

use crate::ConfigError;

/// Parse a raw value that was looked up under `var_name`
///
/// Unset or blank values yield `Ok(None)`. A value that is set but does not
/// parse is an error rather than a silent fallback.
pub fn parse_value<T>(var_name: &str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
{
    match raw {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: var_name.to_string(),
                value,
            }),
    }
}

/// Parse a boolean flag, accepting `1/0`, `true/false`, `yes/no`, `on/off`
pub fn parse_flag(var_name: &str, raw: Option<String>) -> Result<Option<bool>, ConfigError> {
    match raw {
        None => Ok(None),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                key: var_name.to_string(),
                value,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_invalid_is_error() {
        let result: Result<Option<u32>, _> = parse_value("X", Some("ten".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_value_blank_is_unset() {
        let result: Option<u32> = parse_value("X", Some("  ".to_string())).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("X", Some("on".into())).unwrap(), Some(true));
        assert_eq!(parse_flag("X", Some("False".into())).unwrap(), Some(false));
        assert_eq!(parse_flag("X", None).unwrap(), None);
        assert!(parse_flag("X", Some("maybe".into())).is_err());
    }
}
