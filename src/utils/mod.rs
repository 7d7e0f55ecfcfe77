//! Small helpers for the framework's string-valued config mapping.

use crate::core::{SegError, SegResult};

/// Interprets a boolean-like configuration string.
///
/// `"y"`, `"yes"`, `"t"`, `"true"`, `"on"` and `"1"` are true (case
/// insensitive); everything else is false.
pub fn strtobool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "y" | "yes" | "t" | "true" | "on" | "1"
    )
}

/// Parses a spatial size triple from a configuration string.
///
/// Accepts comma-, whitespace- or `x`-separated dimensions, with optional
/// surrounding brackets: `"96,96,96"`, `"96x96x96"`, `"[96, 96, 96]"`.
pub fn parse_spatial_size(value: &str) -> SegResult<[usize; 3]> {
    let trimmed = value
        .trim()
        .trim_start_matches(['[', '('])
        .trim_end_matches([']', ')']);
    let parts: Vec<&str> = trimmed
        .split(|c: char| c == ',' || c == 'x' || c == 'X' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() != 3 {
        return Err(SegError::config_error(format!(
            "spatial_size must have exactly 3 dimensions, got '{value}'"
        )));
    }
    let mut size = [0usize; 3];
    for (slot, part) in size.iter_mut().zip(&parts) {
        *slot = part.parse::<usize>().map_err(|_| {
            SegError::config_error(format!("invalid spatial_size component '{part}' in '{value}'"))
        })?;
        if *slot == 0 {
            return Err(SegError::config_error(format!(
                "spatial_size components must be positive, got '{value}'"
            )));
        }
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strtobool_accepts_the_usual_spellings() {
        for value in ["true", "True", "TRUE", "1", "yes", "y", "on", "t", " true "] {
            assert!(strtobool(value), "{value} should be true");
        }
        for value in ["false", "0", "no", "off", "", "maybe"] {
            assert!(!strtobool(value), "{value} should be false");
        }
    }

    #[test]
    fn spatial_size_parses_common_notations() {
        assert_eq!(parse_spatial_size("96,96,96").unwrap(), [96, 96, 96]);
        assert_eq!(parse_spatial_size("96x96x96").unwrap(), [96, 96, 96]);
        assert_eq!(parse_spatial_size("[96, 128, 64]").unwrap(), [96, 128, 64]);
        assert_eq!(parse_spatial_size("48 48 32").unwrap(), [48, 48, 32]);
    }

    #[test]
    fn spatial_size_rejects_bad_input() {
        assert!(parse_spatial_size("96,96").is_err());
        assert!(parse_spatial_size("96,96,96,96").is_err());
        assert!(parse_spatial_size("96,abc,96").is_err());
        assert!(parse_spatial_size("96,0,96").is_err());
        assert!(parse_spatial_size("").is_err());
    }
}
