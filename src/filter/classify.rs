//! Status classification and error-message sanitization.
//!
//! Free-text error attributes are user influenced, so they are stripped down
//! to a whitelisted character set and a bounded length before they are used
//! as label values.

use regex::Regex;
use std::time::Duration;
use tracing::warn;

use crate::utils::log_throttle::should_emit;

/// Strips everything that is not a letter, a digit, a space, a period or a comma.
///
/// `\p{L}` and `\p{N}` are the Unicode letter and number classes of the `regex`
/// crate, which is close to, but not exactly, "printable letters and digits".
pub const DEFAULT_ERROR_INFO_REGEX: &str = r"[^\p{L}\p{N} .,]";

/// Default upper bound, in characters, of a sanitized error message.
pub const DEFAULT_ERROR_INFO_MAX_SIZE: usize = 50;

/// Returns true for statuses outside the 2xx/3xx ranges.
pub fn is_error(status: u16) -> bool {
    !(200..400).contains(&status)
}

/// Sanitizes `raw` with a pattern compiled on the spot.
///
/// Matches of `strip_pattern` are removed, then the result is cut to
/// `max_size` characters. A pattern that fails to compile yields an empty
/// string.
pub fn sanitize(raw: Option<&str>, strip_pattern: &str, max_size: usize) -> String {
    match Regex::new(strip_pattern) {
        Ok(regex) => sanitize_with(raw, &regex, max_size),
        Err(err) => {
            warn!("Invalid error message regex '{}': {}", strip_pattern, err);
            String::new()
        }
    }
}

fn sanitize_with(raw: Option<&str>, regex: &Regex, max_size: usize) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    let stripped = regex.replace_all(raw, "");
    match stripped.char_indices().nth(max_size) {
        Some((cut, _)) => stripped[..cut].to_string(),
        None => stripped.into_owned(),
    }
}

/// A precompiled sanitizer built once from configuration.
#[derive(Clone, Debug)]
pub struct Sanitizer {
    // None when the configured pattern did not compile.
    regex: Option<Regex>,
    pattern: String,
    max_size: usize,
}

impl Sanitizer {
    pub fn new(pattern: &str, max_size: usize) -> Self {
        let regex = match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                warn!(
                    "Invalid error message regex '{}', error messages will be dropped: {}",
                    pattern, err
                );
                None
            }
        };
        Sanitizer {
            regex,
            pattern: pattern.to_string(),
            max_size,
        }
    }

    pub fn sanitize(&self, raw: Option<&str>) -> String {
        match &self.regex {
            Some(regex) => sanitize_with(raw, regex, self.max_size),
            None => {
                if raw.is_some() {
                    if let Some(suppressed) =
                        should_emit("sanitizer.invalid_regex", Duration::from_secs(60))
                    {
                        warn!(
                            suppressed,
                            "Dropping error message, regex '{}' does not compile", self.pattern
                        );
                    }
                }
                String::new()
            }
        }
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Sanitizer::new(DEFAULT_ERROR_INFO_REGEX, DEFAULT_ERROR_INFO_MAX_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_ranges() {
        assert!(!is_error(200));
        assert!(!is_error(204));
        assert!(!is_error(302));
        assert!(!is_error(399));
        assert!(is_error(101));
        assert!(is_error(199));
        assert!(is_error(400));
        assert!(is_error(404));
        assert!(is_error(503));
    }

    #[test]
    fn absent_message_is_empty() {
        assert_eq!(sanitize(None, DEFAULT_ERROR_INFO_REGEX, 50), "");
        assert_eq!(Sanitizer::default().sanitize(None), "");
    }

    #[test]
    fn strips_label_breaking_characters() {
        let raw = r#"Timeout: upstream "db-1" {code=42}, retry."#;
        assert_eq!(
            sanitize(Some(raw), DEFAULT_ERROR_INFO_REGEX, 50),
            "Timeout upstream db1 code42, retry."
        );
    }

    #[test]
    fn keeps_unicode_letters() {
        assert_eq!(
            Sanitizer::default().sanitize(Some("Não autorizado!")),
            "Não autorizado"
        );
    }

    #[test]
    fn truncates_to_max_size_in_characters() {
        let raw = "é".repeat(80);
        let sanitized = sanitize(Some(&raw), DEFAULT_ERROR_INFO_REGEX, 50);
        assert_eq!(sanitized.chars().count(), 50);

        let sanitized = Sanitizer::new(DEFAULT_ERROR_INFO_REGEX, 5).sanitize(Some("abcdefgh"));
        assert_eq!(sanitized, "abcde");
    }

    #[test]
    fn bounded_for_arbitrary_input() {
        let inputs = [
            "",
            "short",
            "a much longer message that definitely exceeds the fifty character limit by a lot",
            "\n\t\r{}\"=,\\",
            "日本語のエラーメッセージがここに入ります日本語のエラーメッセージがここに入ります日本語",
        ];
        for input in inputs {
            assert!(sanitize(Some(input), DEFAULT_ERROR_INFO_REGEX, 50).chars().count() <= 50);
        }
    }

    #[test]
    fn invalid_regex_never_raises() {
        assert_eq!(sanitize(Some("anything"), "[unclosed", 50), "");
        let sanitizer = Sanitizer::new("(", 50);
        assert_eq!(sanitizer.sanitize(Some("anything")), "");
    }
}
