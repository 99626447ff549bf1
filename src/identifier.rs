//! Allow-list for names interpolated into Cypher text.
//!
//! Labels, relationship types and property names cannot be bound as query parameters, so
//! they are checked here before they reach a template. Values never are: they always
//! travel as parameters.

use crate::config::MAX_IDENTIFIER_LEN;
use crate::error::{LoadError, Result};

/// Check `value` is ASCII alphanumeric/underscore, does not start with a digit, and fits in
/// [`MAX_IDENTIFIER_LEN`]. `kind` names the role for the error message.
pub fn validate(kind: &'static str, value: &str) -> Result<()> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.len() > MAX_IDENTIFIER_LEN {
        Some("exceeds the maximum identifier length")
    } else if value.starts_with(|c: char| c.is_ascii_digit()) {
        Some("must not start with a digit")
    } else if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some("only ASCII letters, digits and '_' are allowed")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(LoadError::InvalidIdentifier {
            kind,
            value: value.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
