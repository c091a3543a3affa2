//! ISBN normalization and checksum validation
//!
//! Identifiers are validated before any network call so malformed
//! input fails fast instead of burning an external request.

use crate::core::error::{LendError, Result};

/// Strip hyphens and spaces from a raw ISBN
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// Validate a raw ISBN and return its normalized form.
///
/// 13-digit ISBNs use the weighted mod-10 checksum, 10-digit ISBNs the
/// mod-11 checksum where the final position may be 'X' (value 10).
pub fn validate(raw: &str) -> Result<String> {
    let isbn = normalize(raw);

    let valid = match isbn.len() {
        13 => checksum_13(&isbn),
        10 => checksum_10(&isbn),
        _ => false,
    };

    if valid {
        Ok(isbn)
    } else {
        Err(LendError::ValidationError(format!(
            "invalid ISBN: {}",
            raw.trim()
        )))
    }
}

fn checksum_13(isbn: &str) -> bool {
    let Some(digits) = isbn
        .chars()
        .map(|c| c.to_digit(10))
        .collect::<Option<Vec<u32>>>()
    else {
        return false;
    };

    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { *d } else { *d * 3 })
        .sum();
    sum % 10 == 0
}

fn checksum_10(isbn: &str) -> bool {
    let mut sum: u32 = 0;
    for (i, c) in isbn.chars().enumerate() {
        let value = match c {
            '0'..='9' => c as u32 - '0' as u32,
            // 'X' is only legal as the check digit
            'X' | 'x' if i == 9 => 10,
            _ => return false,
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}
