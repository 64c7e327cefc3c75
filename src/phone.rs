//! Indian mobile number normalization and validation.
//!
//! Every stored phone number is exactly 10 digits with a leading 6, 7, 8 or 9.
//! Callers strip formatting with [`clean`], fold country-code and trunk-prefix
//! variants with [`standardize`], and gate persistence with [`validate`].

use std::fmt;

/// Reason a phone number was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPhoneReason {
    /// Cleaned number is not exactly 10 digits long.
    WrongLength,
    /// Number does not start with 6, 7, 8 or 9.
    BadPrefix,
    /// Something other than ASCII digits survived cleaning.
    NonDigit,
}

/// Phone validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    InvalidPhone(InvalidPhoneReason),
}

impl fmt::Display for PhoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhoneError::InvalidPhone(InvalidPhoneReason::WrongLength) => {
                write!(f, "Phone number must be exactly 10 digits")
            }
            PhoneError::InvalidPhone(InvalidPhoneReason::BadPrefix) => {
                write!(f, "Indian mobile numbers must start with 6, 7, 8, or 9")
            }
            PhoneError::InvalidPhone(InvalidPhoneReason::NonDigit) => {
                write!(f, "Phone number must contain only digits")
            }
        }
    }
}

impl std::error::Error for PhoneError {}

/// Removes every non-digit character. Empty input yields an empty string.
pub fn clean(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Reduces a raw number to its canonical 10-digit form.
///
/// Handles the `91` country code (12 digits) and a leading trunk `0`
/// (11 digits). Returns `None` for any other shape, which is the
/// "incorrect format" sentinel.
pub fn standardize(input: &str) -> Option<String> {
    let digits = clean(input);

    match digits.len() {
        10 => Some(digits),
        12 if digits.starts_with("91") => Some(digits[2..].to_string()),
        11 if digits.starts_with('0') => Some(digits[1..].to_string()),
        _ => None,
    }
}

/// Validates a number as a 10-digit Indian mobile and returns the digits.
///
/// No prefix folding happens here: `919876543210` is rejected for length.
/// Use [`normalize`] when country-code variants should be accepted.
pub fn validate(input: &str) -> Result<String, PhoneError> {
    let digits = clean(input);

    if digits.len() != 10 {
        return Err(PhoneError::InvalidPhone(InvalidPhoneReason::WrongLength));
    }

    if !matches!(digits.as_bytes()[0], b'6'..=b'9') {
        return Err(PhoneError::InvalidPhone(InvalidPhoneReason::BadPrefix));
    }

    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PhoneError::InvalidPhone(InvalidPhoneReason::NonDigit));
    }

    Ok(digits)
}

/// [`standardize`] followed by [`validate`].
///
/// This is the form used for submissions, so `+91 98765-43210`,
/// `098765 43210` and `9876543210` all store `9876543210`.
pub fn normalize(input: &str) -> Result<String, PhoneError> {
    match standardize(input) {
        Some(canonical) => validate(&canonical),
        None => Err(PhoneError::InvalidPhone(InvalidPhoneReason::WrongLength)),
    }
}

/// Formats a 10-digit number as `XXX-XXX-XXXX`; anything else is returned unchanged.
pub fn format_for_display(input: &str) -> String {
    let digits = clean(input);
    if digits.len() != 10 {
        return input.to_string();
    }
    format!("{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..])
}

/// Prefixes a 10-digit number with `+91`; anything else is returned unchanged.
pub fn with_country_code(input: &str) -> String {
    let digits = clean(input);
    if digits.len() != 10 {
        return input.to_string();
    }
    format!("+91{}", digits)
}
