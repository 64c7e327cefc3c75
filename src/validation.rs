//! Field rules for lead submissions.
//!
//! The same rules run at the HTTP boundary ([`validate_submission`]) and at
//! the persistence boundary ([`NewLead::check`], called by every store).

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{FieldError, LeadSubmission, NewLead, Stream};
use crate::phone;

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 50;
const EMAIL_MAX: usize = 100;

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z\s]+$").expect("name pattern is valid"));

// RFC 5322 simplified: local@domain.tld, at least one dot in the domain.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .expect("email pattern is valid")
});

/// Validates a raw submission and returns the normalized record.
///
/// All fields are checked; the error list covers every failing field.
pub fn validate_submission(input: &LeadSubmission) -> Result<NewLead, Vec<FieldError>> {
    let mut errors = Vec::new();

    let name = check_name(input.name.as_deref()).map_err(|e| errors.push(e));
    let phone_number = check_phone(input.phone_number.as_deref()).map_err(|e| errors.push(e));
    let email = check_email(input.email.as_deref()).map_err(|e| errors.push(e));
    let stream = check_stream(input.stream.as_deref()).map_err(|e| errors.push(e));

    match (name, phone_number, email, stream) {
        (Ok(name), Ok(phone_number), Ok(email), Ok(stream)) => Ok(NewLead {
            name,
            phone_number,
            email,
            stream,
        }),
        _ => Err(errors),
    }
}

impl NewLead {
    /// Re-applies the submission rules to an already-normalized record.
    ///
    /// A record produced by [`validate_submission`] always passes; anything
    /// that fails here was built by hand or mutated after validation.
    pub fn check(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        match check_name(Some(&self.name)) {
            Ok(normalized) if normalized == self.name => {}
            Ok(_) => errors.push(FieldError::new("name", "Name must be trimmed")),
            Err(e) => errors.push(e),
        }

        if phone::validate(&self.phone_number).as_deref() != Ok(self.phone_number.as_str()) {
            errors.push(FieldError::new(
                "phoneNumber",
                "Phone number must be a valid 10-digit Indian mobile number",
            ));
        }

        match check_email(Some(&self.email)) {
            Ok(normalized) if normalized == self.email => {}
            Ok(_) => errors.push(FieldError::new(
                "email",
                "Email must be stored trimmed and lower-case",
            )),
            Err(e) => errors.push(e),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn check_name(raw: Option<&str>) -> Result<String, FieldError> {
    let name = raw.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(FieldError::new("name", "Name is required"));
    }
    let len = name.chars().count();
    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        return Err(FieldError::new(
            "name",
            "Name must be between 2 and 50 characters",
        ));
    }
    if !NAME_REGEX.is_match(name) {
        return Err(FieldError::new(
            "name",
            "Name can only contain letters and spaces",
        ));
    }
    Ok(name.to_string())
}

fn check_phone(raw: Option<&str>) -> Result<String, FieldError> {
    let phone_number = raw.map(str::trim).unwrap_or_default();
    if phone_number.is_empty() {
        return Err(FieldError::new("phoneNumber", "Phone number is required"));
    }
    phone::normalize(phone_number).map_err(|e| FieldError::new("phoneNumber", e.to_string()))
}

fn check_email(raw: Option<&str>) -> Result<String, FieldError> {
    let email = raw.map(str::trim).unwrap_or_default();
    if email.is_empty() {
        return Err(FieldError::new("email", "Email is required"));
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err(FieldError::new(
            "email",
            "Please enter a valid email address",
        ));
    }
    if email.len() > EMAIL_MAX {
        return Err(FieldError::new(
            "email",
            "Email cannot exceed 100 characters",
        ));
    }
    Ok(email.to_lowercase())
}

fn check_stream(raw: Option<&str>) -> Result<Stream, FieldError> {
    let stream = raw.map(str::trim).unwrap_or_default();
    if stream.is_empty() {
        return Err(FieldError::new("stream", "Stream is required"));
    }
    stream.parse().map_err(|_| {
        FieldError::new(
            "stream",
            "Stream must be Science, Commerce, or Humanities",
        )
    })
}
