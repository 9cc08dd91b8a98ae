//! Field-level validation of booking input.
//!
//! Everything here runs before any store call. Failures carry the wire name
//! of the offending field so a form can highlight it.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use tablebook_core::reservation::ContactDetails;

/// Wire names of the validated fields.
pub mod field {
    /// Guest name
    pub const NAME: &str = "name";
    /// Guest email
    pub const EMAIL: &str = "email";
    /// Guest phone
    pub const PHONE: &str = "phone";
    /// Calendar day
    pub const DATE: &str = "date";
    /// Slot label
    pub const TIME_SLOT: &str = "timeSlot";
    /// Requested tables
    pub const TABLE_IDS: &str = "tableIds";
}

#[allow(clippy::expect_used)] // Literal pattern, checked by the tests below
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("email pattern compiles")
});

#[allow(clippy::expect_used)] // Literal pattern, checked by the tests below
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[[:digit:][:space:]-]+$").expect("phone pattern compiles")
});

/// One invalid field
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Wire name of the field
    pub field: &'static str,
    /// What is wrong with it
    pub message: String,
}

/// Every field problem found in one request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    /// No errors yet
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// A single field error
    #[must_use]
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    /// Record a problem with `field`
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `field` has at least one problem
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|error| error.field == field)
    }

    /// The recorded problems, in discovery order
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// Append another set of problems
    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// `Ok(())` when empty, otherwise `Err(self)`
    ///
    /// # Errors
    ///
    /// Returns `self` if any problem was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
            first = false;
        }
        Ok(())
    }
}

/// Whether `email` matches the address grammar
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Whether `phone` matches `^\+?[\d\s-]+$` with ASCII digits and whitespace
#[must_use]
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_PATTERN.is_match(phone)
}

/// Check the contact fields and return them trimmed.
///
/// All three are required.
///
/// # Errors
///
/// Returns every blank or malformed field at once.
pub fn validate_contact(contact: &ContactDetails) -> Result<ContactDetails, ValidationErrors> {
    let name = contact.name.trim();
    let email = contact.email.trim();
    let phone = contact.phone.trim();

    let mut errors = ValidationErrors::new();

    if name.is_empty() {
        errors.push(field::NAME, "is required");
    }

    if email.is_empty() {
        errors.push(field::EMAIL, "is required");
    } else if !is_valid_email(email) {
        errors.push(field::EMAIL, "is not a valid email address");
    }

    if phone.is_empty() {
        errors.push(field::PHONE, "is required");
    } else if !is_valid_phone(phone) {
        errors.push(field::PHONE, "may only contain digits, spaces, dashes and a leading +");
    }

    errors.into_result()?;

    Ok(ContactDetails {
        name: name.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
    })
}
