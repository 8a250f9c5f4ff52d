use happylife_types::{AboutInput, BlogInput, ContactInput, DonationInput, EventInput};

use super::DomainError;

/// Checks a form payload before it is sent to the backend.
pub trait Validate {
    fn validate(&self) -> Result<(), DomainError>;
}

fn required(field: &'static str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        Err(DomainError::required(field))
    } else {
        Ok(())
    }
}

/// Loose shape check: one `@`, a non-empty local part and a dotted domain.
fn email(field: &'static str, value: &str) -> Result<(), DomainError> {
    required(field, value)?;
    let value = value.trim();
    let valid = value.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.contains('@')
            && !value.contains(char::is_whitespace)
            && domain
                .split_once('.')
                .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
    });
    if valid {
        Ok(())
    } else {
        Err(DomainError::invalid(field, "not an email address"))
    }
}

fn amount(field: &'static str, value: f64, allow_zero: bool) -> Result<(), DomainError> {
    if !value.is_finite() {
        return Err(DomainError::invalid(field, "must be a number"));
    }
    if value < 0.0 || (!allow_zero && value == 0.0) {
        let bound = if allow_zero { "zero or more" } else { "greater than zero" };
        return Err(DomainError::invalid(field, format!("must be {bound}")));
    }
    Ok(())
}

/// Sign-in form: both fields present, email well formed.
pub fn validate_credentials(address: &str, password: &str) -> Result<(), DomainError> {
    email("email", address)?;
    required("password", password)
}

impl Validate for DonationInput {
    fn validate(&self) -> Result<(), DomainError> {
        required("title", &self.title)?;
        required("description", &self.description)?;
        amount("target_amount", self.target_amount, false)?;
        amount("current_amount", self.current_amount, true)
    }
}

impl Validate for EventInput {
    fn validate(&self) -> Result<(), DomainError> {
        required("title", &self.title)?;
        required("description", &self.description)?;
        required("location", &self.location)
    }
}

impl Validate for BlogInput {
    fn validate(&self) -> Result<(), DomainError> {
        required("title", &self.title)?;
        required("author", &self.author)?;
        required("content", &self.content)
    }
}

impl Validate for AboutInput {
    fn validate(&self) -> Result<(), DomainError> {
        required("title", &self.title)?;
        required("content", &self.content)
    }
}

impl Validate for ContactInput {
    fn validate(&self) -> Result<(), DomainError> {
        required("name", &self.name)?;
        email("email", &self.email)?;
        required("message", &self.message)
    }
}
