//! Shared models for the phonebook lookup API

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Query parameters of the contact lookup. At least one of the two must be
/// given (and non-empty).
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[validate(schema(function = "validate_has_criteria"))]
pub struct ContactLookupQuery {
    /// Phone number to search for. Spaces are ignored, and the number
    /// matches anywhere inside the business, mobile or home number.
    #[serde(rename = "Number", default, skip_serializing_if = "Option::is_none")]
    #[schemars(example = "+44 20 7946 0958")]
    pub number: Option<String>,
    /// E-mail address to search for (exact match)
    #[serde(rename = "Email", default, skip_serializing_if = "Option::is_none")]
    #[schemars(example = "jane.doe@example.com")]
    pub email: Option<String>,
}

impl ContactLookupQuery {
    pub fn by_number(number: impl Into<String>) -> Self {
        Self {
            number: Some(number.into()),
            email: None,
        }
    }

    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            number: None,
            email: Some(email.into()),
        }
    }
}

fn validate_has_criteria(query: &ContactLookupQuery) -> Result<(), ValidationError> {
    let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
    if present(&query.number) || present(&query.email) {
        Ok(())
    } else {
        Err(ValidationError::new("missing_criteria")
            .with_message("Either Number or Email must be provided".into()))
    }
}

/// A contact in the format expected by the 3CX CRM template
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Contact {
    pub contactid: i64,
    pub firstname: String,
    pub lastname: String,
    pub company: String,
    pub email: Option<String>,
    pub phonebusiness: String,
    pub phonemobile: String,
    pub phonehome: String,
}

/// Successful lookup response
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContactsResponse {
    pub contacts: Vec<Contact>,
}

/// Error body returned for most failed requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Error body returned when a client exceeds its rate limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RateLimitError {
    pub error: String,
}
