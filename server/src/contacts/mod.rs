//! Contact search against the phone system's user directory

use async_trait::async_trait;
use phonebook_models::{Contact, ContactsResponse};

use crate::errors::AppError;

mod mysql;

pub use mysql::{MySqlDirectory, plugin};

/// Normalized search criteria. Holds at least one of a number pattern or an e-mail address.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactSearch {
    /// `LIKE` pattern matched against phone numbers with spaces removed
    pub number_pattern: Option<String>,
    /// Exact e-mail address
    pub email: Option<String>,
}

impl ContactSearch {
    /// Build the search from raw query parameters. Empty values count as absent, and
    /// `None` is returned when neither parameter is usable.
    pub fn new(number: Option<&str>, email: Option<&str>) -> Option<Self> {
        let number = number.filter(|n| !n.is_empty());
        let email = email.filter(|e| !e.is_empty());
        if number.is_none() && email.is_none() {
            return None;
        }

        Some(Self {
            number_pattern: number.map(|n| format!("%{}%", n.replace(' ', ""))),
            email: email.map(str::to_owned),
        })
    }
}

/// A row of the `Users` table
#[derive(Debug, Default, Clone, PartialEq, sqlx::FromRow)]
pub struct ContactRecord {
    pub id: i64,
    pub real_name: Option<String>,
    pub work_phone: Option<String>,
    pub mobile_phone: Option<String>,
    pub home_phone: Option<String>,
    pub email: Option<String>,
    pub organization: Option<String>,
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct DirectoryError(#[from] sqlx::Error);

/// Source of contacts that can be searched by number or e-mail
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn find(&self, search: &ContactSearch) -> Result<Vec<ContactRecord>, DirectoryError>;
}

/// Split a full name on single spaces into first name and the rest.
pub fn split_name(real_name: &str) -> (String, String) {
    match real_name.split_once(' ') {
        Some((first, rest)) => (first.to_owned(), rest.to_owned()),
        None => (real_name.to_owned(), String::new()),
    }
}

impl From<ContactRecord> for Contact {
    fn from(record: ContactRecord) -> Self {
        let (firstname, lastname) = split_name(record.real_name.as_deref().unwrap_or_default());
        Contact {
            contactid: record.id,
            firstname,
            lastname,
            company: record.organization.unwrap_or_default(),
            email: record.email,
            phonebusiness: record.work_phone.unwrap_or_default(),
            phonemobile: record.mobile_phone.unwrap_or_default(),
            phonehome: record.home_phone.unwrap_or_default(),
        }
    }
}

/// Look up contacts by phone number and/or e-mail address.
pub async fn lookup(
    directory: &dyn ContactDirectory,
    number: Option<&str>,
    email: Option<&str>,
) -> Result<ContactsResponse, AppError> {
    let Some(search) = ContactSearch::new(number, email) else {
        tracing::debug!("Missing query parameters: Number or Email must be provided");
        return Err(AppError::BadRequest(
            "Either Number or Email must be provided".into(),
        ));
    };

    tracing::debug!("Searching contacts with {search:?}");
    let records = directory.find(&search).await?;
    tracing::debug!("Directory returned {} results", records.len());
    if records.is_empty() {
        tracing::debug!("No contacts found for the given query parameters");
        return Err(AppError::NotFound("Contact not found".into()));
    }

    let contacts = records
        .into_iter()
        .map(Contact::from)
        .inspect(|contact| tracing::debug!("Appending contact: {contact:?}"))
        .collect();

    Ok(ContactsResponse { contacts })
}
