use std::time::Duration;

use phonebook_models::{Contact, ContactLookupQuery, ContactsResponse};
use reqwest::StatusCode;
use validator::Validate;

/// # Phonebook client
/// A Rust client for the phonebook lookup API, authenticating with the API key and password
/// via HTTP Basic auth.
pub struct PhonebookClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PhonebookError {
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Input validation error(s): {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("API error: {status} {message:?}")]
    Api {
        status: u16,
        message: Option<String>,
    },
}

impl PhonebookClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_password: impl Into<String>,
    ) -> Result<Self, PhonebookError> {
        let client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::limited(2))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("phonebook-client/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(PhonebookClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            api_password: api_password.into(),
        })
    }

    /// Look up contacts. An unknown number or address gives an empty list.
    pub async fn lookup(&self, query: &ContactLookupQuery) -> Result<Vec<Contact>, PhonebookError> {
        query.validate()?;

        let response = self
            .client
            .get(format!("{}/contacts", self.base_url))
            .basic_auth(&self.api_key, Some(&self.api_password))
            .query(query)
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => {
                Ok(response.json::<ContactsResponse>().await?.contacts)
            }
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status => {
                let message = extract_error_message(response).await;
                Err(PhonebookError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    pub async fn by_number(&self, number: &str) -> Result<Vec<Contact>, PhonebookError> {
        self.lookup(&ContactLookupQuery::by_number(number)).await
    }

    pub async fn by_email(&self, email: &str) -> Result<Vec<Contact>, PhonebookError> {
        self.lookup(&ContactLookupQuery::by_email(email)).await
    }
}

/// Error message from the `detail` (or, for rate limiting, `error`) field of the body
async fn extract_error_message(response: reqwest::Response) -> Option<String> {
    let text = response.text().await.ok()?;
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => ["detail", "error"]
            .into_iter()
            .find_map(|field| value[field].as_str().map(str::to_owned)),
        Err(_) if !text.is_empty() => Some(text),
        Err(_) => None,
    }
}
