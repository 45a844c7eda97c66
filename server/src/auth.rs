use aide::OperationInput;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use subtle::ConstantTimeEq;

use crate::{errors::AppError, state::AppState};

/// Extractor that checks for valid HTTP Basic credentials. The username must match
/// the configured API key and the password the configured API password.
pub struct BasicAuth {
    pub username: String,
}

/// Username and password decoded from an `Authorization: Basic ...` header
#[derive(Debug, PartialEq)]
struct Credentials {
    username: String,
    password: String,
}

fn parse_basic_header(parts: &Parts) -> Result<Credentials, AppError> {
    let value = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AppError::NotAuthenticated)?
        .to_str()
        .map_err(|_| AppError::NotAuthenticated)?;

    let (scheme, payload) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(AppError::NotAuthenticated);
    }

    let decoded = STANDARD
        .decode(payload.trim())
        .map_err(|_| AppError::InvalidCredentialsFormat)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AppError::InvalidCredentialsFormat)?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or(AppError::InvalidCredentialsFormat)?;

    Ok(Credentials {
        username: username.to_owned(),
        password: password.to_owned(),
    })
}

impl FromRequestParts<AppState> for BasicAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credentials = parse_basic_header(parts)?;
        tracing::debug!("Received credentials for username '{}'", credentials.username);

        // Evaluate both comparisons so timing doesn't reveal which one failed
        let username_ok = credentials
            .username
            .as_bytes()
            .ct_eq(state.config.api_key.as_bytes());
        let password_ok = credentials
            .password
            .as_bytes()
            .ct_eq(state.config.api_password.as_bytes());
        if !bool::from(username_ok & password_ok) {
            return Err(AppError::Forbidden);
        }

        tracing::debug!("Authentication successful");
        Ok(BasicAuth {
            username: credentials.username,
        })
    }
}

impl OperationInput for BasicAuth {}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/contacts");
        if let Some(value) = value {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn decodes_basic_credentials() {
        let header = format!("Basic {}", STANDARD.encode("key:pass:word"));
        let credentials = parse_basic_header(&parts_with_auth(Some(header.as_str()))).unwrap();
        assert_eq!(
            credentials,
            Credentials {
                username: "key".into(),
                password: "pass:word".into(),
            }
        );

        let header = format!("basic {}", STANDARD.encode("key:"));
        let credentials = parse_basic_header(&parts_with_auth(Some(header.as_str()))).unwrap();
        assert_eq!(credentials.password, "");
    }

    #[test]
    fn missing_or_foreign_scheme_is_not_authenticated() {
        assert!(matches!(
            parse_basic_header(&parts_with_auth(None)),
            Err(AppError::NotAuthenticated)
        ));
        assert!(matches!(
            parse_basic_header(&parts_with_auth(Some("Bearer abc"))),
            Err(AppError::NotAuthenticated)
        ));
        assert!(matches!(
            parse_basic_header(&parts_with_auth(Some("Basic"))),
            Err(AppError::InvalidCredentialsFormat)
        ));
    }

    #[test]
    fn malformed_payload_is_invalid() {
        assert!(matches!(
            parse_basic_header(&parts_with_auth(Some("Basic !!!"))),
            Err(AppError::InvalidCredentialsFormat)
        ));
        let no_colon = format!("Basic {}", STANDARD.encode("justuser"));
        assert!(matches!(
            parse_basic_header(&parts_with_auth(Some(no_colon.as_str()))),
            Err(AppError::InvalidCredentialsFormat)
        ));
    }
}
