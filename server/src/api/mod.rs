use anyhow::Context;
use axum_app_wrapper::AdHocPlugin;
use strum::{Display, EnumIter, EnumMessage, IntoEnumIterator, IntoStaticStr};

use crate::{logging::log_request, state::AppState};

mod contacts;

/// Tags in the OpenAPI specification
#[derive(Debug, IntoStaticStr, Display, EnumMessage, EnumIter)]
enum ApiTag {
    #[strum(message = "Contact lookups for the 3CX CRM integration")]
    Contacts,
}

/// Name of the HTTP Basic security scheme in the OpenAPI document
const SECURITY_SCHEME: &str = "HTTPBasic";

/// Adds the API routes and their documentation to the server
pub fn plugin() -> AdHocPlugin<AppState> {
    AdHocPlugin::new().on_setup(|router, _state| Ok(router.merge(routes()?)))
}

/// Build the API routes, plus `/openapi.json` and the Swagger UI at `/docs`
pub fn routes() -> anyhow::Result<axum::Router<AppState>> {
    let api_router = aide::axum::ApiRouter::new().api_route("/contacts", contacts::route());

    // OpenAPI configuration
    let mut openapi = aide::openapi::OpenApi {
        info: aide::openapi::Info {
            title: "phonebook".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: Some("Contact lookup service for the 3CX CRM integration".to_string()),
            ..Default::default()
        },
        components: Some(aide::openapi::Components {
            security_schemes: FromIterator::from_iter([(
                SECURITY_SCHEME.to_owned(),
                aide::openapi::ReferenceOr::Item(aide::openapi::SecurityScheme::Http {
                    scheme: "basic".to_owned(),
                    bearer_format: None,
                    description: Some(
                        "API key as the username and API password as the password".to_string(),
                    ),
                    extensions: Default::default(),
                }),
            )]),
            ..Default::default()
        }),
        security: vec![[(SECURITY_SCHEME.to_owned(), vec![])].into()],
        tags: ApiTag::iter()
            .map(|tag| aide::openapi::Tag {
                name: tag.to_string(),
                description: tag.get_message().map(str::to_owned),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };

    let router = api_router.finish_api(&mut openapi);

    // Add OpenAPI documentation routes
    let openapi_json =
        serde_json::to_string_pretty(&openapi).context("could not serialize OpenAPI document")?;
    let openapi_route = axum::routing::get(|| async move { openapi_json });
    let swagger_route = aide::swagger::Swagger::new("/openapi.json").axum_route();
    let router = router
        .route("/openapi.json", openapi_route)
        .route("/docs", swagger_route.into())
        .layer(axum::middleware::from_fn(log_request));

    Ok(router)
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        net::{IpAddr, Ipv4Addr, SocketAddr},
        sync::{Arc, Mutex},
    };

    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{HeaderMap, Request, StatusCode, header},
    };
    use base64::{Engine, engine::general_purpose::STANDARD};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::{
        config::AppConfig,
        contacts::tests::{FakeDirectory, jane},
        rate_limit::RateLimiter,
        state::AppState,
    };

    fn app(directory: Arc<FakeDirectory>, limit: &str) -> axum::Router {
        let config = AppConfig {
            api_key: "key".into(),
            api_password: "secret".into(),
            ..Default::default()
        };
        let state = AppState::new(config, directory, RateLimiter::new(limit.parse().unwrap()));
        super::routes().unwrap().with_state(state)
    }

    fn request(uri: &str, credentials: Option<(&str, &str)>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some((user, password)) = credentials {
            let encoded = STANDARD.encode(format!("{user}:{password}"));
            builder = builder.header(header::AUTHORIZATION, format!("Basic {encoded}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(
        app: &axum::Router,
        request: Request<Body>,
    ) -> (StatusCode, HeaderMap, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, headers, body)
    }

    const GOOD: Option<(&str, &str)> = Some(("key", "secret"));

    #[tokio::test]
    async fn returns_contacts_in_3cx_format() {
        let directory = Arc::new(FakeDirectory::with_records(vec![jane()]));
        let app = app(directory.clone(), "20/minute");

        let (status, _, body) = send(&app, request("/contacts?Number=%2B31%2020", GOOD)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({
                "contacts": [{
                    "contactid": 42,
                    "firstname": "Jane",
                    "lastname": "van der Berg",
                    "company": "Acme",
                    "email": "jane@example.com",
                    "phonebusiness": "+31 20 123 4567",
                    "phonemobile": "",
                    "phonehome": "020 765 4321",
                }]
            })
        );

        let searches = directory.searches.lock().unwrap();
        assert_eq!(searches[0].number_pattern.as_deref(), Some("%+3120%"));
    }

    #[tokio::test]
    async fn missing_credentials_are_challenged() {
        let app = app(Arc::new(FakeDirectory::default()), "20/minute");

        let (status, headers, body) = send(&app, request("/contacts?Number=1", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(headers[header::WWW_AUTHENTICATE], "Basic");
        assert_eq!(body["detail"], "Not authenticated");
    }

    #[tokio::test]
    async fn wrong_credentials_are_forbidden() {
        let directory = Arc::new(FakeDirectory::with_records(vec![jane()]));
        let app = app(directory.clone(), "20/minute");

        for credentials in [("key", "wrong"), ("other", "secret"), ("", "")] {
            let (status, _, body) =
                send(&app, request("/contacts?Number=1", Some(credentials))).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(body["detail"], "Could not validate credentials");
        }
        assert!(directory.searches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn requires_number_or_email() {
        let app = app(Arc::new(FakeDirectory::default()), "20/minute");

        for uri in ["/contacts", "/contacts?Number=&Email=", "/contacts?number=123"] {
            let (status, _, body) = send(&app, request(uri, GOOD)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["detail"], "Either Number or Email must be provided");
        }
    }

    #[tokio::test]
    async fn unknown_contact_is_not_found() {
        let app = app(Arc::new(FakeDirectory::default()), "20/minute");

        let (status, _, body) = send(&app, request("/contacts?Email=nobody@x.y", GOOD)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Contact not found");
    }

    #[tokio::test]
    async fn database_failure_is_hidden() {
        let app = app(Arc::new(FakeDirectory::failing()), "20/minute");

        let (status, _, body) = send(&app, request("/contacts?Email=a@b.c", GOOD)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Database error occurred.");
    }

    #[tokio::test]
    async fn rate_limits_authenticated_requests_per_client() {
        let app = app(Arc::new(FakeDirectory::with_records(vec![jane()])), "2/minute");
        let from = |ip: [u8; 4]| {
            let mut request = request("/contacts?Number=123", GOOD);
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::from(ip)), 50000);
            request.extensions_mut().insert(ConnectInfo(addr));
            request
        };

        // Rejected credentials don't use up the quota
        for _ in 0..3 {
            let (status, _, _) = send(&app, request("/contacts?Number=123", None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        for _ in 0..2 {
            let (status, _, _) = send(&app, from([10, 0, 0, 1])).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, headers, body) = send(&app, from([10, 0, 0, 1])).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Rate limit exceeded: 2 per 1 minute");
        let retry_after: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
        assert!((1..=60).contains(&retry_after));

        let (status, _, _) = send(&app, from([10, 0, 0, 2])).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn serves_openapi_document() {
        let app = app(Arc::new(FakeDirectory::default()), "20/minute");

        let (status, _, body) = send(&app, request("/openapi.json", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/contacts"]["get"].is_object());
        assert_eq!(
            body["components"]["securitySchemes"]["HTTPBasic"]["scheme"],
            "basic"
        );
    }

    /// Log output collected by a test subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn debug_logs_never_contain_credentials() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let app = app(Arc::new(FakeDirectory::with_records(vec![jane()])), "20/minute");
        let (status, _, _) = send(&app, request("/contacts?Number=123", GOOD)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) =
            send(&app, request("/contacts?Number=123", Some(("key", "hunter2")))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let output = logs.contents();
        assert!(output.contains("Incoming request GET /contacts"), "{output}");
        assert!(output.contains("(authorization: Basic)"), "{output}");
        assert!(output.contains("Authentication successful"), "{output}");
        let secrets = [
            "secret".to_owned(),
            "hunter2".to_owned(),
            STANDARD.encode("key:secret"),
            STANDARD.encode("key:hunter2"),
        ];
        for leaked in &secrets {
            assert!(!output.contains(leaked), "{leaked:?} found in logs:\n{output}");
        }
    }
}
