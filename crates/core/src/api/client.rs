#![allow(missing_docs)]

use std::{fmt, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    multipart::Form,
    Client, Method, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::{
    config::AppConfig,
    error::{ApiError, ApiResult},
    session::SessionStore,
};

use super::response::{error_message, parse_body};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Notifications about the session emitted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The backend answered 401 and the stored session was dropped.
    Invalidated,
}

/// Request body variants.
#[derive(Debug)]
pub enum Payload {
    /// Serialized as JSON.
    Json(Value),
    /// Sent as-is.
    Binary(Vec<u8>),
    /// Sent as-is, reqwest sets the multipart boundary.
    Multipart(Form),
}

/// Per-call options for [`ApiClient::request`].
#[derive(Debug)]
pub struct RequestOptions {
    method: Method,
    body: Option<Payload>,
    headers: Vec<(String, String)>,
    authenticated: bool,
}

impl RequestOptions {
    /// Authenticated request without a body.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            body: None,
            headers: Vec::new(),
            authenticated: true,
        }
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(Payload::Json(body));
        self
    }

    /// Attach raw bytes.
    pub fn binary(mut self, bytes: Vec<u8>) -> Self {
        self.body = Some(Payload::Binary(bytes));
        self
    }

    /// Attach a multipart form.
    pub fn multipart(mut self, form: Form) -> Self {
        self.body = Some(Payload::Multipart(form));
        self
    }

    /// Add a header sent verbatim.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Never attach the stored token (login, registration).
    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }
}

/// Single entry point for backend calls.
///
/// Cloning is cheap; clones share the HTTP connection pool, the session store
/// and the event channel.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: Client,
    base_url: String,
    session: Arc<dyn SessionStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Client for `base_url` with the default timeout.
    pub fn new(base_url: impl Into<String>, session: Arc<dyn SessionStore>) -> Result<Self> {
        Self::with_timeout(base_url, session, DEFAULT_TIMEOUT)
    }

    /// Client using the process-wide endpoint and timeout from configuration.
    pub fn from_config(config: &AppConfig, session: Arc<dyn SessionStore>) -> Result<Self> {
        Self::with_timeout(
            config.base_url(),
            session,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Client with an explicit per-request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        session: Arc<dyn SessionStore>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        let (events, _) = broadcast::channel(16);
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                session,
                events,
            }),
        })
    }

    /// Root URL every path is joined onto.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Store the client reads tokens from.
    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.inner.session
    }

    /// Receive session invalidation notices.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Perform a call and return the normalized body.
    ///
    /// Success bodies that are not JSON come back as a JSON string; an empty
    /// body comes back as null.
    pub async fn request(&self, path: &str, options: RequestOptions) -> ApiResult<Value> {
        let RequestOptions {
            method,
            body,
            headers: extra_headers,
            authenticated,
        } = options;

        let mut headers = HeaderMap::new();
        for (name, value) in &extra_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ApiError::validation(format!("invalid header name '{name}'")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| ApiError::validation(format!("invalid value for header '{name}'")))?;
            headers.insert(header_name, header_value);
        }

        if authenticated {
            if let Some(token) = self.inner.session.token() {
                let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| ApiError::validation("stored token is not a valid header"))?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
        }

        let json_body = match &body {
            Some(Payload::Json(value)) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                Some(serde_json::to_vec(value).map_err(|err| {
                    ApiError::validation(format!("request body is not serializable: {err}"))
                })?)
            }
            _ => None,
        };

        let url = self.url(path);
        let mut builder = self.inner.http.request(method.clone(), &url).headers(headers);
        builder = match body {
            Some(Payload::Json(_)) => builder.body(json_body.unwrap_or_default()),
            Some(Payload::Binary(bytes)) => builder.body(bytes),
            Some(Payload::Multipart(form)) => builder.multipart(form),
            None => builder,
        };

        debug!(%method, path, authenticated, "sending request");
        let response = builder.send().await.map_err(|err| {
            warn!(%method, path, "request failed before a response: {err}");
            ApiError::Network(err)
        })?;

        let status = response.status();
        let text = response.text().await.map_err(ApiError::Network)?;
        let data = parse_body(&text);

        if status.is_success() {
            debug!(%method, path, status = status.as_u16(), "request succeeded");
            return Ok(data);
        }

        let message = error_message(&data, &text, status.as_u16());
        warn!(%method, path, status = status.as_u16(), %message, "request rejected");

        if status == StatusCode::UNAUTHORIZED {
            self.invalidate_session();
            return Err(ApiError::Auth { message });
        }

        Err(ApiError::Request {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn get(&self, path: &str) -> ApiResult<Value> {
        self.request(path, RequestOptions::new(Method::GET)).await
    }

    pub async fn post(&self, path: &str, body: &impl Serialize) -> ApiResult<Value> {
        self.request(path, RequestOptions::new(Method::POST).json(to_json(body)?))
            .await
    }

    pub async fn patch(&self, path: &str, body: &impl Serialize) -> ApiResult<Value> {
        self.request(path, RequestOptions::new(Method::PATCH).json(to_json(body)?))
            .await
    }

    pub async fn delete(&self, path: &str) -> ApiResult<Value> {
        self.request(path, RequestOptions::new(Method::DELETE)).await
    }

    /// Read a normalized body into a typed schema.
    pub fn decode<T: DeserializeOwned>(value: Value) -> ApiResult<T> {
        serde_json::from_value(value).map_err(|err| ApiError::InvalidResponse(err.to_string()))
    }

    /// Like [`ApiClient::decode`] for list endpoints; a null body is an empty list.
    pub fn decode_list<T: DeserializeOwned>(value: Value) -> ApiResult<Vec<T>> {
        match value {
            Value::Null => Ok(Vec::new()),
            other => Self::decode(other),
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.inner.base_url, path)
        } else {
            format!("{}/{}", self.inner.base_url, path)
        }
    }

    fn invalidate_session(&self) {
        if let Err(err) = self.inner.session.clear() {
            error!(?err, "failed to clear session after 401");
        }
        // no subscribers is fine
        let _ = self.inner.events.send(SessionEvent::Invalidated);
    }
}

pub(crate) fn to_json(body: &impl Serialize) -> ApiResult<Value> {
    serde_json::to_value(body)
        .map_err(|err| ApiError::validation(format!("request body is not serializable: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Session, User, UserRole},
        session::MemorySessionStore,
    };
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session() -> Session {
        Session {
            token: "secret-token".to_string(),
            user: User {
                id: 1,
                nome: "Carla".to_string(),
                email: "c@example.com".to_string(),
                telefone: None,
                cpf: None,
                endereco: None,
                tipo: UserRole::Cliente,
            },
        }
    }

    fn client(server: &MockServer, store: Arc<MemorySessionStore>) -> ApiClient {
        ApiClient::new(server.uri(), store).expect("client creation")
    }

    async fn only_request(server: &MockServer) -> wiremock::Request {
        let mut requests = server.received_requests().await.expect("recording enabled");
        assert_eq!(requests.len(), 1);
        requests.remove(0)
    }

    #[tokio::test]
    async fn attaches_bearer_token_when_logged_in() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servicos"))
            .and(header("Authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemorySessionStore::with_session(session()));
        let result = client(&server, store).get("/servicos").await;
        assert_eq!(result.expect("listing"), json!([]));
    }

    #[tokio::test]
    async fn no_authorization_header_without_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servicos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let store = Arc::new(MemorySessionStore::new());
        client(&server, store).get("/servicos").await.expect("listing");

        let request = only_request(&server).await;
        assert!(request.headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn unauthenticated_calls_skip_the_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/usuarios/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let store = Arc::new(MemorySessionStore::with_session(session()));
        client(&server, store)
            .request(
                "/usuarios/login",
                RequestOptions::new(Method::POST)
                    .json(json!({"email": "c@example.com"}))
                    .unauthenticated(),
            )
            .await
            .expect("login call");

        let request = only_request(&server).await;
        assert!(request.headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn json_bodies_get_a_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/servicos"))
            .and(header("Content-Type", "application/json"))
            .and(body_json(json!({"descricao": "Faxina"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemorySessionStore::new());
        let created = client(&server, store)
            .post("/servicos", &json!({"descricao": "Faxina"}))
            .await
            .expect("create");
        assert_eq!(created, json!({"id": 1}));
    }

    #[tokio::test]
    async fn caller_content_type_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/servicos"))
            .and(header("content-type", "application/json; charset=utf-8"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemorySessionStore::new());
        client(&server, store)
            .request(
                "/servicos",
                RequestOptions::new(Method::POST)
                    .header("Content-Type", "application/json; charset=utf-8")
                    .json(json!({})),
            )
            .await
            .expect("create");
    }

    #[tokio::test]
    async fn binary_bodies_pass_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/uploads"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = Arc::new(MemorySessionStore::new());
        let bytes = vec![0x89, b'P', b'N', b'G'];
        client(&server, store)
            .request(
                "/uploads",
                RequestOptions::new(Method::POST).binary(bytes.clone()),
            )
            .await
            .expect("upload");

        let request = only_request(&server).await;
        assert_eq!(request.body, bytes);
        let content_type = request
            .headers
            .get("content-type")
            .map(|value| value.to_str().unwrap_or_default().to_string());
        assert_ne!(content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn non_json_success_body_is_returned_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/contratos/3/encerrar"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Contrato encerrado"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/contratos/3"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let store = Arc::new(MemorySessionStore::new());
        let client = client(&server, store);
        let closed = client
            .patch("/contratos/3/encerrar", &json!({}))
            .await
            .expect("close");
        assert_eq!(closed, json!("Contrato encerrado"));

        let deleted = client.delete("/contratos/3").await.expect("delete");
        assert_eq!(deleted, Value::Null);
    }

    #[tokio::test]
    async fn failures_carry_server_message_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contratos"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(json!({"message": "Serviço inexistente", "error": "Unprocessable"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/servicos"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = Arc::new(MemorySessionStore::new());
        let client = client(&server, store);

        match client.post("/contratos", &json!({})).await {
            Err(ApiError::Request { status, message }) => {
                assert_eq!(status, 422);
                assert_eq!(message, "Serviço inexistente");
            }
            other => panic!("expected request error, got {other:?}"),
        }

        match client.get("/servicos").await {
            Err(ApiError::Request { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "HTTP 500");
            }
            other => panic!("expected request error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_clears_session_and_notifies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contratos"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Token expirado"})),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemorySessionStore::with_session(session()));
        let client = client(&server, store.clone());
        let mut events = client.subscribe();

        let err = client
            .get("/contratos?clienteId=1")
            .await
            .expect_err("401 must fail");
        assert!(err.is_auth());
        assert_eq!(err.to_string(), "Token expirado");
        assert!(store.get().is_none());
        assert_eq!(events.try_recv().ok(), Some(SessionEvent::Invalidated));
    }

    #[tokio::test]
    async fn transport_failure_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let address = listener.local_addr().expect("address");
        drop(listener);

        let store = Arc::new(MemorySessionStore::new());
        let client = ApiClient::with_timeout(
            format!("http://{address}"),
            store,
            Duration::from_secs(2),
        )
        .expect("client creation");
        let err = client.get("/servicos").await.expect_err("nothing listening");
        assert!(matches!(err, ApiError::Network(_)));
    }

    #[test]
    fn null_list_decodes_to_empty() {
        let services: Vec<crate::models::Service> =
            ApiClient::decode_list(Value::Null).expect("empty list");
        assert!(services.is_empty());
        assert!(matches!(
            ApiClient::decode::<Vec<crate::models::Service>>(json!({"oops": true})),
            Err(ApiError::InvalidResponse(_))
        ));
    }
}
