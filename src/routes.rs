//! HTTP surface
//!
//! | Route          | Guarded | Body                      |
//! |----------------|---------|---------------------------|
//! | `POST /login`  | no      | form `username`, `password` |
//! | `GET /items`   | yes     |                           |
//! | `POST /items`  | yes     | JSON `{"name": ...}`      |
//! | `GET /health`  | no      |                           |
//!
//! Any other method on a known path answers 405 with the JSON error body.
//! On `/items` the gate runs first, so an unauthenticated request gets 401
//! whatever its method.
//!
//! Serve with `into_make_service_with_connect_info::<SocketAddr>()` so login
//! lockout can key on the peer address.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::FormRejection;
use axum::extract::{ConnectInfo, FromRef, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{middleware, Form, Json, Router};
use serde::Deserialize;

use crate::config::{AppConfig, HttpConfig};
use crate::credentials::{AuthError, Authenticator, IssuedToken};
use crate::error::AppError;
use crate::gate::require_bearer;
use crate::layers::ServiceLayers;
use crate::login::{client_ip, LockoutInfo, LoginTracker};
use crate::observability::SecurityEvent;
use crate::store::{Item, ItemStore};
use crate::token::{Identity, TokenCodec};

/// Shared handler state. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct AppState {
    pub codec: TokenCodec,
    pub authenticator: Arc<Authenticator>,
    pub store: Arc<ItemStore>,
    pub login_tracker: LoginTracker,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        let codec = TokenCodec::new(config.signing_key.clone());
        let authenticator = Authenticator::new(config.credentials.clone(), codec.clone())
            .with_token_lifetime(config.token_lifetime);

        Self {
            codec,
            authenticator: Arc::new(authenticator),
            store: Arc::new(ItemStore::new()),
            login_tracker: LoginTracker::new(config.lockout.clone()),
        }
    }
}

impl FromRef<AppState> for TokenCodec {
    fn from_ref(state: &AppState) -> Self {
        state.codec.clone()
    }
}

/// Absent fields deserialize as empty and fail authentication.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct NewItem {
    pub name: String,
}

/// Routes with state applied, without service layers.
pub fn router(state: AppState) -> Router {
    // `layer`, not `route_layer`: the gate also wraps the 405 fallback
    let guarded = Router::new()
        .route(
            "/items",
            get(list_items).post(add_item).fallback(method_not_allowed),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/login", post(login))
        .route("/health", get(health))
        .merge(guarded)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
}

/// The served application: [`router`] wrapped in [`ServiceLayers`].
pub fn app(state: AppState, http: &HttpConfig) -> Router {
    router(state).with_service_layers(http)
}

/// Socket peer of the request, when the server records connect info.
#[derive(Debug, Clone, Copy)]
pub struct PeerAddr(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for PeerAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(Self(peer))
    }
}

async fn login(
    State(state): State<AppState>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Json<IssuedToken>, AppError> {
    let Form(form) = form?;
    let tracker = &state.login_tracker;
    let ip = client_ip(peer, &headers, &tracker.policy().trusted_proxies)
        .map(|ip| ip.to_string());

    // AC-7: locks are checked before the password is looked at
    let lock = ip
        .as_deref()
        .and_then(|ip| tracker.check_ip_lockout(ip))
        .or_else(|| tracker.check_lockout(&form.username));
    if let Some(lock) = lock {
        return Err(locked_out(&lock));
    }

    match state.authenticator.login(&form.username, &form.password) {
        Ok(issued) => {
            tracker.record_success(&form.username, ip.as_deref());
            crate::security_event!(
                SecurityEvent::AuthenticationSuccess,
                identity = %form.username,
                client_ip = ip.as_deref().unwrap_or("unknown"),
                "Login succeeded"
            );
            Ok(Json(issued))
        }
        Err(AuthError::InvalidCredentials) => {
            tracker.record_failure(&form.username, ip.as_deref());
            Err(AuthError::InvalidCredentials.into())
        }
        Err(err) => Err(err.into()),
    }
}

fn locked_out(lock: &LockoutInfo) -> AppError {
    AppError::rate_limited("Too many failed login attempts", lock.retry_after_secs())
}

async fn list_items(State(state): State<AppState>, _identity: Identity) -> Json<Vec<Item>> {
    Json(state.store.list())
}

async fn add_item(
    State(state): State<AppState>,
    identity: Identity,
    body: Bytes,
) -> Result<Json<Item>, AppError> {
    let new_item: NewItem = serde_json::from_slice(&body)?;
    let item = state.store.add(new_item.name);

    crate::security_event!(
        SecurityEvent::ResourceCreated,
        identity = %identity,
        item_id = item.id,
        "Item added"
    );

    Ok(Json(item))
}

async fn health() -> &'static str {
    "OK"
}

async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{PasswordEntry, StaticCredentials};
    use crate::login::LockoutPolicy;
    use crate::signing_key::{SigningKey, SigningKeyPolicy};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn config() -> AppConfig {
        let policy = SigningKeyPolicy::default();
        let key = SigningKey::new(SigningKey::generate(&policy), &policy).unwrap();
        let credentials =
            StaticCredentials::new("testuser", PasswordEntry::parse("testpassword"));
        let http = HttpConfig {
            tracing_enabled: false,
            ..HttpConfig::default()
        };
        AppConfig::new(key, credentials).http(http)
    }

    fn test_app(config: &AppConfig) -> Router {
        app(AppState::new(config), &config.http)
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn login_request(username: &str, password: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("username={}&password={}", username, password)))
            .unwrap()
    }

    fn items_request(method: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri("/items");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn token(app: &Router) -> String {
        let response = send(app, login_request("testuser", "testpassword")).await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_login_then_items_flow() {
        let app = test_app(&config());

        let response = send(&app, login_request("testuser", "testpassword")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let token = body["token"].as_str().unwrap().to_string();
        assert!(body["expires_at"].as_i64().unwrap() > 0);

        let response = send(&app, items_request("GET", Some(&token), None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));

        let response = send(
            &app,
            items_request("POST", Some(&token), Some(json!({"name": "crane"}))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"id": 1, "name": "crane"}));

        let response = send(&app, items_request("GET", Some(&token), None)).await;
        assert_eq!(body_json(response).await, json!([{"id": 1, "name": "crane"}]));
    }

    #[tokio::test]
    async fn test_items_without_header_is_401() {
        let app = test_app(&config());

        let response = send(&app, items_request("GET", None, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_malformed_authorization_is_400() {
        let app = test_app(&config());
        let request = Request::builder()
            .uri("/items")
            .header(header::AUTHORIZATION, "Bearer a b")
            .body(Body::empty())
            .unwrap();

        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bad_credentials_and_bad_token_share_generic_body() {
        let app = test_app(&config());

        let wrong_password = send(&app, login_request("testuser", "nope")).await;
        assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
        let unknown_user = send(&app, login_request("someone", "testpassword")).await;
        assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(wrong_password).await, body_json(unknown_user).await);

        let forged = send(&app, items_request("GET", Some("a.b.c"), None)).await;
        let foreign_token = token(&test_app(&config())).await;
        let foreign = send(&app, items_request("GET", Some(&foreign_token), None)).await;
        assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(foreign.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(forged).await, body_json(foreign).await);
    }

    #[tokio::test]
    async fn test_missing_form_fields_are_401() {
        let app = test_app(&config());
        let request = Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("username=testuser"))
            .unwrap();

        assert_eq!(send(&app, request).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_without_form_is_400() {
        let app = test_app(&config());
        let request = Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"username":"testuser"}"#))
            .unwrap();

        assert_eq!(send(&app, request).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_item_body_is_400() {
        let app = test_app(&config());
        let token = token(&app).await;

        let request = Request::builder()
            .method("POST")
            .uri("/items")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"name\":"))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &app,
            items_request("POST", Some(&token), Some(json!({"title": "crane"}))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_method_is_405() {
        let app = test_app(&config());
        let token = token(&app).await;

        let response = send(
            &app,
            Request::builder().uri("/login").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_json(response).await["error"], "method_not_allowed");

        let response = send(&app, items_request("DELETE", Some(&token), None)).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_json(response).await["error"], "method_not_allowed");
    }

    #[tokio::test]
    async fn test_unknown_method_on_items_needs_a_token_first() {
        let app = test_app(&config());

        let response = send(&app, items_request("DELETE", None, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "unauthorized");

        let response = send(&app, items_request("PUT", Some("a.b.c"), None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_item_body_is_json_whatever_the_content_type() {
        let app = test_app(&config());
        let token = token(&app).await;

        let content_types = [
            None,
            Some("application/x-www-form-urlencoded"),
            Some("text/plain"),
        ];
        for (id, content_type) in (1..).zip(content_types) {
            let mut builder = Request::builder()
                .method("POST")
                .uri("/items")
                .header(header::AUTHORIZATION, format!("Bearer {}", token));
            if let Some(content_type) = content_type {
                builder = builder.header(header::CONTENT_TYPE, content_type);
            }
            let request = builder.body(Body::from(r#"{"name":"crane"}"#)).unwrap();

            let response = send(&app, request).await;
            assert_eq!(response.status(), StatusCode::OK, "{:?}", content_type);
            assert_eq!(body_json(response).await, json!({"id": id, "name": "crane"}));
        }

        let request = Request::builder()
            .method("POST")
            .uri("/items")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("name=crane"))
            .unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_repeated_failures_lock_login() {
        let config = config().lockout(LockoutPolicy::default().max_attempts(2));
        let app = test_app(&config);

        for _ in 0..2 {
            let response = send(&app, login_request("testuser", "wrong")).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        // Correct password is refused while the lock holds
        let response = send(&app, login_request("testuser", "testpassword")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after > 0);

        // Unknown usernames lock the same way
        for _ in 0..2 {
            send(&app, login_request("ghost", "wrong")).await;
        }
        let response = send(&app, login_request("ghost", "wrong")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    fn login_from(
        peer: &str,
        forwarded_for: &str,
        username: &str,
        password: &str,
    ) -> Request<Body> {
        let peer: SocketAddr = peer.parse().unwrap();
        let mut request = login_request(username, password);
        request
            .headers_mut()
            .insert("x-forwarded-for", forwarded_for.parse().unwrap());
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    }

    #[tokio::test]
    async fn test_ip_lockout_keys_on_peer_not_forwarded_header() {
        let policy = LockoutPolicy::default().max_attempts(100).max_ip_attempts(2);
        let app = test_app(&config().lockout(policy));
        let attacker = "203.0.113.7:40000";

        // Rotating the forwarded address does not spread failures out
        for (n, spoofed) in ["198.51.100.1", "198.51.100.2"].iter().enumerate() {
            let request = login_from(attacker, spoofed, &format!("user{}", n), "x");
            let response = send(&app, request).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        let request = login_from(attacker, "198.51.100.3", "testuser", "testpassword");
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // The address the attacker claimed to be is not locked
        let request = login_from("198.51.100.1:50000", "10.9.9.9", "testuser", "testpassword");
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forwarded_header_is_used_behind_trusted_proxy() {
        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        let policy = LockoutPolicy::default()
            .max_attempts(100)
            .max_ip_attempts(2)
            .trusted_proxies([proxy]);
        let app = test_app(&config().lockout(policy));

        for n in 0..2 {
            let request = login_from("10.0.0.1:443", "198.51.100.9", &format!("user{}", n), "x");
            send(&app, request).await;
        }
        let request = login_from("10.0.0.1:443", "198.51.100.9", "testuser", "testpassword");
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // Other clients behind the same proxy are unaffected
        let request = login_from("10.0.0.1:443", "198.51.100.10", "testuser", "testpassword");
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let config = config().lockout(LockoutPolicy::default().max_attempts(2));
        let app = test_app(&config);

        send(&app, login_request("testuser", "wrong")).await;
        token(&app).await;
        send(&app, login_request("testuser", "wrong")).await;

        let response = send(&app, login_request("testuser", "testpassword")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_oversized_item_body_is_413() {
        let config = config();
        let app = test_app(&config);
        let token = token(&app).await;
        let name = "x".repeat(config.http.max_request_size + 1);
        let body = json!({ "name": name }).to_string();

        let request = Request::builder()
            .method("POST")
            .uri("/items")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap();

        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = test_app(&config());
        let response = send(
            &app,
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }
}
