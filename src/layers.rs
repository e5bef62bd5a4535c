//! Service layers for Axum routers
//!
//! `ServiceLayers` wraps a router in the tower-http stack every itemguard
//! surface shares: deadline, body limit, response headers, request tracing.

use axum::http::{header, HeaderValue, StatusCode};
use axum::Router;
use tower_http::{
    limit::RequestBodyLimitLayer, set_header::SetResponseHeaderLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::HttpConfig;

/// Extension trait applying the shared tower-http layers.
///
/// ```ignore
/// use itemguard::{HttpConfig, ServiceLayers};
///
/// let app = Router::new()
///     .route("/health", get(health))
///     .with_service_layers(&HttpConfig::default());
/// ```
pub trait ServiceLayers {
    /// Layers are listed innermost first:
    /// 1. Timeout (SC-5, 408 once the deadline passes)
    /// 2. Request body limit (SC-5, 413)
    /// 3. Response headers (`Cache-Control`, `X-Content-Type-Options`)
    /// 4. TraceLayer (outermost, sees every response)
    fn with_service_layers(self, config: &HttpConfig) -> Self;
}

impl<S> ServiceLayers for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_service_layers(self, config: &HttpConfig) -> Self {
        let mut router = self
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                config.request_timeout,
            ))
            .layer(RequestBodyLimitLayer::new(config.max_request_size));

        // Tokens and item lists must not land in shared caches
        router = router
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ));

        if config.tracing_enabled {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use std::time::Duration;
    use tower::ServiceExt;

    fn config() -> HttpConfig {
        HttpConfig {
            request_timeout: Duration::from_millis(50),
            max_request_size: 16,
            tracing_enabled: false,
        }
    }

    #[tokio::test]
    async fn test_response_headers_applied() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .with_service_layers(&config());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let app = Router::new()
            .route("/", post(|body: String| async move { body }))
            .with_service_layers(&config());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .header(header::CONTENT_LENGTH, "64")
                    .body(Body::from("x".repeat(64)))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_times_out() {
        let app = Router::new()
            .route(
                "/",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .with_service_layers(&config());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
