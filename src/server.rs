//! HTTP API.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `POST /summarize` | Analyze the article at `{"url": ...}` |
//! | `GET /health` | Always `{"status": "ok"}` |
//!
//! Errors are returned as `{"error": "..."}` with the status chosen by
//! [`SummarizeError::status`].

use crate::error::SummarizeError;
use crate::models::{AnalysisResult, HealthResponse, SummarizeRequest};
use crate::summarize::Analyze;
use axum::{
    Router,
    extract::State,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE, InvalidHeaderValue},
    },
    response::Json,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};
use url::Url;

/// Build the application router around an analyzer.
pub fn create_router<A>(analyzer: Arc<A>, cors: CorsLayer) -> Router
where
    A: Analyze + Send + Sync + 'static,
{
    Router::new()
        .route("/summarize", post(summarize::<A>))
        .route("/health", get(health))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(analyzer)
}

/// CORS policy for the browser UI. `*` mirrors the caller's origin so that
/// credentialed requests keep working.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, InvalidHeaderValue> {
    let allow_origin = if origin == "*" {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::exact(HeaderValue::from_str(origin.trim_end_matches('/'))?)
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true))
}

/// Bind `0.0.0.0:<port>` and serve until the process exits.
pub async fn serve(app: Router, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Server is listening");
    axum::serve(listener, app).await
}

async fn summarize<A>(
    State(analyzer): State<Arc<A>>,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<AnalysisResult>, SummarizeError>
where
    A: Analyze + Send + Sync + 'static,
{
    if let Err(e) = Url::parse(&request.url) {
        warn!(url = %request.url, error = %e, "Rejected malformed url");
        return Err(SummarizeError::InvalidUrl(format!("{}: {e}", request.url)));
    }

    match analyzer.analyze(&request.url).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            error!(url = %request.url, error = %e, "Error in summarize route");
            Err(e)
        }
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarize::Summarizer;
    use crate::summarize::tests::{FixedModel, FixedSource, REPLY, article};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt; // for oneshot

    fn app(source: FixedSource, model: FixedModel) -> Router {
        let analyzer = Arc::new(Summarizer::new(source, model));
        create_router(analyzer, cors_layer("*").unwrap())
    }

    fn default_app() -> Router {
        app(
            FixedSource(article(Some("Example"), Some("Body text."))),
            FixedModel::replying(REPLY),
        )
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/summarize")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_check_endpoint() {
        let request = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = default_app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let health = body_json(response).await;
        assert_eq!(health, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_summarize_returns_analysis() {
        let response = default_app()
            .oneshot(post_json(r#"{"url": "https://example.com/story"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["title"], "Example");
        assert_eq!(json["url"], "https://example.com/story");
        assert_eq!(json["keyPoints"], serde_json::json!(["Point one", "Point two"]));
        assert_eq!(json["qualityScore"], 81);
        assert_eq!(json["clickbaitScore"], 10);
        assert_eq!(json["contentQuality"]["readability"], 90);
    }

    #[tokio::test]
    async fn test_summarize_rejects_invalid_url() {
        let response = default_app()
            .oneshot(post_json(r#"{"url": "not a url"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().starts_with("invalid url"));
    }

    #[tokio::test]
    async fn test_summarize_requires_url_field() {
        let response = default_app().oneshot(post_json("{}")).await.unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_parse_failure_is_server_error() {
        let response = app(
            FixedSource(article(Some("Example"), Some("Body text."))),
            FixedModel::replying("I could not read that article."),
        )
        .oneshot(post_json(r#"{"url": "https://example.com/story"}"#))
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(
            json["error"]
                .as_str()
                .unwrap()
                .starts_with("invalid response format")
        );
        // The raw reply is never echoed back.
        assert!(json.get("title").is_none());
    }

    #[tokio::test]
    async fn test_extraction_failure_is_bad_gateway() {
        let response = app(FixedSource(None), FixedModel::replying(REPLY))
            .oneshot(post_json(r#"{"url": "https://example.com/story"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/summarize")
            .header("origin", "https://ui.example.com")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();

        let response = default_app().oneshot(request).await.unwrap();

        assert!(response.status().is_success());
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "https://ui.example.com"
        );
        assert_eq!(response.headers()["access-control-allow-credentials"], "true");
    }

    #[test]
    fn test_cors_layer_rejects_bad_origin() {
        assert!(cors_layer("https://ui.example.com/").is_ok());
        assert!(cors_layer("bad\norigin").is_err());
    }
}
