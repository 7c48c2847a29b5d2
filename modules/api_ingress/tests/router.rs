use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    routing::post,
    Router,
};
use tower::util::ServiceExt;
use utoipa::openapi::{InfoBuilder, OpenApiBuilder};

use api_ingress::{ApiIngress, ApiIngressConfig};

fn document() -> utoipa::openapi::OpenApi {
    OpenApiBuilder::new()
        .info(InfoBuilder::new().title("Membership API").version("0.1.0").build())
        .build()
}

fn app(config: ApiIngressConfig) -> Router {
    let routes = Router::new().route("/upload", post(|body: String| async move { body.len().to_string() }));
    ApiIngress::new(config).build_router(routes, document())
}

async fn status_of(app: Router, req: Request<Body>) -> StatusCode {
    app.oneshot(req).await.unwrap().status()
}

#[tokio::test]
async fn health_reports_healthy() {
    let response = app(ApiIngressConfig::default())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let response = app(ApiIngressConfig::default())
        .oneshot(Request::builder().uri("/openapi.json").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["info"]["title"], "Membership API");
}

#[tokio::test]
async fn docs_page_follows_config() {
    let docs = || Request::builder().uri("/docs").body(Body::empty()).unwrap();

    assert_eq!(status_of(app(ApiIngressConfig::default()), docs()).await, StatusCode::OK);

    let disabled = ApiIngressConfig {
        enable_docs: false,
        ..Default::default()
    };
    assert_eq!(status_of(app(disabled), docs()).await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let config = ApiIngressConfig {
        body_limit_bytes: 8,
        ..Default::default()
    };
    let req = |payload: &'static str| {
        Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(header::CONTENT_LENGTH, payload.len())
            .body(Body::from(payload))
            .unwrap()
    };

    assert_eq!(status_of(app(config.clone()), req("small")).await, StatusCode::OK);
    assert_eq!(
        status_of(app(config), req("far too large for the limit")).await,
        StatusCode::PAYLOAD_TOO_LARGE
    );
}

#[tokio::test]
async fn serves_until_cancelled() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let cancel = tokio_util::sync::CancellationToken::new();
    let server = tokio::spawn(api_ingress::serve_listener(
        listener,
        app(ApiIngressConfig::default()),
        cancel.clone(),
    ));

    cancel.cancel();
    let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
