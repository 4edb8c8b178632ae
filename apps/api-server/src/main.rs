//! api-server: HTTP API for the durable links workspace.
//!
//! Endpoints:
//! - `POST /v1/shortLinks`: create (or reuse) a short link from a structured
//!   request or a `longDurableLink`.
//! - `POST /v1/exchangeShortLink`: resolve a short link to its long form.
//! - `GET /:path`: redirect (307) to the target link of `{URL_SCHEME}://{Host}/{path}`.
//!
//! An optional `X-Tenant-Id` header (UUID) scopes every operation to a tenant.
//! Storage is in-memory or SQLite (file) when the `sqlite` feature is enabled.
//!
//! Run:
//! ```bash
//! DOMAIN_ALLOW_LIST=example.com cargo run -p api-server
//!
//! # JSON logs, in-memory store
//! DOMAIN_ALLOW_LIST=example.com LOG_FORMAT=json STORAGE_PROVIDER=memory \
//!   cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::HeaderValue;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use domain::adapters::memory_repo::InMemoryLinkStore;
use domain::normalize::LinkValidator;
use domain::path::RandomPathGenerator;
use domain::service::DurableLinkService;
use domain::{
    Clock, CoreError, CreateInput, ExchangeShortLinkRequest, LinkStore, StoreError, StoredLink,
    TenantConfig, TenantId, ValidationError, ValidationErrors,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const TENANT_HEADER: &str = "x-tenant-id";

// Local store abstraction supporting memory or sqlite (feature-gated).
enum AnyStore {
    Memory(InMemoryLinkStore),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite_adapter::SqliteLinkStore),
}

impl AnyStore {
    fn memory() -> Self {
        Self::Memory(InMemoryLinkStore::new())
    }
}

impl LinkStore for AnyStore {
    fn lookup_by_host_and_path(
        &self,
        host: &str,
        path: &str,
        tenant_id: Option<&TenantId>,
    ) -> Result<Option<StoredLink>, StoreError> {
        match self {
            AnyStore::Memory(s) => s.lookup_by_host_and_path(host, path, tenant_id),
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.lookup_by_host_and_path(host, path, tenant_id),
        }
    }

    fn find_reusable_short_link(
        &self,
        host: &str,
        link: &str,
        params_hash: &str,
        tenant_id: Option<&TenantId>,
    ) -> Result<Option<String>, StoreError> {
        match self {
            AnyStore::Memory(s) => s.find_reusable_short_link(host, link, params_hash, tenant_id),
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.find_reusable_short_link(host, link, params_hash, tenant_id),
        }
    }

    fn insert(&self, link: StoredLink) -> Result<StoredLink, StoreError> {
        match self {
            AnyStore::Memory(s) => s.insert(link),
            #[cfg(feature = "sqlite")]
            AnyStore::Sqlite(s) => s.insert(link),
        }
    }
}

struct StdClock;
impl Clock for StdClock {
    fn now(&self) -> std::time::SystemTime {
        std::time::SystemTime::now()
    }
}

type Service = DurableLinkService<AnyStore, RandomPathGenerator, StdClock>;

#[derive(Clone)]
struct AppState {
    service: Arc<Service>,
    tenant: Arc<TenantConfig>,
}

impl AppState {
    fn new(store: AnyStore, tenant: TenantConfig) -> Self {
        Self {
            service: Arc::new(DurableLinkService::new(
                store,
                RandomPathGenerator::new(),
                StdClock,
                LinkValidator::new(),
            )),
            tenant: Arc::new(tenant),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_insecure();

    let store = match build_store(&cfg) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to initialize link store");
            std::process::exit(1);
        }
    };
    let state = AppState::new(store, cfg.tenant.clone());

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::HeaderName::from_static(TENANT_HEADER),
            ])
    };
    let app = build_router(state).layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, "api-server listening");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct a store instance based on config and feature flags.
fn build_store(cfg: &config::Config) -> Result<AnyStore, StoreError> {
    match cfg.storage_provider {
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => {
            let store = sqlite_adapter::SqliteLinkStore::open(&cfg.db_path)?;
            info!(db_path = %cfg.db_path.display(), "using sqlite link store");
            Ok(AnyStore::Sqlite(store))
        }
        #[cfg(not(feature = "sqlite"))]
        config::StorageProvider::Sqlite => {
            warn!("sqlite feature disabled; falling back to in-memory store");
            Ok(AnyStore::memory())
        }
        config::StorageProvider::Memory => Ok(AnyStore::memory()),
    }
}

fn build_router(state: AppState) -> Router {
    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    Router::new()
        .route("/v1/shortLinks", post(create_short_link))
        .route("/v1/exchangeShortLink", post(exchange_short_link))
        .route("/:path", get(redirect_short_link))
        .fallback(not_found)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state)
}

fn error_response(err: &CoreError) -> Response {
    let (code, body) = http_common::error_response(err);
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(err = %err, "request failed");
    } else {
        warn!(err = %err, status = code, "request rejected");
    }
    (status, Json(body)).into_response()
}

fn tenant_from_headers(headers: &HeaderMap) -> Result<Option<TenantId>, CoreError> {
    match headers.get(TENANT_HEADER) {
        None => Ok(None),
        Some(v) => {
            let raw = v
                .to_str()
                .map_err(|_| CoreError::InvalidTenantId("header is not valid UTF-8".into()))?;
            TenantId::parse(raw).map(Some)
        }
    }
}

fn bad_body(rejection: JsonRejection) -> Response {
    let errors = ValidationErrors {
        errors: vec![ValidationError {
            field: String::new(),
            tag: "json".into(),
            message: format!("Invalid request body: {}", rejection.body_text()),
        }],
    };
    error_response(&CoreError::Validation(errors))
}

async fn create_short_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateInput>, JsonRejection>,
) -> Response {
    let Json(input) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_body(rejection),
    };
    let tenant = match tenant_from_headers(&headers) {
        Ok(t) => t,
        Err(e) => return error_response(&e),
    };

    let result = state
        .service
        .prepare(input)
        .and_then(|request| state.service.create(request, tenant.as_ref(), &state.tenant));
    match result {
        Ok(created) => {
            info!(
                short_link = %created.short_link,
                warnings = created.warnings.len(),
                tenant_id = ?tenant,
                "short link issued"
            );
            (StatusCode::OK, Json(created)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn exchange_short_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ExchangeShortLinkRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_body(rejection),
    };
    let tenant = match tenant_from_headers(&headers) {
        Ok(t) => t,
        Err(e) => return error_response(&e),
    };

    match state
        .service
        .resolve(&req.requested_link, tenant.as_ref(), &state.tenant)
    {
        Ok(resolved) => {
            info!(requested_link = %req.requested_link, "short link exchanged");
            (StatusCode::OK, Json(resolved)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn redirect_short_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> Response {
    let tenant = match tenant_from_headers(&headers) {
        Ok(t) => t,
        Err(e) => return error_response(&e),
    };
    let Some(host) = headers.get("host").and_then(|v| v.to_str().ok()) else {
        return error_response(&CoreError::InvalidRequestedLink);
    };

    let raw = format!("{}://{}/{}", state.tenant.url_scheme, host, path);
    match state.service.lookup(&raw, tenant.as_ref()) {
        Ok(link) => {
            info!(host = %link.host, path = %link.path, redirect_to = %link.link, "resolve ok");
            Redirect::temporary(&link.link).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(http_common::json_err(404, http_common::NOT_FOUND)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::util::ServiceExt;

    fn tenant_config() -> TenantConfig {
        TenantConfig {
            url_scheme: "https".into(),
            domain_allow_list: vec!["example.com".into()],
            short_path_length: 4,
            unguessable_path_length: 17,
            default_ios_app_store_id: None,
            default_android_package: None,
        }
    }

    fn app() -> Router {
        build_router(AppState::new(AnyStore::memory(), tenant_config()))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn with_tenant(mut req: Request<Body>, tenant: &str) -> Request<Body> {
        req.headers_mut()
            .insert(TENANT_HEADER, HeaderValue::from_str(tenant).unwrap());
        req
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    const CREATE_SHORT: &str = r#"{
        "durableLinkInfo": {
            "host": "acme.short.link",
            "link": "https://example.com/target",
            "androidParameters": {"androidPackageName": "com.example.app"}
        },
        "suffix": {"option": "SHORT"}
    }"#;

    #[tokio::test]
    async fn create_exchange_and_redirect_flow() {
        let router = app();

        let (status, created) = send(&router, post_json("/v1/shortLinks", CREATE_SHORT)).await;
        assert_eq!(status, StatusCode::OK);
        let short_link = created["shortLink"].as_str().unwrap().to_string();
        assert!(short_link.starts_with("https://acme.short.link/"));
        assert_eq!(created["warnings"], serde_json::json!([]));

        // identical SHORT request reuses the path
        let (_, again) = send(&router, post_json("/v1/shortLinks", CREATE_SHORT)).await;
        assert_eq!(again["shortLink"], created["shortLink"]);

        let body = serde_json::json!({ "requestedLink": short_link }).to_string();
        let (status, long) = send(&router, post_json("/v1/exchangeShortLink", &body)).await;
        assert_eq!(status, StatusCode::OK);
        let path = short_link.rsplit('/').next().unwrap();
        assert_eq!(
            long["longLink"],
            format!(
                "https://acme.short.link/{}?link=https%3A%2F%2Fexample.com%2Ftarget&apn=com.example.app",
                path
            )
        );

        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/{}", path))
                    .header("host", "acme.short.link")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "https://example.com/target"
        );
        assert!(resp.headers().get("x-request-id").is_some());
    }

    #[tokio::test]
    async fn create_from_long_durable_link_with_warnings() {
        let router = app();
        let body = serde_json::json!({
            "longDurableLink": "https://acme.short.link/?link=https%3A%2F%2Fexample.com%2Fx&si=not-a-url&path=unguessable"
        })
        .to_string();
        let (status, created) = send(&router, post_json("/v1/shortLinks", &body)).await;
        assert_eq!(status, StatusCode::OK);
        let path = created["shortLink"].as_str().unwrap().rsplit('/').next().unwrap().to_string();
        assert_eq!(path.len(), 17);
        assert_eq!(
            created["warnings"],
            serde_json::json!([{
                "warningCode": "MALFORMED_PARAM",
                "warningMessage": "Param 'socialImageLink' is not a valid URL"
            }])
        );
    }

    #[tokio::test]
    async fn create_errors_map_to_statuses() {
        let router = app();

        let body = CREATE_SHORT.replace("https://example.com/target", "https://evil.com/x");
        let (status, err) = send(&router, post_json("/v1/shortLinks", &body)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(err["error"]["code"], 403);
        assert_eq!(err["error"]["status"], "PERMISSION_DENIED");

        let body = r#"{"durableLinkInfo": {"host": "acme.short.link"}}"#;
        let (status, err) = send(&router, post_json("/v1/shortLinks", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["status"], "INVALID_ARGUMENT");
        assert_eq!(err["error"]["message"], "link is required");

        let body = CREATE_SHORT.replace("https://example.com/target", "ftp://example.com/x");
        let (status, _) = send(&router, post_json("/v1/shortLinks", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, err) = send(&router, post_json("/v1/shortLinks", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["details"][0]["tag"], "json");
    }

    #[tokio::test]
    async fn exchange_errors() {
        let router = app();
        let cases = [
            ("not a url", StatusCode::BAD_REQUEST),
            ("https://acme.short.link/", StatusCode::BAD_REQUEST),
            ("https://acme.short.link/a/b", StatusCode::BAD_REQUEST),
            ("https://acme.short.link/missing", StatusCode::NOT_FOUND),
        ];
        for (link, expected) in cases {
            let body = serde_json::json!({ "requestedLink": link }).to_string();
            let (status, err) = send(&router, post_json("/v1/exchangeShortLink", &body)).await;
            assert_eq!(status, expected, "{link}");
            assert_eq!(err["error"]["code"], expected.as_u16(), "{link}");
        }
    }

    #[tokio::test]
    async fn tenant_header_scopes_links() {
        let router = app();
        let t1 = "6f1c1d5e-8f0a-4a43-9c55-0f3b7d1c2e11";
        let t2 = "0b6f5c3e-3a0e-4f44-8a43-2b8f1d9e7c10";

        let (status, created) = send(&router, with_tenant(post_json("/v1/shortLinks", CREATE_SHORT), t1)).await;
        assert_eq!(status, StatusCode::OK);
        let body = serde_json::json!({ "requestedLink": created["shortLink"] }).to_string();

        let (status, _) = send(&router, with_tenant(post_json("/v1/exchangeShortLink", &body), t1)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&router, with_tenant(post_json("/v1/exchangeShortLink", &body), t2)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, err) = send(&router, with_tenant(post_json("/v1/shortLinks", CREATE_SHORT), "acme")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["status"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn redirect_unknown_path_is_404() {
        let router = app();
        let (status, err) = send(
            &router,
            Request::builder()
                .uri("/nope")
                .header("host", "acme.short.link")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["error"]["status"], "NOT_FOUND");

        let (status, _) = send(
            &router,
            Request::builder().uri("/a/b").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
