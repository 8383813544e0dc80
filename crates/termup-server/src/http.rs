//! ---
//! termup_section: "05-networking-external-interfaces"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "HTTP surface of the publish and update query services."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use prometheus::Registry;
use serde::Deserialize;
use termup_common::config::ServerConfig;
use termup_manifest::{
    CheckUpdateResponse, ErrorBody, Manifest, PublishResponse, ARTIFACT_CONTENT_TYPE,
    PUBLISHED_STATUS,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::metrics::ServiceMetrics;
use crate::publish::{PublishError, PublishService};
use crate::query::{QueryError, UpdateQueryService};
use crate::Stores;

/// Default request body ceiling for uploads.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

struct AppState {
    publish: PublishService,
    query: UpdateQueryService,
    metrics: Option<ServiceMetrics>,
}

/// Builder used to configure and spawn the update service.
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    listen: SocketAddr,
    stores: Stores,
    public_url: Option<Url>,
    max_upload_bytes: usize,
    metrics: Option<Arc<Registry>>,
}

impl ServerBuilder {
    /// Construct a builder listening on `listen` and serving `stores`.
    pub fn new(listen: SocketAddr, stores: Stores) -> Self {
        Self {
            listen,
            stores,
            public_url: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            metrics: None,
        }
    }

    /// Builder populated from the `[server]` configuration section.
    pub fn from_config(config: &ServerConfig, stores: Stores) -> anyhow::Result<Self> {
        let public_url = Url::parse(&config.public_url)
            .with_context(|| format!("invalid server.public_url '{}'", config.public_url))?;
        Ok(Self::new(config.listen, stores)
            .with_public_url(public_url)
            .with_max_upload_bytes(config.max_upload_bytes))
    }

    /// Base URL used when building self-served download links.
    ///
    /// Defaults to `http://<bound address>/` when unset.
    pub fn with_public_url(mut self, url: Url) -> Self {
        self.public_url = Some(url);
        self
    }

    /// Largest accepted request body.
    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// Record service counters in `registry` and expose it at `/metrics`.
    pub fn with_metrics_registry(mut self, registry: Arc<Registry>) -> Self {
        self.metrics = Some(registry);
        self
    }

    /// Bind the listener and serve until [`ServerHandle::shutdown`] is called.
    pub async fn spawn(self) -> anyhow::Result<ServerHandle> {
        let listener = TcpListener::bind(self.listen)
            .await
            .with_context(|| format!("failed to bind {}", self.listen))?;
        let local_addr = listener.local_addr()?;
        let public_url = match self.public_url {
            Some(url) => url,
            None => Url::parse(&format!("http://{local_addr}/"))
                .context("failed to derive public url from bound address")?,
        };
        let metrics = self
            .metrics
            .map(ServiceMetrics::new)
            .transpose()
            .context("failed to register service metrics")?;
        info!(
            address = %local_addr,
            public_url = %public_url,
            max_upload_bytes = self.max_upload_bytes,
            "update service listening"
        );

        let state = AppState {
            publish: PublishService::new(self.stores.clone()),
            query: UpdateQueryService::new(self.stores, public_url.clone()),
            metrics,
        };
        let router = Router::new()
            .route("/check_update", get(check_update))
            .route("/upload_update", post(upload_update))
            .route("/download/:artifact_name", get(download_artifact))
            .route("/manifest", get(current_manifest))
            .route("/healthz", get(healthz))
            .route("/metrics", get(get_metrics))
            .layer(DefaultBodyLimit::max(self.max_upload_bytes))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(state));

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "update service exited with error");
            }
        });

        Ok(ServerHandle {
            address: local_addr,
            public_url,
            task,
            shutdown: shutdown_tx,
        })
    }
}

/// Handle returned from [`ServerBuilder::spawn`].
pub struct ServerHandle {
    address: SocketAddr,
    public_url: Url,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl ServerHandle {
    /// Socket address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Base URL advertised in download links.
    pub fn public_url(&self) -> &Url {
        &self.public_url
    }

    /// Request graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.map_err(|join| anyhow::anyhow!(join))
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn multipart(err: MultipartError) -> Self {
        Self::new(err.status(), err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        let status = match &err {
            QueryError::ManifestNotFound | QueryError::ArtifactNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            QueryError::InvalidArtifactName(_) => StatusCode::BAD_REQUEST,
            QueryError::Store(_) => {
                error!(error = %err, "store read failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<PublishError> for ApiError {
    fn from(err: PublishError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            error!(error = %err, "publish failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct CheckParams {
    version: Option<String>,
}

async fn check_update(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CheckParams>,
) -> Result<Json<CheckUpdateResponse>, ApiError> {
    let Some(local) = params.version else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "missing query parameter 'version'",
        ));
    };
    let result = state.query.check_update(&local).await;
    if let Some(metrics) = &state.metrics {
        let label = match &result {
            Ok(check) if check.update_available => "update",
            Ok(_) => "current",
            Err(QueryError::ManifestNotFound) => "no_manifest",
            Err(_) => "error",
        };
        metrics.record_check(label);
    }
    Ok(Json(result?.into()))
}

async fn upload_update(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<PublishResponse>, ApiError> {
    let mut version: Option<String> = None;
    let mut package: Option<Bytes> = None;
    while let Some(field) = multipart.next_field().await.map_err(ApiError::multipart)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("version") => version = Some(field.text().await.map_err(ApiError::multipart)?),
            Some("file") => package = Some(field.bytes().await.map_err(ApiError::multipart)?),
            other => debug!(field = other.unwrap_or(""), "ignoring multipart field"),
        }
    }

    let outcome = match (version, package) {
        (Some(version), Some(package)) => state
            .publish
            .publish(&version, package)
            .await
            .map_err(|err| {
                if let Some(metrics) = &state.metrics {
                    metrics.record_publish_failure(err.stage());
                }
                ApiError::from(err)
            }),
        (None, _) => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "missing multipart field 'version'",
        )),
        (_, None) => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "missing multipart field 'file'",
        )),
    };
    let receipt = outcome?;
    if let Some(metrics) = &state.metrics {
        metrics.record_publish();
    }
    Ok(Json(PublishResponse {
        status: PUBLISHED_STATUS.to_owned(),
        version: receipt.published_version.into(),
    }))
}

async fn download_artifact(
    State(state): State<Arc<AppState>>,
    Path(artifact_name): Path<String>,
) -> Result<Response, ApiError> {
    let result = state.query.fetch_artifact(&artifact_name).await;
    if let Some(metrics) = &state.metrics {
        let label = match &result {
            Ok(_) => "served",
            Err(QueryError::ArtifactNotFound(_)) | Err(QueryError::InvalidArtifactName(_)) => {
                "missing"
            }
            Err(_) => "error",
        };
        metrics.record_download(label);
    }
    let bytes = result?;
    debug!(artifact = %artifact_name, bytes = bytes.len(), "serving artifact");
    Ok((
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static(ARTIFACT_CONTENT_TYPE),
        )],
        bytes,
    )
        .into_response())
}

async fn current_manifest(State(state): State<Arc<AppState>>) -> Result<Json<Manifest>, ApiError> {
    Ok(Json(state.query.current_manifest().await?))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(metrics) = &state.metrics else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics registry unavailable",
        )
            .into_response();
    };
    match metrics.encode() {
        Ok((content_type, body)) => match HeaderValue::from_str(&content_type) {
            Ok(value) => (StatusCode::OK, [(header::CONTENT_TYPE, value)], body).into_response(),
            Err(_) => (StatusCode::OK, body).into_response(),
        },
        Err(err) => {
            warn!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
