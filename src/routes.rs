use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartRejection, DefaultBodyLimit, Multipart, Request, State,
    },
    http::{header::ORIGIN, HeaderValue, Method},
    middleware::{self, Next},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::{Config, OriginPolicy};
use crate::error::ApiError;
use crate::pipeline;
use crate::upload::UploadForm;
use crate::vision::VisionClient;

pub struct AppState {
    pub config: Config,
    pub vision: Arc<dyn VisionClient>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DescriptionResponse {
    pub description: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/generate-description", post(generate_description));

    if let Some(dir) = &state.config.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&state.config.origins))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                enforce_origin,
            ))
            .layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
    )
    .with_state(state)
}

fn cors_layer(policy: &OriginPolicy) -> CorsLayer {
    match policy {
        OriginPolicy::Any => CorsLayer::permissive(),
        OriginPolicy::AllowList(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any)
        }
    }
}

async fn enforce_origin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(ORIGIN)
        .map(|v| v.to_str().unwrap_or_default());

    if !state.config.origins.permits(origin) {
        tracing::warn!(origin = origin.unwrap_or_default(), "origin not allowed");
        return ApiError::OriginRejected.into_response();
    }
    next.run(request).await
}

async fn generate_description(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DescriptionResponse>, ApiError> {
    // Anything that is not multipart cannot carry an image.
    let multipart = multipart.map_err(|rejection| {
        tracing::debug!(%rejection, "request is not multipart");
        ApiError::MissingFile
    })?;

    let form = UploadForm::read(multipart, &state.config.upload_dir).await?;
    let description = pipeline::describe(&state, form).await?;

    Ok(Json(DescriptionResponse { description }))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}
