//! HTTP surface
//!
//! - `GET /service`: liveness payload
//! - `GET /{owner}/{dataset}?size=&token=&force=`: JPEG thumbnail
//! - `GET /{owner}/{dataset}/slice?axis=&intercept=&colormap=&size=&mint=&maxt=&token=`: PNG slice

use crate::error::ThumbError;
use crate::orchestrator::{Artifact, ArtifactService};
use crate::types::{
    Axis, DatasetId, IntensityWindow, SliceParams, ThumbnailParams, DEFAULT_INTERCEPT,
    DEFAULT_SIZE,
};
use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Name reported by the liveness probe
pub const SERVICE_NAME: &str = "thumbnail-server";

/// Header telling whether an artifact came straight from the cache
pub const CACHE_HEADER: &str = "x-artifact-cache";

/// Build the application router
pub fn router(service: ArtifactService) -> Router {
    Router::new()
        .route("/service", get(service_status))
        .route("/{owner}/{dataset}", get(get_thumbnail))
        .route("/{owner}/{dataset}/slice", get(get_slice))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
struct ThumbnailQuery {
    size: Option<u32>,
    token: Option<String>,
    force: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SliceQuery {
    axis: Option<String>,
    intercept: Option<f64>,
    colormap: Option<String>,
    size: Option<u32>,
    mint: Option<i64>,
    maxt: Option<i64>,
    token: Option<String>,
}

async fn service_status() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "running",
        "name": SERVICE_NAME,
        "version": crate::VERSION,
    }))
}

async fn get_thumbnail(
    State(service): State<ArtifactService>,
    Path((owner, dataset)): Path<(String, String)>,
    query: Result<Query<ThumbnailQuery>, QueryRejection>,
) -> Result<Response, ThumbError> {
    let Query(query) = query.map_err(invalid_query)?;
    let dataset = DatasetId::new(owner, dataset)?;
    let params = ThumbnailParams {
        size: query.size.unwrap_or(DEFAULT_SIZE),
        force: parse_flag(query.force.as_deref())?,
    };
    let artifact = service
        .thumbnail(&dataset, &params, query.token.as_deref())
        .await?;
    Ok(artifact_response(artifact))
}

async fn get_slice(
    State(service): State<ArtifactService>,
    Path((owner, dataset)): Path<(String, String)>,
    query: Result<Query<SliceQuery>, QueryRejection>,
) -> Result<Response, ThumbError> {
    let Query(query) = query.map_err(invalid_query)?;
    let dataset = DatasetId::new(owner, dataset)?;
    let axis = match query.axis.as_deref() {
        Some(axis) => axis.parse()?,
        None => Axis::Z,
    };
    let params = SliceParams {
        size: query.size.unwrap_or(DEFAULT_SIZE),
        axis,
        intercept: query.intercept.unwrap_or(DEFAULT_INTERCEPT),
        colormap: query.colormap.filter(|c| !c.is_empty()),
        window: IntensityWindow::new(
            threshold("mint", query.mint, 0)?,
            threshold("maxt", query.maxt, 255)?,
        )?,
    };
    let artifact = service.slice(&dataset, &params, query.token.as_deref()).await?;
    Ok(artifact_response(artifact))
}

fn artifact_response(artifact: Artifact) -> Response {
    let cache = if artifact.from_cache { "hit" } else { "miss" };
    let content_type = artifact.content_type();
    let mut response = Response::new(Body::from(artifact.data));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(CACHE_HEADER, HeaderValue::from_static(cache));
    response
}

fn invalid_query(rejection: QueryRejection) -> ThumbError {
    ThumbError::InvalidParameter(rejection.body_text())
}

fn parse_flag(value: Option<&str>) -> Result<bool, ThumbError> {
    match value.map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => Err(ThumbError::InvalidParameter(format!(
            "invalid boolean flag: {}",
            other
        ))),
    }
}

fn threshold(name: &str, value: Option<i64>, default: u8) -> Result<u8, ThumbError> {
    match value {
        None => Ok(default),
        Some(v) => u8::try_from(v).map_err(|_| {
            ThumbError::InvalidParameter(format!("{} must be within 0..=255, got {}", name, v))
        }),
    }
}

impl IntoResponse for ThumbError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ThumbError::Authorization { status, message } => {
                let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY);
                let message = message
                    .clone()
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string());
                (status, message)
            }
            ThumbError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ThumbError::InvalidParameter(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            _ => {
                error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        let body = serde_json::json!({
            "error": {
                "code": status.as_u16(),
                "message": message,
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(!parse_flag(None).unwrap());
        assert!(!parse_flag(Some("false")).unwrap());
        assert!(parse_flag(Some("True")).unwrap());
        assert!(parse_flag(Some("1")).unwrap());
        assert!(parse_flag(Some("maybe")).is_err());
    }

    #[test]
    fn test_threshold() {
        assert_eq!(threshold("mint", None, 0).unwrap(), 0);
        assert_eq!(threshold("maxt", Some(200), 255).unwrap(), 200);
        assert!(threshold("maxt", Some(256), 255).is_err());
        assert!(threshold("mint", Some(-1), 0).is_err());
    }

    #[test]
    fn test_error_status_mapping() {
        let forbidden = ThumbError::Authorization {
            status: 403,
            message: Some("forbidden".to_string()),
        }
        .into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        assert_eq!(
            ThumbError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ThumbError::PipelineExecution { code: Some(2) }
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
