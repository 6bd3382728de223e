//! Playback and statistics for stored videos.

use std::path::PathBuf;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderValue};
use axum::response::Response;
use axum::Json;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::debug;

use mirage_models::{content_type_for, VideoData, VideoKind};

use crate::error::{ApiError, ApiResult};
use crate::security::is_valid_filename;
use crate::state::AppState;

/// Error message for a missing file of the given kind.
pub fn not_found_message(kind: VideoKind, filename: &str) -> String {
    match kind {
        VideoKind::Original => format!("File not found: {}", filename),
        VideoKind::Processed => format!("Processed file not found: {}", filename),
    }
}

/// Resolve a stored file, rejecting unsafe names and missing files.
async fn resolve(state: &AppState, kind: VideoKind, filename: &str) -> ApiResult<PathBuf> {
    if !is_valid_filename(filename) {
        return Err(ApiError::bad_request("Invalid filename"));
    }

    let dir = match kind {
        VideoKind::Original => &state.config.upload_dir,
        VideoKind::Processed => &state.config.processed_dir,
    };
    let path = dir.join(filename);

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(path),
        _ => Err(ApiError::not_found(not_found_message(kind, filename))),
    }
}

/// Serve a stored file with range support.
async fn serve(state: &AppState, kind: VideoKind, filename: &str, request: Request) -> ApiResult<Response> {
    let path = resolve(state, kind, filename).await?;
    debug!(kind = %kind, file = %filename, "Serving video");

    let response = ServeFile::new(&path)
        .oneshot(request)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to serve {}: {}", filename, e)))?;

    let mut response = response.map(Body::new);
    let success = response.status().is_success();
    let headers = response.headers_mut();
    // Partial and full responses alike carry the video's own type
    if success {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type_for(filename)),
        );
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Ok(response)
}

/// Serve an uploaded original.
pub async fn get_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    serve(&state, VideoKind::Original, &filename, request).await
}

/// Serve a processed output.
pub async fn get_processed(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    serve(&state, VideoKind::Processed, &filename, request).await
}

/// Statistics for an uploaded original.
pub async fn video_stats(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Json<VideoData>> {
    let path = resolve(&state, VideoKind::Original, &filename).await?;
    Ok(Json(state.processor.inspect(&path).await?))
}

/// Statistics for a processed output.
pub async fn processed_stats(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Json<VideoData>> {
    let path = resolve(&state, VideoKind::Processed, &filename).await?;
    Ok(Json(state.processor.inspect(&path).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        assert_eq!(
            not_found_message(VideoKind::Original, "cam.mp4"),
            "File not found: cam.mp4"
        );
        assert_eq!(
            not_found_message(VideoKind::Processed, "processed_cam.mp4"),
            "Processed file not found: processed_cam.mp4"
        );
    }
}
