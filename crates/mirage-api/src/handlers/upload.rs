//! Upload and process handler.

use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::Json;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mirage_models::{
    is_allowed_file, processed_filename, CompressionReport, ProcessedInfo, UploadResponse,
    VideoData, UPLOAD_SUCCESS_MESSAGE,
};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::secure_filename;
use crate::state::AppState;

/// Multipart field carrying the video.
pub const FILE_FIELD: &str = "file";

/// An upload held under a request-private name until its job finishes.
struct StoredUpload {
    filename: String,
    work_path: PathBuf,
    bytes: u64,
}

/// Removes a request's work files when the request ends, however it ends.
/// Files already renamed to their public names are gone from these paths.
struct WorkFiles(Vec<PathBuf>);

impl Drop for WorkFiles {
    fn drop(&mut self) {
        for path in &self.0 {
            if std::fs::remove_file(path).is_ok() {
                debug!(path = %path.display(), "Removed abandoned work file");
            }
        }
    }
}

/// Store the `file` part, compress it and report both files.
///
/// The job reads and writes only files keyed by its own id. The results are
/// renamed to their public names once it finishes, so concurrent uploads of
/// the same name never see each other's bytes; the last one to finish owns
/// the public names.
pub async fn upload_video(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    // A body that is not multipart has no file part either
    let mut multipart = multipart.map_err(|_| ApiError::bad_request("No file part"))?;
    let work_id = Uuid::new_v4();
    let work_path = state
        .config
        .upload_dir
        .join(format!(".upload-{}.part", work_id));
    let mut work_files = WorkFiles(vec![work_path.clone()]);

    let upload = match receive_file(&mut multipart, work_path).await {
        Ok(upload) => upload,
        Err(e) => {
            metrics::record_upload("rejected", 0);
            return Err(e);
        }
    };

    info!(
        work_id = %work_id,
        filename = %upload.filename,
        bytes = upload.bytes,
        "Upload stored, starting compression"
    );

    let processed_name = processed_filename(&upload.filename);
    let upload_path = state.config.upload_dir.join(&upload.filename);
    let processed_path = state.config.processed_dir.join(&processed_name);
    let work_output = state
        .config
        .processed_dir
        .join(format!(".{}-{}", work_id, processed_name));
    work_files.0.push(work_output.clone());

    let outcome = process_upload(&state, &upload, &work_output).await;

    // The stored upload is kept whether or not compression worked
    let published = tokio::fs::rename(&upload.work_path, &upload_path).await;
    let outcome = match (outcome, published) {
        (Ok(done), Ok(())) => match tokio::fs::rename(&work_output, &processed_path).await {
            Ok(()) => Ok(done),
            Err(e) => Err(ApiError::from(e)),
        },
        (Ok(_), Err(e)) => Err(ApiError::from(e)),
        (Err(e), published) => {
            if let Err(rename_err) = published {
                warn!(filename = %upload.filename, "Could not keep failed upload: {}", rename_err);
            }
            Err(e)
        }
    };

    let (report, processed, original) = match outcome {
        Ok(done) => done,
        Err(e) => {
            error!(work_id = %work_id, filename = %upload.filename, "Processing failed: {}", e);
            metrics::record_upload("failed", upload.bytes);
            return Err(e);
        }
    };

    metrics::record_upload("success", upload.bytes);
    metrics::record_compression(&report, processed.file_size);

    info!(
        work_id = %work_id,
        filename = %upload.filename,
        processed = %processed_name,
        original_bytes = upload.bytes,
        processed_bytes = processed.file_size,
        idle_frames = report.frames_idle,
        elapsed_ms = report.elapsed_ms,
        "Upload processed"
    );

    Ok(Json(UploadResponse {
        message: UPLOAD_SUCCESS_MESSAGE.to_string(),
        original_filename: upload.filename,
        processed_filename: processed_name,
        original_info: original,
        processed_info: ProcessedInfo::from(&processed),
        report: Some(report),
    }))
}

/// Compress the private upload into `work_output` and inspect both files.
async fn process_upload(
    state: &AppState,
    upload: &StoredUpload,
    work_output: &Path,
) -> ApiResult<(CompressionReport, VideoData, Option<ProcessedInfo>)> {
    let report = {
        let _permit = state
            .jobs
            .acquire()
            .await
            .map_err(|_| ApiError::internal("Processing queue is closed"))?;
        metrics::set_jobs_in_flight(jobs_in_flight(state, 0));

        let result = state.processor.compress(&upload.work_path, work_output).await;

        metrics::set_jobs_in_flight(jobs_in_flight(state, 1));
        result?
    };

    let processed = state.processor.inspect(work_output).await?;
    let original = match state.processor.inspect(&upload.work_path).await {
        Ok(data) => Some(ProcessedInfo::from(&data)),
        Err(e) => {
            warn!(filename = %upload.filename, "Could not inspect original: {}", e);
            None
        }
    };

    Ok((report, processed, original))
}

/// Permits taken, minus those about to be released.
fn jobs_in_flight(state: &AppState, releasing: usize) -> usize {
    state
        .config
        .max_concurrent_jobs
        .max(1)
        .saturating_sub(state.jobs.available_permits())
        .saturating_sub(releasing)
}

/// Find the `file` part, validate its name and stream it to a private file.
async fn receive_file(multipart: &mut Multipart, work_path: PathBuf) -> ApiResult<StoredUpload> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // Without a filename the part is a plain form value, not a file
        let Some(raw_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        if raw_name.is_empty() {
            return Err(ApiError::bad_request("No selected file"));
        }
        if !is_allowed_file(&raw_name) {
            return Err(ApiError::bad_request("File type not allowed"));
        }

        let filename = secure_filename(&raw_name);
        if filename.is_empty() {
            return Err(ApiError::bad_request("No selected file"));
        }
        if !is_allowed_file(&filename) {
            return Err(ApiError::bad_request("File type not allowed"));
        }

        let bytes = save_field(field, &work_path).await?;

        return Ok(StoredUpload {
            filename,
            work_path,
            bytes,
        });
    }

    Err(ApiError::bad_request("No file part"))
}

/// Stream a field to `dest`.
async fn save_field(mut field: Field<'_>, dest: &Path) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(dest).await?;
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
