use std::path::Path;

use axum::{extract::State, Json};
use axum_extra::extract::Multipart;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tokio::fs;

use crate::{
    error::{AppError, AppResult},
    AppState,
};

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

pub const ALLOWED_CONTENT_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/gif", "application/pdf"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_path: String,
    pub file_name: String,
    pub file_url: String,
}

struct FilePart {
    file_name: String,
    content_type: String,
    data: axum::body::Bytes,
}

/// Name on disk: hex of the original stem, upload time in milliseconds, a
/// random number, then the original extension.
pub fn stored_file_name(original: &str, timestamp_millis: i64, suffix: u32) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();

    format!(
        "{}-{}-{}{}",
        hex::encode(stem.as_bytes()),
        timestamp_millis,
        suffix,
        extension
    )
}

async fn read_file_part(mut multipart: Multipart) -> AppResult<Option<FilePart>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("Malformed upload: {}", err)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(format!("Malformed upload: {}", err)))?;

        if file_name.is_empty() && data.is_empty() {
            return Ok(None);
        }
        return Ok(Some(FilePart {
            file_name,
            content_type,
            data,
        }));
    }
    Ok(None)
}

pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<UploadedFile>> {
    let part = read_file_part(multipart)
        .await?
        .ok_or_else(|| AppError::bad_request("No file was uploaded"))?;

    if !ALLOWED_CONTENT_TYPES.contains(&part.content_type.as_str()) {
        return Err(AppError::bad_request(
            "Unsupported file type. Only JPEG, PNG, GIF and PDF files can be uploaded",
        ));
    }
    if part.data.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::bad_request("File exceeds the 5 MB limit"));
    }

    if !state.upload_dir.exists() {
        fs::create_dir_all(&state.upload_dir)
            .await
            .map_err(AppError::internal)?;
    }

    let suffix = rand::thread_rng().gen_range(0..1_000_000_000u32);
    let stored = stored_file_name(&part.file_name, Utc::now().timestamp_millis(), suffix);
    let file_path = state.upload_dir.join(&stored);
    fs::write(&file_path, &part.data)
        .await
        .map_err(AppError::internal)?;

    log::info!(
        "stored upload {} ({} bytes, {})",
        stored,
        part.data.len(),
        part.content_type
    );

    Ok(Json(UploadedFile {
        file_path: file_path.display().to_string(),
        file_name: part.file_name,
        file_url: format!("/uploads/{}", stored),
    }))
}
