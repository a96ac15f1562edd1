//! HTTP handlers for file operations.
//! Multipart bodies are parsed here; every decision about the files
//! themselves is delegated to `FileService`.

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::io::Cursor;
use tokio_util::io::ReaderStream;

use crate::{
    errors::AppError,
    models::file::{File, ObjectStream, PaginatedFiles},
    services::storage_error::StorageError,
    state::AppState,
};

/// `?bucket=&key=` as used by download, presign and delete.
#[derive(Debug, Deserialize)]
pub struct ObjectQuery {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub token: String,
    /// Unparseable values fall back to the default page size.
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

/// Text fields and file parts collected from one multipart body.
struct UploadForm {
    bucket: String,
    files: Vec<File>,
}

/// Collect the `bucket` field and every part named `file_field`.
async fn read_form(multipart: &mut Multipart, file_field: &str) -> Result<UploadForm, AppError> {
    let mut form = UploadForm {
        bucket: String::new(),
        files: Vec::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(err.status(), err.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "bucket" {
            form.bucket = field
                .text()
                .await
                .map_err(|err| AppError::new(err.status(), err.body_text()))?;
        } else if name == file_field {
            let filename = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|err| AppError::new(err.status(), err.body_text()))?;
            let size = data.len() as i64;
            form.files
                .push(File::new(filename, Cursor::new(data), size, content_type));
        }
    }

    Ok(form)
}

/// `POST /api/v1/upload` with multipart fields `bucket` and `file`.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_form(&mut multipart, "file").await?;
    let mut file = form
        .files
        .into_iter()
        .next()
        .ok_or_else(|| AppError::bad_request("file field is required"))?;

    let url = state.files.upload_file(&form.bucket, &mut file).await?;
    Ok((StatusCode::CREATED, Json(json!({ "url": url }))))
}

/// `POST /api/v1/upload-multiple` with a `bucket` field and repeated `files` parts.
pub async fn upload_multiple(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_form(&mut multipart, "files").await?;
    if form.files.is_empty() {
        return Err(StorageError::NoFiles.into());
    }

    let urls = state
        .files
        .upload_multiple_files(&form.bucket, form.files)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "urls": urls }))))
}

/// `GET /api/v1/presign?bucket=&key=`
pub async fn presign(
    State(state): State<AppState>,
    Query(q): Query<ObjectQuery>,
) -> Result<impl IntoResponse, AppError> {
    let url = state.files.download_url(&q.bucket, &q.key).await?;
    Ok(Json(json!({ "presigned_url": url })))
}

/// `GET /api/v1/download?bucket=&key=`, streamed as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Query(q): Query<ObjectQuery>,
) -> Result<Response, AppError> {
    let reader = state.files.download_file(&q.bucket, &q.key).await?;
    Ok(attachment_response(reader, &q.key))
}

/// `GET /files/{bucket}/{*key}?expires=&signature=`, the target of presigned URLs.
pub async fn signed_download(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(q): Query<SignedQuery>,
) -> Result<Response, AppError> {
    let valid = match (q.expires, q.signature.as_deref()) {
        (Some(expires), Some(signature)) => {
            state.disk.signer().verify(&bucket, &key, expires, signature)
        }
        _ => false,
    };
    if !valid {
        return Err(AppError::forbidden("invalid or expired signature"));
    }

    let reader = state.files.download_file(&bucket, &key).await?;
    Ok(attachment_response(reader, &key))
}

/// `GET /api/v1/list?bucket=&extension=&token=&limit=`
pub async fn list_files(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<PaginatedFiles>, AppError> {
    let limit = q
        .limit
        .as_deref()
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(0);

    let page = state
        .files
        .list_files(&q.bucket, &q.extension, &q.token, limit)
        .await?;
    Ok(Json(page))
}

/// `DELETE /api/v1/delete?bucket=&key=`
pub async fn delete_file(
    State(state): State<AppState>,
    Query(q): Query<ObjectQuery>,
) -> Result<StatusCode, AppError> {
    state.files.delete_file(&q.bucket, &q.key).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn attachment_response(reader: ObjectStream, key: &str) -> Response {
    let filename = key.rsplit('/').next().unwrap_or(key);
    let mut response = Response::new(Body::from_stream(ReaderStream::new(reader)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );
    response
}
