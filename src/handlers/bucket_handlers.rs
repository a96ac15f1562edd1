//! HTTP handlers for bucket administration.

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Deserialize;

use crate::{
    errors::AppError,
    models::bucket::{BucketStats, BucketSummary},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateBucketRequest {
    pub bucket_name: String,
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct BucketQuery {
    #[serde(default)]
    pub bucket: String,
}

/// `POST /api/v1/buckets/create`
pub async fn create_bucket(
    State(state): State<AppState>,
    payload: Result<Json<CreateBucketRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(req) =
        payload.map_err(|_| AppError::bad_request("valid bucket_name is required"))?;
    state.files.create_bucket(&req.bucket_name).await?;
    Ok(StatusCode::CREATED)
}

/// `DELETE /api/v1/buckets/delete?name=`
pub async fn delete_bucket(
    State(state): State<AppState>,
    Query(q): Query<NameQuery>,
) -> Result<StatusCode, AppError> {
    state.files.delete_bucket(&q.name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/buckets/stats?bucket=`
pub async fn bucket_stats(
    State(state): State<AppState>,
    Query(q): Query<BucketQuery>,
) -> Result<Json<BucketStats>, AppError> {
    Ok(Json(state.files.bucket_stats(&q.bucket).await?))
}

/// `GET /api/v1/buckets/list`
pub async fn list_buckets(
    State(state): State<AppState>,
) -> Result<Json<Vec<BucketSummary>>, AppError> {
    Ok(Json(state.files.list_buckets().await?))
}

/// `DELETE /api/v1/buckets/empty?bucket=`
pub async fn empty_bucket(
    State(state): State<AppState>,
    Query(q): Query<BucketQuery>,
) -> Result<StatusCode, AppError> {
    state.files.empty_bucket(&q.bucket).await?;
    Ok(StatusCode::NO_CONTENT)
}
