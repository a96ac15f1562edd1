//! Routes for the file and bucket API.
//!
//! ## Structure
//! - **Probes** (mounted at root)
//!   - `GET /healthz`, `GET /readyz`
//! - **File endpoints** under `/api/v1`
//!   - `POST   /upload`, `POST /upload-multiple` (multipart)
//!   - `GET    /list`, `/download`, `/presign`
//!   - `DELETE /delete`
//! - **Bucket endpoints** under `/api/v1/buckets`
//!   - `POST /create`, `DELETE /delete`, `GET /stats`, `GET /list`, `DELETE /empty`
//! - **Signed downloads**
//!   - `GET /files/{bucket}/{*key}?expires=&signature=`
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use std::time::Duration;

use crate::{
    handlers::{
        bucket_handlers::{bucket_stats, create_bucket, delete_bucket, empty_bucket, list_buckets},
        file_handlers::{
            delete_file, download, list_files, presign, signed_download, upload_file,
            upload_multiple,
        },
        health_handlers::{health, healthz, readyz},
    },
    middleware::{enforce_timeout, log_requests},
    state::AppState,
};

/// Every route, still waiting for its `AppState`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/files/{bucket}/{*key}", get(signed_download))
        .nest("/api/v1", api_routes())
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/list", get(list_files))
        .route("/upload", post(upload_file))
        .route("/upload-multiple", post(upload_multiple))
        .route("/download", get(download))
        .route("/presign", get(presign))
        .route("/delete", delete(delete_file))
        .nest("/buckets", bucket_routes())
}

fn bucket_routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_bucket))
        .route("/delete", delete(delete_bucket))
        .route("/stats", get(bucket_stats))
        .route("/list", get(list_buckets))
        .route("/empty", delete(empty_bucket))
}

/// The served application: routes, body limit, request deadline and access log.
pub fn build_router(state: AppState, request_timeout: Duration, max_upload_bytes: usize) -> Router {
    routes()
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn_with_state(request_timeout, enforce_timeout))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{disk_store::DiskObjectStore, signer::UrlSigner};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
        response::Response,
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const PUBLIC_URL: &str = "http://localhost:8080";
    const BOUNDARY: &str = "gateway-test-boundary";
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    async fn app() -> (Router, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let disk = DiskObjectStore::new(
            Arc::new(pool),
            dir.path(),
            UrlSigner::new(PUBLIC_URL, "test-secret").unwrap(),
        );
        disk.migrate().await.unwrap();
        let state = AppState::new(Arc::new(disk), "test");
        (
            build_router(state, Duration::from_secs(5), 1024 * 1024),
            dir,
        )
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn json_body(res: Response) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn create_bucket_request(name: &str) -> Request<Body> {
        Request::post("/api/v1/buckets/create")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "bucket_name": name }).to_string()))
            .unwrap()
    }

    fn multipart(uri: &str, bucket: &str, field: &str, files: &[(&str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"bucket\"\r\n\r\n{bucket}\r\n"
            )
            .as_bytes(),
        );
        for (name, data) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
                     filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn probes_report_ok() {
        let (app, _dir) = app().await;

        assert_eq!(send(&app, get("/healthz")).await.status(), StatusCode::OK);

        let ready = send(&app, get("/readyz")).await;
        assert_eq!(ready.status(), StatusCode::OK);
        assert_eq!(json_body(ready).await["checks"]["sqlite"]["ok"], true);

        let health = json_body(send(&app, get("/api/v1/health")).await).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["env"], "test");
        assert!(health["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn bucket_creation_conflicts_and_bad_bodies() {
        let (app, _dir) = app().await;

        let res = send(&app, create_bucket_request("photos")).await;
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = send(&app, create_bucket_request("photos")).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(res).await["status"], 409);

        let malformed = Request::post("/api/v1/buckets/create")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{"))
            .unwrap();
        let res = send(&app, malformed).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["error"], "valid bucket_name is required");

        let res = send(&app, create_bucket_request("Bad_Name")).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let listed = json_body(send(&app, get("/api/v1/buckets/list")).await).await;
        assert_eq!(listed[0]["name"], "photos");
    }

    #[tokio::test]
    async fn upload_list_presign_and_fetch() {
        let (app, _dir) = app().await;
        send(&app, create_bucket_request("photos")).await;

        let res = send(
            &app,
            multipart("/api/v1/upload", "photos", "file", &[("cat.PNG", PNG)]),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let url = json_body(res).await["url"].as_str().unwrap().to_string();
        assert!(url.starts_with(&format!("{PUBLIC_URL}/files/photos/")));
        assert!(url.ends_with(".PNG"));
        let key = url.rsplit('/').next().unwrap().to_string();

        let page = json_body(send(&app, get("/api/v1/list?bucket=photos&extension=png")).await).await;
        assert_eq!(page["files"].as_array().unwrap().len(), 1);
        assert_eq!(page["files"][0]["key"], key.as_str());
        assert!(page.get("next_token").is_none());

        let stats = json_body(send(&app, get("/api/v1/buckets/stats?bucket=photos")).await).await;
        assert_eq!(stats["total_files"], 1);
        assert_eq!(stats["total_size_bytes"], PNG.len());

        let presigned = json_body(
            send(&app, get(&format!("/api/v1/presign?bucket=photos&key={key}"))).await,
        )
        .await["presigned_url"]
            .as_str()
            .unwrap()
            .to_string();
        let path = presigned.strip_prefix(PUBLIC_URL).unwrap();

        let res = send(&app, get(path)).await;
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], PNG);

        let unsigned = send(&app, get(&format!("/files/photos/{key}"))).await;
        assert_eq!(unsigned.status(), StatusCode::FORBIDDEN);

        let res = send(&app, get(&format!("/api/v1/download?bucket=photos&key={key}"))).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(
            res.headers()[header::CONTENT_DISPOSITION]
                .to_str()
                .unwrap()
                .starts_with("attachment")
        );
    }

    #[tokio::test]
    async fn reserved_characters_in_file_names_survive_signing() {
        let (app, _dir) = app().await;
        send(&app, create_bucket_request("photos")).await;

        let res = send(
            &app,
            multipart("/api/v1/upload", "photos", "file", &[("odd.p?ng", PNG)]),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let url = json_body(res).await["url"].as_str().unwrap().to_string();
        assert!(url.ends_with(".p%3Fng"));

        let page = json_body(send(&app, get("/api/v1/list?bucket=photos")).await).await;
        let key = page["files"][0]["key"].as_str().unwrap().to_string();
        assert!(key.ends_with(".p?ng"));

        let encoded_key = key.replace('?', "%3F");
        let presigned = json_body(
            send(
                &app,
                get(&format!("/api/v1/presign?bucket=photos&key={encoded_key}")),
            )
            .await,
        )
        .await["presigned_url"]
            .as_str()
            .unwrap()
            .to_string();

        let res = send(&app, get(presigned.strip_prefix(PUBLIC_URL).unwrap())).await;
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], PNG);
    }

    #[tokio::test]
    async fn upload_rejections() {
        let (app, _dir) = app().await;
        send(&app, create_bucket_request("docs")).await;

        let res = send(
            &app,
            multipart("/api/v1/upload", "docs", "file", &[("notes.txt", &b"plain text"[..])]),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = send(&app, multipart("/api/v1/upload", "docs", "other", &[])).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["error"], "file field is required");

        let res = send(&app, multipart("/api/v1/upload-multiple", "docs", "files", &[])).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["error"], "no files provided");
    }

    #[tokio::test]
    async fn upload_multiple_returns_urls_in_order() {
        let (app, _dir) = app().await;
        send(&app, create_bucket_request("photos")).await;

        let res = send(
            &app,
            multipart(
                "/api/v1/upload-multiple",
                "photos",
                "files",
                &[("a.png", PNG), ("b.jpeg", PNG)],
            ),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let urls = json_body(res).await["urls"].clone();
        let urls = urls.as_array().unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls[0].as_str().unwrap().ends_with(".png"));
        assert!(urls[1].as_str().unwrap().ends_with(".jpeg"));
    }

    #[tokio::test]
    async fn delete_requires_key_and_reports_missing_objects() {
        let (app, _dir) = app().await;
        send(&app, create_bucket_request("photos")).await;

        let delete = |uri: &str| Request::delete(uri).body(Body::empty()).unwrap();

        let res = send(&app, delete("/api/v1/delete?bucket=photos")).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = send(&app, delete("/api/v1/delete?bucket=photos&key=ghost.png")).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = send(&app, delete("/api/v1/buckets/empty?bucket=photos")).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let res = send(&app, delete("/api/v1/buckets/delete?name=photos")).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let res = send(&app, get("/api/v1/buckets/stats?bucket=photos")).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
