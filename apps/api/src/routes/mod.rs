pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::portfolio::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = handlers::upload_body_limit(state.config.max_upload_bytes);

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/jobs", post(handlers::handle_upload))
        .route(
            "/api/v1/jobs/:id",
            get(handlers::handle_status).delete(handlers::handle_delete),
        )
        .route("/api/v1/jobs/:id/generate", post(handlers::handle_generate))
        .route("/api/v1/jobs/:id/download", get(handlers::handle_download))
        .route("/api/v1/jobs/:id/preview", get(handlers::handle_preview))
        .route("/api/v1/jobs/:id/view", get(handlers::handle_view))
        .route("/api/v1/cleanup", post(handlers::handle_cleanup))
        .route("/api/v1/providers", get(handlers::handle_providers))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::extraction::sample_pdf;
    use crate::jobs::JobView;
    use crate::llm_client::testing::FakeProvider;
    use crate::llm_client::Provider;

    const BOUNDARY: &str = "portfolio-test-boundary";

    const ANSWER: &str = "===HTML===\n<h1>Jane Doe</h1>\n<section id=\"experience\"><h2>Experience</h2><p>Acme Corp</p></section>\n===CSS===\nh1 { color: navy; }\n===JS===\nconsole.log('ready');\n";

    struct TestApp {
        dir: tempfile::TempDir,
        state: AppState,
    }

    impl TestApp {
        async fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let state = AppState::for_tests(dir.path(), providers).await;
            TestApp { dir, state }
        }

        async fn send(&self, request: Request<Body>) -> Response {
            build_router(self.state.clone())
                .oneshot(request)
                .await
                .unwrap()
        }

        async fn call(&self, method: Method, uri: &str) -> Response {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            self.send(request).await
        }

        async fn upload(&self, filename: &str, content_type: &str, bytes: &[u8]) -> Response {
            self.send(multipart_request("file", filename, content_type, bytes))
                .await
        }

        async fn upload_resume(&self) -> JobView {
            let response = self
                .upload(
                    "Jane Doe CV.pdf",
                    "application/pdf",
                    &sample_pdf(&["Jane Doe", "Experience: Acme Corp"]),
                )
                .await;
            assert_eq!(response.status(), StatusCode::CREATED);
            json(response).await
        }

        fn files_in(&self, sub: &str) -> usize {
            std::fs::read_dir(self.dir.path().join(sub)).unwrap().count()
        }
    }

    fn multipart_request(field: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/jobs")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    async fn error_code(response: Response) -> String {
        let value: Value = json(response).await;
        value["error"]["code"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new(vec![FakeProvider::replying("gemini", ANSWER)]).await;
        let response = app.call(Method::GET, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let value: Value = json(response).await;
        assert_eq!(value["status"], "ok");
        assert_eq!(value["service"], "portfolio-api");
    }

    #[tokio::test]
    async fn test_upload_generate_download_then_cleanup() {
        let gemini = FakeProvider::replying("gemini", ANSWER);
        let app = TestApp::new(vec![gemini.clone()]).await;

        let uploaded = app.upload_resume().await;
        assert_eq!(uploaded.filename, "Jane_Doe_CV.pdf");
        assert!(uploaded.text_extracted);
        assert!(uploaded.download_url.is_none());
        let id = uploaded.job_id;

        let response = app
            .call(Method::POST, &format!("/api/v1/jobs/{id}/generate"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let generated: JobView = json(response).await;
        assert_eq!(generated.status.as_str(), "ready");
        assert_eq!(generated.provider.as_deref(), Some("gemini"));
        assert_eq!(generated.download_url, Some(format!("/api/v1/jobs/{id}/download")));

        let status: JobView = json(app.call(Method::GET, &format!("/api/v1/jobs/{id}")).await).await;
        assert_eq!(status.status.as_str(), "ready");

        let (_, stored) = app.state.jobs.read_output(id).await.unwrap();
        let response = app
            .call(Method::GET, &format!("/api/v1/jobs/{id}/download"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"Jane_Doe_CV_portfolio_"));
        assert!(disposition.ends_with(".html\""));

        let html = body_bytes(response).await;
        assert_eq!(html, stored);
        let html = String::from_utf8(html).unwrap();
        assert!(html.contains("<title>Jane Doe</title>"));
        assert!(html.contains("console.log('ready');"));

        let gone = app.call(Method::GET, &format!("/api/v1/jobs/{id}")).await;
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
        assert_eq!(app.files_in("uploads"), 0);
        assert_eq!(app.files_in("generated"), 0);
        assert_eq!(gemini.calls(), 1);
    }

    #[tokio::test]
    async fn test_fallback_provider_is_used() {
        let gemini = FakeProvider::failing("gemini", 429);
        let groq = FakeProvider::replying("groq", ANSWER);
        let app = TestApp::new(vec![gemini.clone(), groq.clone()]).await;
        let id = app.upload_resume().await.job_id;

        let response = app
            .call(Method::POST, &format!("/api/v1/jobs/{id}/generate"))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let view: JobView = json(response).await;
        assert_eq!(view.provider.as_deref(), Some("groq"));
        assert_eq!(gemini.calls(), 1);
        assert_eq!(groq.seen_models(), vec!["groq-model".to_string()]);
    }

    #[tokio::test]
    async fn test_all_providers_failing_fails_job() {
        let app = TestApp::new(vec![
            FakeProvider::failing("gemini", 500),
            FakeProvider::failing("groq", 503),
        ])
        .await;
        let id = app.upload_resume().await.job_id;

        let response = app
            .call(Method::POST, &format!("/api/v1/jobs/{id}/generate"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(error_code(response).await, "GENERATION_FAILED");

        let status: JobView = json(app.call(Method::GET, &format!("/api/v1/jobs/{id}")).await).await;
        assert_eq!(status.status.as_str(), "failed");
        assert!(status.error.is_some());

        let download = app
            .call(Method::GET, &format!("/api/v1/jobs/{id}/download"))
            .await;
        assert_eq!(download.status(), StatusCode::CONFLICT);
        assert_eq!(error_code(download).await, "NOT_READY");
        assert_eq!(app.files_in("generated"), 0);
    }

    #[tokio::test]
    async fn test_repeated_generate_is_idempotent() {
        let gemini = FakeProvider::replying("gemini", ANSWER);
        let app = TestApp::new(vec![gemini.clone()]).await;
        let id = app.upload_resume().await.job_id;
        let uri = format!("/api/v1/jobs/{id}/generate");

        let first: JobView = json(app.call(Method::POST, &uri).await).await;
        let second: JobView = json(app.call(Method::POST, &uri).await).await;

        assert_eq!(first.status, second.status);
        assert_eq!(first.updated_at, second.updated_at);
        assert_eq!(gemini.calls(), 1);
    }

    #[tokio::test]
    async fn test_non_pdf_is_rejected_without_job() {
        let app = TestApp::new(vec![FakeProvider::replying("gemini", ANSWER)]).await;

        let response = app.upload("notes.txt", "text/plain", b"just text").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await, "INVALID_FILE");
        assert_eq!(app.state.jobs.len().await, 0);
        assert_eq!(app.files_in("uploads"), 0);
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let app = TestApp::new(vec![FakeProvider::replying("gemini", ANSWER)]).await;
        let limit = app.state.config.max_upload_bytes;

        let mut just_over = sample_pdf(&["Jane Doe"]);
        just_over.resize(limit + 1, b' ');
        let response = app.upload("cv.pdf", "application/pdf", &just_over).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(error_code(response).await, "INVALID_FILE");

        let way_over = vec![b'x'; limit * 2];
        let response = app.upload("cv.pdf", "application/pdf", &way_over).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(error_code(response).await, "INVALID_FILE");

        // Without a declared length the file is cut off while it is read.
        let mut request = multipart_request("file", "cv.pdf", "application/pdf", &just_over);
        request.headers_mut().remove(header::CONTENT_LENGTH);
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(error_code(response).await, "INVALID_FILE");

        assert_eq!(app.state.jobs.len().await, 0);
        assert_eq!(app.files_in("uploads"), 0);
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let app = TestApp::new(vec![FakeProvider::replying("gemini", ANSWER)]).await;
        let response = app
            .send(multipart_request("attachment", "cv.pdf", "application/pdf", b"%PDF-"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_corrupt_pdf_fails_job() {
        let app = TestApp::new(vec![FakeProvider::replying("gemini", ANSWER)]).await;

        let response = app
            .upload("cv.pdf", "application/pdf", b"%PDF-1.4\nthis is not really a pdf")
            .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_code(response).await, "EXTRACTION_ERROR");
        assert_eq!(app.state.jobs.len().await, 1);
    }

    #[tokio::test]
    async fn test_textless_pdf_is_empty_content() {
        let gemini = FakeProvider::replying("gemini", ANSWER);
        let app = TestApp::new(vec![gemini.clone()]).await;

        let response = app
            .upload("blank.pdf", "application/pdf", &sample_pdf(&[]))
            .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_code(response).await, "EMPTY_CONTENT");
        assert_eq!(gemini.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids_are_not_found() {
        let app = TestApp::new(vec![FakeProvider::replying("gemini", ANSWER)]).await;
        let unknown = crate::jobs::JobId::new();

        for uri in [
            format!("/api/v1/jobs/{unknown}"),
            format!("/api/v1/jobs/{unknown}/download"),
            "/api/v1/jobs/not-a-uuid".to_string(),
            "/api/v1/jobs/not-a-uuid/preview".to_string(),
        ] {
            let response = app.call(Method::GET, &uri).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(error_code(response).await, "NOT_FOUND");
        }

        let response = app
            .call(Method::POST, &format!("/api/v1/jobs/{unknown}/generate"))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_preview_keeps_job_and_delete_removes_it() {
        let app = TestApp::new(vec![FakeProvider::replying("gemini", ANSWER)]).await;
        let id = app.upload_resume().await.job_id;
        app.call(Method::POST, &format!("/api/v1/jobs/{id}/generate"))
            .await;

        let viewer = app.call(Method::GET, &format!("/api/v1/jobs/{id}/view")).await;
        assert_eq!(viewer.status(), StatusCode::OK);
        let viewer = String::from_utf8(body_bytes(viewer).await).unwrap();
        assert!(viewer.contains(&format!("src=\"/api/v1/jobs/{id}/preview\"")));
        assert!(viewer.contains(&format!("href=\"/api/v1/jobs/{id}/download\"")));

        let preview = app
            .call(Method::GET, &format!("/api/v1/jobs/{id}/preview"))
            .await;
        assert_eq!(preview.status(), StatusCode::OK);
        assert!(preview.headers().get(header::CONTENT_DISPOSITION).is_none());
        assert!(String::from_utf8(body_bytes(preview).await)
            .unwrap()
            .contains("<h1>Jane Doe</h1>"));
        assert_eq!(app.files_in("generated"), 1);

        let deleted = app.call(Method::DELETE, &format!("/api/v1/jobs/{id}")).await;
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
        assert_eq!(app.files_in("uploads"), 0);
        assert_eq!(app.files_in("generated"), 0);

        let again = app.call(Method::DELETE, &format!("/api/v1/jobs/{id}")).await;
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cleanup_endpoint_sweeps_stale_jobs() {
        let app = TestApp::new(vec![FakeProvider::replying("gemini", ANSWER)]).await;
        let stale = app.upload_resume().await.job_id;
        let fresh = app.upload_resume().await.job_id;
        let retention = chrono::Duration::from_std(app.state.config.job_retention).unwrap();
        app.state
            .jobs
            .backdate(stale, retention + chrono::Duration::seconds(1))
            .await;

        let response = app.call(Method::POST, "/api/v1/cleanup").await;

        assert_eq!(response.status(), StatusCode::OK);
        let value: Value = json(response).await;
        assert_eq!(value["removed"], 1);
        assert_eq!(value["active"], 1);
        assert!(app.state.jobs.get(stale).await.is_err());
        assert!(app.state.jobs.get(fresh).await.is_ok());
        assert_eq!(app.files_in("uploads"), 1);
    }

    #[tokio::test]
    async fn test_providers_endpoint_lists_chain() {
        let app = TestApp::new(vec![
            FakeProvider::replying("gemini", ANSWER),
            FakeProvider::replying("groq", ANSWER),
        ])
        .await;

        let value: Value = json(app.call(Method::GET, "/api/v1/providers").await).await;

        let providers = value["providers"].as_array().unwrap();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0]["name"], "gemini");
        assert_eq!(providers[0]["role"], "primary");
        assert_eq!(providers[1]["role"], "fallback");
        assert_eq!(providers[1]["model"], "groq-model");
    }
}
