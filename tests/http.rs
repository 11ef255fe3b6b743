//! HTTP API tests: mount the router on an ephemeral port and exercise the
//! endpoints with a real client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cortexqa::config::Config;
use cortexqa::corpus::CorpusManager;
use cortexqa::server::app;
use serde_json::Value;

const DOC: &str = "The Amazon river discharges more water than any other river on earth. \
    Its basin covers roughly forty percent of South America. \
    Seasonal flooding raises water levels by up to nine metres.";

async fn spawn_server() -> String {
    spawn_server_with(Config::builtin()).await
}

async fn spawn_server_with(config: Config) -> String {
    let manager = Arc::new(CorpusManager::new(Arc::new(config)));
    let app = app(manager);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Uploads a plain-text document and returns its corpus handle.
async fn upload_text(client: &reqwest::Client, base: &str, text: &str) -> String {
    let resp = client
        .post(format!("{}/documents", base))
        .header("content-type", "text/plain")
        .header("x-document-name", "doc.txt")
        .body(text.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "pending");
    body["corpus_handle"].as_str().unwrap().to_string()
}

/// Polls the status endpoint until the corpus settles.
async fn wait_ready(client: &reqwest::Client, base: &str, handle: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let body: Value = client
            .get(format!("{}/documents/{}/status", base, handle))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        match body["status"].as_str().unwrap() {
            "ready" => return,
            "failed" => panic!("ingestion failed: {}", body["reason"]),
            _ if Instant::now() > deadline => panic!("timed out waiting for ready"),
            _ => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let base = spawn_server().await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].as_str().is_some());
}

#[tokio::test]
async fn upload_ask_answer_flow() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let handle = upload_text(&client, &base, DOC).await;
    wait_ready(&client, &base, &handle).await;

    let resp = client
        .post(format!("{}/documents/{}/questions", base, handle))
        .json(&serde_json::json!({ "question": "How much does seasonal flooding raise water levels?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["no_evidence"], false);
    let answer = body["answer"].as_str().unwrap();
    assert!(answer.contains("flooding"));
    let citations = body["citations"].as_array().unwrap();
    assert!(!citations.is_empty());
    for c in citations {
        assert!(c["passage_id"].as_str().is_some());
        assert!(c["page"].as_u64().is_some());
        assert!(!c["excerpt"].as_str().unwrap().is_empty());
    }
}

#[tokio::test]
async fn unrelated_question_returns_no_evidence_not_error() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let handle = upload_text(&client, &base, DOC).await;
    wait_ready(&client, &base, &handle).await;

    let resp = client
        .post(format!("{}/documents/{}/questions", base, handle))
        .json(&serde_json::json!({ "question": "Explain quantum chromodynamics lattice gauge theory" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["no_evidence"], true);
    assert!(body["answer"].is_null());
    assert_eq!(body["citations"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let handle = upload_text(&client, &base, DOC).await;
    wait_ready(&client, &base, &handle).await;

    let body: Value = client
        .delete(format!("{}/documents/{}", base, handle))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["evicted"], true);

    let body: Value = client
        .delete(format!("{}/documents/{}", base, handle))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["evicted"], false);

    // Status on the evicted corpus is now a 404
    let resp = client
        .get(format!("{}/documents/{}/status", base, handle))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn unknown_handle_is_not_found() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!(
            "{}/documents/00000000-0000-0000-0000-000000000000/questions",
            base
        ))
        .json(&serde_json::json!({ "question": "anything" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    // A malformed handle is also a 404, not a 500
    let resp = client
        .get(format!("{}/documents/not-a-uuid/status", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn mismatched_signature_is_rejected_up_front() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    // Declared PDF, but the bytes carry no PDF signature
    let resp = client
        .post(format!("{}/documents", base))
        .header("content-type", "application/pdf")
        .body("just plain text, not a pdf")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "format_mismatch");
}

#[tokio::test]
async fn oversized_document_gets_too_large_envelope() {
    let mut config = Config::builtin();
    config.document.max_bytes = 1024;
    let base = spawn_server_with(config).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/documents", base))
        .header("content-type", "text/plain")
        .body("x".repeat(2048))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "too_large");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("1024 byte limit"));
}

#[tokio::test]
async fn unsupported_media_type_is_rejected() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/documents", base))
        .header("content-type", "image/png")
        .body(vec![0x89u8, 0x50, 0x4e, 0x47])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unsupported_media_type");
}

#[tokio::test]
async fn empty_question_is_a_bad_request() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let handle = upload_text(&client, &base, DOC).await;
    wait_ready(&client, &base, &handle).await;

    let resp = client
        .post(format!("{}/documents/{}/questions", base, handle))
        .json(&serde_json::json!({ "question": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn corrupt_pdf_fails_via_status() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    // Valid signature so intake accepts it; the parser then fails
    let resp = client
        .post(format!("{}/documents", base))
        .header("content-type", "application/pdf")
        .body("%PDF-1.4 truncated garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let handle = body["corpus_handle"].as_str().unwrap().to_string();

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let body: Value = client
            .get(format!("{}/documents/{}/status", base, handle))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        match body["status"].as_str().unwrap() {
            "failed" => {
                assert!(body["reason"].as_str().is_some());
                break;
            }
            "ready" => panic!("corrupt document should not index"),
            _ if Instant::now() > deadline => panic!("timed out waiting for failure"),
            _ => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }

    // Asking against a failed corpus is a conflict
    let resp = client
        .post(format!("{}/documents/{}/questions", base, handle))
        .json(&serde_json::json!({ "question": "anything" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "conflict");
}
