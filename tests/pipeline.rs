//! Integration tests for the request → parse → analyse → export path.
//!
//! No pdfium library and no network access are needed: pages are supplied
//! pre-rendered, the model is either a scripted client or a one-shot local
//! HTTP stub standing in for the Messages API.

use edgequake_statement::{
    export_records, extract_from_pages, resolve_client, Completion, DropReason, ExportFormat,
    ExtractionClient, ExtractionConfig, ExtractionProgressCallback, ExtractionRequest, PageImage,
    RecordFilter, ResolvedClient, StatementError, COLUMNS,
};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const STATEMENT_REPLY: &str = "\
Here is the table you asked for:

| Date | Concept | Amount (MXN) | Type |
|------|---------|--------------|------|
| 01/11/2024 | RENTA DEPTO CHAPULTEPEC | 12,500.00 | Expense |
| 05/11/2024 | NOMINA QUINCENA | 31,000.50 | Income |
| 07/11/2024 | SUPER | 1,234.50 | Expense |
| 08/11/2024 | cargo sin tipo | 99.00 |
| 15/11/2024 | NOMINA QUINCENA | 31,000.50 | Income |
";

// ── Helpers ──────────────────────────────────────────────────────────────────

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

fn pages(n: usize) -> Vec<PageImage> {
    (1..=n)
        .map(|page_num| PageImage {
            page_num,
            png: format!("png-{page_num}").into_bytes(),
        })
        .collect()
}

/// Replies with a fixed text and records every request.
struct ScriptedClient {
    reply: String,
    requests: Mutex<Vec<ExtractionRequest>>,
}

impl ScriptedClient {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl ExtractionClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ExtractionRequest) -> Result<Completion, StatementError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(Completion {
            text: self.reply.clone(),
            input_tokens: 1500,
            output_tokens: 200,
        })
    }
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl ExtractionProgressCallback for RecordingProgress {
    fn on_request_start(&self, images: usize) {
        self.events.lock().unwrap().push(format!("request:{images}"));
    }
    fn on_request_complete(&self, reply_len: usize, _duration_ms: u64) {
        self.events.lock().unwrap().push(format!("reply:{reply_len}"));
    }
    fn on_parse_complete(&self, records: usize, dropped: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("parsed:{records}/{dropped}"));
    }
}

/// Serve exactly one HTTP response on a random local port. The handle
/// resolves to the raw request text.
async fn one_shot_server(status: u16, extra_headers: &str, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let response = format!(
        "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n{extra_headers}\r\n{body}",
        body.len()
    );

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        request
    });
    (base_url, handle)
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 16 * 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn anthropic_config(base_url: &str) -> ExtractionConfig {
    ExtractionConfig::builder()
        .api_key("sk-ant-test-key")
        .api_base_url(base_url)
        .api_timeout_secs(10)
        .build()
        .unwrap()
}

// ── Scripted client ──────────────────────────────────────────────────────────

#[tokio::test]
async fn statement_reply_to_records_summary_and_export() {
    init_logging();
    let client = ScriptedClient::new(STATEMENT_REPLY);
    let config = ExtractionConfig::default();

    let output = extract_from_pages(&pages(4), 6, &config, &client)
        .await
        .unwrap();

    let requests = client.requests.lock().unwrap();
    assert_eq!(requests.len(), 1, "one request per statement");
    assert_eq!(requests[0].images.len(), 4);
    drop(requests);

    assert_eq!(output.records.len(), 4);
    let first = &output.records.records()[0];
    assert_eq!(first.concept, "RENTA DEPTO CHAPULTEPEC");
    assert_eq!(first.amount, 12500.0);

    let malformed: Vec<_> = output
        .dropped
        .iter()
        .filter(|d| d.reason == DropReason::WrongCellCount(3))
        .collect();
    assert_eq!(malformed.len(), 1);
    assert!(malformed[0].text.contains("cargo sin tipo"));

    let summary = output.records.summary();
    assert_eq!(summary.total_income, 62001.0);
    assert_eq!(summary.total_expense, 13734.5);
    assert_eq!(summary.balance, 62001.0 - 13734.5);

    assert_eq!(
        output.records.category_counts(),
        vec![("Expense".to_string(), 2), ("Income".to_string(), 2)]
    );

    let expenses = output
        .records
        .filter(&RecordFilter::all().with_categories(["Expense"]));
    assert_eq!(expenses.len(), 2);

    let csv = export_records(expenses.records(), ExportFormat::Csv).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert_eq!(csv.lines().next().unwrap(), COLUMNS.join(","));

    assert_eq!(output.stats.total_pages, 6);
    assert_eq!(output.stats.sent_pages, 4);
    assert_eq!(output.stats.input_tokens, 1500);
    assert_eq!(output.raw_reply, STATEMENT_REPLY);
}

#[tokio::test]
async fn progress_events_follow_pipeline_order() {
    let progress = Arc::new(RecordingProgress::default());
    let config = ExtractionConfig::builder()
        .progress_callback(progress.clone() as Arc<dyn ExtractionProgressCallback>)
        .build()
        .unwrap();
    let client = ScriptedClient::new(STATEMENT_REPLY);

    extract_from_pages(&pages(2), 2, &config, &client)
        .await
        .unwrap();

    let events = progress.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "request:2".to_string(),
            format!("reply:{}", STATEMENT_REPLY.len()),
            "parsed:4/2".to_string(),
        ]
    );
}

#[tokio::test]
async fn bad_amount_fails_whole_extraction() {
    let client = ScriptedClient::new(
        "| Date | Concept | Amount (MXN) | Type |\n| 01/11/2024 | RENTA | N/A | Expense |",
    );
    let err = extract_from_pages(&pages(1), 1, &ExtractionConfig::default(), &client)
        .await
        .unwrap_err();
    match err {
        StatementError::AmountParseError { value, .. } => assert_eq!(value, "N/A"),
        other => panic!("expected AmountParseError, got {other:?}"),
    }
}

#[test]
fn blocking_callers_can_drive_the_pipeline() {
    let client = ScriptedClient::new("| Date | Concept | Amount (MXN) | Type |\n|---|---|---|---|");
    let output = tokio_test::block_on(extract_from_pages(
        &pages(1),
        1,
        &ExtractionConfig::default(),
        &client,
    ))
    .unwrap();
    assert!(output.records.is_empty());
    assert!(output.header_found);
}

// ── Anthropic client against a local stub ────────────────────────────────────

#[tokio::test]
async fn anthropic_client_sends_one_messages_request() {
    init_logging();
    let reply = serde_json::json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": STATEMENT_REPLY}],
        "usage": {"input_tokens": 3210, "output_tokens": 180}
    })
    .to_string();
    let (base_url, server) = one_shot_server(200, "", &reply).await;

    let config = anthropic_config(&base_url);
    let client = resolve_client(&config).unwrap();
    assert!(matches!(client, ResolvedClient::Anthropic(_)));

    let output = extract_from_pages(&pages(2), 5, &config, &client)
        .await
        .unwrap();
    assert_eq!(output.records.len(), 4);
    assert_eq!(output.stats.input_tokens, 3210);
    assert_eq!(output.stats.output_tokens, 180);

    let raw = server.await.unwrap();
    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let head = head.to_lowercase();
    assert!(head.starts_with("post /v1/messages "));
    assert!(head.contains("x-api-key: sk-ant-test-key"));
    assert!(head.contains("anthropic-version: 2023-06-01"));

    let body: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(body["model"], "claude-3-5-sonnet-20241022");
    assert_eq!(body["max_tokens"], 4000);
    assert_eq!(body["temperature"], 0.0);
    assert_eq!(body["system"], "You are a PDF bank statement analyzer.");
    let content = body["messages"][0]["content"].as_array().unwrap();
    assert_eq!(content.len(), 3);
    assert_eq!(content[0]["type"], "text");
    assert_eq!(content[1]["source"]["media_type"], "image/png");
    assert_eq!(content[1]["source"]["data"], "cG5nLTE=");
}

#[tokio::test]
async fn anthropic_unauthorized_is_auth_error() {
    let body = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
    let (base_url, server) = one_shot_server(401, "", body).await;
    let config = anthropic_config(&base_url);
    let client = resolve_client(&config).unwrap();

    let err = extract_from_pages(&pages(1), 1, &config, &client)
        .await
        .unwrap_err();
    server.await.unwrap();
    match err {
        StatementError::AuthError { detail, .. } => assert_eq!(detail, "invalid x-api-key"),
        other => panic!("expected AuthError, got {other:?}"),
    }
}

#[tokio::test]
async fn anthropic_rate_limit_carries_retry_after() {
    let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#;
    let (base_url, server) = one_shot_server(429, "retry-after: 30\r\n", body).await;
    let config = anthropic_config(&base_url);
    let client = resolve_client(&config).unwrap();

    let err = extract_from_pages(&pages(1), 1, &config, &client)
        .await
        .unwrap_err();
    server.await.unwrap();
    assert!(matches!(
        err,
        StatementError::RateLimitExceeded {
            retry_after_secs: Some(30),
            ..
        }
    ));
}

#[tokio::test]
async fn anthropic_server_error_is_not_retried() {
    let (base_url, server) = one_shot_server(529, "", r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#).await;
    let config = anthropic_config(&base_url);
    let client = resolve_client(&config).unwrap();

    let err = extract_from_pages(&pages(1), 1, &config, &client)
        .await
        .unwrap_err();
    // The stub accepts a single connection; a retry would hang or be refused.
    server.await.unwrap();
    match err {
        StatementError::LlmApiError { message } => {
            assert!(message.contains("529"), "{message}");
            assert!(message.contains("Overloaded"), "{message}");
        }
        other => panic!("expected LlmApiError, got {other:?}"),
    }
}
