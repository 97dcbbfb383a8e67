//! Token proxy and router clients against a local HTTP server with canned responses.

use futures::StreamExt;
use inferoxy_chat::models::ChatRequest;
use inferoxy_chat::{
    ChatMessage, ChatResponder, ClientConfig, ErrorKind, GenerationParams, HttpTokenProxy,
    HuggingFaceFactory, InferenceConfig, ModelError, Provider, ProviderFactory, ProviderId,
    ProxyConfig, StreamingResponse, TokenProxy, TokenReport,
};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Serve `responses` to consecutive connections; resolves to the raw requests.
async fn serve(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
        requests
    });
    (format!("http://{}", addr), handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

fn sse(events: &[&str]) -> String {
    let body: String = events.iter().map(|e| format!("data: {}\n\n", e)).collect();
    response("200 OK", "text/event-stream", &body)
}

fn body_json(request: &str) -> serde_json::Value {
    let (_, body) = request.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}

fn chat_request() -> ChatRequest {
    ChatRequest::new(
        "org/model",
        vec![ChatMessage::system("sys"), ChatMessage::user("hello")],
        GenerationParams::default(),
    )
}

async fn open(api_base: &str) -> Result<StreamingResponse, ModelError> {
    let factory = HuggingFaceFactory::new(&InferenceConfig {
        api_base: api_base.to_string(),
    });
    let provider = factory.create(&ProviderId::auto(), "hf_wire").unwrap();
    provider.chat_stream(&chat_request()).await
}

fn expect_error(opened: Result<StreamingResponse, ModelError>) -> ModelError {
    match opened {
        Ok(_) => panic!("stream opened, expected an error"),
        Err(e) => e,
    }
}

fn proxy(url: &str) -> HttpTokenProxy {
    HttpTokenProxy::new(&ProxyConfig {
        url: url.to_string(),
        api_key: None,
    })
    .unwrap()
}

const TOKEN_BODY: &str = r#"{"token":"hf_wire","token_id":"tok-42"}"#;

#[tokio::test]
async fn router_streams_chunks_until_done() {
    let (base, server) = serve(vec![sse(&[
        r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"Hi"}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":" there"}}]}"#,
        "[DONE]",
        r#"{"choices":[{"index":0,"delta":{"content":"after done"}}]}"#,
    ])])
    .await;

    let chunks: Vec<_> = open(&base).await.unwrap().collect().await;
    let contents: Vec<String> = chunks
        .iter()
        .map(|c| c.as_ref().unwrap().content().unwrap_or_default().to_string())
        .collect();
    assert_eq!(contents, vec!["", "Hi", " there"]);

    let requests = server.await.unwrap();
    let request = &requests[0];
    assert!(request.starts_with("POST /chat/completions "));
    assert!(request.to_ascii_lowercase().contains("authorization: bearer hf_wire"));
    let body = body_json(request);
    assert_eq!(body["stream"], true);
    assert_eq!(body["model"], "org/model");
    assert_eq!(body["messages"][1]["content"], "hello");
}

#[tokio::test]
async fn router_stream_without_done_ends_at_eof() {
    let (base, _server) =
        serve(vec![sse(&[r#"{"choices":[{"delta":{"content":"only"}}]}"#])]).await;

    let chunks: Vec<_> = open(&base).await.unwrap().collect().await;
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].as_ref().unwrap().content(), Some("only"));
}

#[tokio::test]
async fn router_rate_limit_maps_to_rate_limited() {
    let (base, _server) = serve(vec![response(
        "429 Too Many Requests",
        "application/json",
        r#"{"error":"rate limit reached"}"#,
    )])
    .await;

    let err = expect_error(open(&base).await);
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(err.status_code(), Some(StatusCode::TOO_MANY_REQUESTS));
    assert!(err.to_string().contains("rate limit reached"));
    assert!(err.user_message().contains("Rate Limited"));
}

#[tokio::test]
async fn router_wrong_content_type_is_api_error() {
    let (base, _server) = serve(vec![response(
        "200 OK",
        "application/json",
        r#"{"message":"not a stream"}"#,
    )])
    .await;

    let err = expect_error(open(&base).await);
    assert_eq!(err.kind(), ErrorKind::Api);
    assert!(err.to_string().contains("not a stream"));
}

#[tokio::test]
async fn router_in_band_error_fails_stream() {
    let (base, _server) = serve(vec![sse(&[
        r#"{"choices":[{"delta":{"content":"par"}}]}"#,
        r#"{"error":"Model is overloaded","error_type":"overloaded"}"#,
    ])])
    .await;

    let chunks: Vec<_> = open(&base).await.unwrap().collect().await;
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].is_ok());
    assert!(matches!(&chunks[1], Err(ModelError::Provider(msg)) if msg == "Model is overloaded"));
}

#[tokio::test]
async fn proxy_acquire_parses_token() {
    let (base, server) = serve(vec![response("200 OK", "application/json", TOKEN_BODY)]).await;

    let token = tokio_test::assert_ok!(proxy(&base).acquire("proxy-key").await);
    assert_eq!(token.token, "hf_wire");
    assert_eq!(token.token_id, "tok-42");

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("GET /keys/provision/hf "));
    assert!(requests[0].to_ascii_lowercase().contains("authorization: bearer proxy-key"));
}

#[tokio::test]
async fn proxy_server_error_is_proxy_status() {
    let (base, _server) = serve(vec![response(
        "500 Internal Server Error",
        "text/plain",
        "no tokens available",
    )])
    .await;

    let err = tokio_test::assert_err!(proxy(&base).acquire("proxy-key").await);
    assert!(matches!(
        &err,
        ModelError::Proxy(status, body)
            if *status == StatusCode::INTERNAL_SERVER_ERROR && body == "no tokens available"
    ));
    assert_eq!(err.kind(), ErrorKind::Unexpected);
}

#[tokio::test]
async fn proxy_report_posts_json_body() {
    let (base, server) = serve(vec![response("200 OK", "application/json", "{}")]).await;

    let report = TokenReport::error("tok-42", "boom", ErrorKind::QuotaExceeded);
    tokio_test::assert_ok!(proxy(&base).report(&report, "proxy-key").await);

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("POST /keys/report/hf "));
    assert_eq!(
        body_json(&requests[0]),
        serde_json::json!({
            "token_id": "tok-42",
            "status": "error",
            "error": "boom",
            "error_type": "credits_exceeded",
        })
    );
}

fn wired_responder(proxy_url: &str, router_url: &str) -> ChatResponder {
    let mut config = ClientConfig::default();
    config.proxy.url = proxy_url.to_string();
    config.proxy.api_key = Some("proxy-key".to_string());
    config.inference.api_base = router_url.to_string();
    let proxy = std::sync::Arc::new(HttpTokenProxy::new(&config.proxy).unwrap());
    let providers = std::sync::Arc::new(HuggingFaceFactory::new(&config.inference));
    ChatResponder::new(config, proxy, providers)
}

fn wired_turn() -> inferoxy_chat::ChatTurn {
    inferoxy_chat::ChatTurn {
        message: "hello".to_string(),
        history: Vec::new(),
        system_message: "sys".to_string(),
        model_name: "org/model:together".to_string(),
        params: GenerationParams::default(),
    }
}

#[tokio::test]
async fn turn_over_http_reports_success() {
    let (proxy_url, proxy_server) = serve(vec![
        response("200 OK", "application/json", TOKEN_BODY),
        response("200 OK", "application/json", "{}"),
    ])
    .await;
    let (router_url, router_server) = serve(vec![sse(&[
        r#"{"choices":[{"delta":{"content":"Hi"}}]}"#,
        r#"{"choices":[{"delta":{"content":" there"}}]}"#,
        "[DONE]",
    ])])
    .await;

    let out: Vec<String> = wired_responder(&proxy_url, &router_url)
        .respond(wired_turn())
        .collect()
        .await;
    assert_eq!(out, vec!["Hi".to_string(), "Hi there".to_string()]);

    let router_requests = router_server.await.unwrap();
    assert_eq!(body_json(&router_requests[0])["model"], "org/model:together");

    let proxy_requests = proxy_server.await.unwrap();
    assert_eq!(proxy_requests.len(), 2);
    assert_eq!(
        body_json(&proxy_requests[1]),
        serde_json::json!({"token_id": "tok-42", "status": "success"})
    );
}

#[tokio::test]
async fn in_band_error_over_http_reports_error() {
    let (proxy_url, proxy_server) = serve(vec![
        response("200 OK", "application/json", TOKEN_BODY),
        response("200 OK", "application/json", "{}"),
    ])
    .await;
    let (router_url, _router_server) = serve(vec![sse(&[
        r#"{"error":"Model is overloaded","error_type":"overloaded"}"#,
    ])])
    .await;

    let out: Vec<String> = wired_responder(&proxy_url, &router_url)
        .respond(wired_turn())
        .collect()
        .await;
    assert_eq!(out.len(), 1);
    assert!(out[0].contains("Unexpected Error"));
    assert!(out[0].contains("Model is overloaded"));

    let proxy_requests = proxy_server.await.unwrap();
    assert_eq!(proxy_requests.len(), 2);
    let report = body_json(&proxy_requests[1]);
    assert_eq!(report["token_id"], "tok-42");
    assert_eq!(report["status"], "error");
    assert_eq!(report["error_type"], "other");
    assert!(report["error"].as_str().unwrap().contains("Model is overloaded"));
}
