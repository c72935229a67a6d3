//! The OpenRouter client against a canned local HTTP server.

use evidence_ingest::llm::{ChatMessage, ChatRequest, ImageData, ModelClient};
use evidence_ingest::{LlmError, OpenRouterClient};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// One request as the server saw it: head (request line + headers) and body.
#[derive(Debug, Default, Clone)]
struct Seen {
    head: String,
    body: String,
}

/// Serve exactly one request with `status` and `body`, recording what came in.
async fn serve_once(status: u16, body: &'static str) -> (String, Arc<Mutex<Seen>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Seen::default()));
    let record = seen.clone();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        // Read until the end of headers, then the declared body length.
        let (head_end, content_length) = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_string();
                let len = head
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                break (pos + 4, len);
            }
            if n == 0 {
                break (buf.len(), 0);
            }
        };
        while buf.len() < head_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        *record.lock().unwrap() = Seen {
            head: String::from_utf8_lossy(&buf[..head_end]).to_string(),
            body: String::from_utf8_lossy(&buf[head_end..]).to_string(),
        };

        let reason = if status == 200 { "OK" } else { "Error" };
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });

    (format!("http://{addr}/api/v1"), seen)
}

fn request() -> ChatRequest {
    ChatRequest::new("anthropic/claude-haiku-4.5")
        .message(ChatMessage::system("Return JSON."))
        .message(ChatMessage::user("Letter text"))
        .temperature(0.2)
        .max_tokens(2000)
}

#[tokio::test]
async fn chat_success_parses_text_and_usage() {
    let (base, seen) = serve_once(
        200,
        r#"{"id":"gen-1","model":"anthropic/claude-haiku-4.5",
            "choices":[{"index":0,"message":{"role":"assistant","content":"{\"dates\":[]}"}}],
            "usage":{"prompt_tokens":42,"completion_tokens":7}}"#,
    )
    .await;
    let client = OpenRouterClient::new("test-key").with_base_url(format!("{base}/"));

    let completion = client.chat(&request()).await.unwrap();
    assert_eq!(completion.text, r#"{"dates":[]}"#);
    assert_eq!(completion.usage.prompt_tokens, 42);
    assert_eq!(completion.usage.completion_tokens, 7);

    let seen = seen.lock().unwrap().clone();
    assert!(seen.head.starts_with("POST /api/v1/chat/completions"), "{}", seen.head);
    let head = seen.head.to_ascii_lowercase();
    assert!(head.contains("authorization: bearer test-key"));
    assert!(head.contains("x-title: evidence-ingest"));
    assert!(head.contains("http-referer:"));

    let body: serde_json::Value = serde_json::from_str(&seen.body).unwrap();
    assert_eq!(body["model"], "anthropic/claude-haiku-4.5");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "Letter text");
    assert_eq!(body["max_tokens"], 2000);
}

#[tokio::test]
async fn vision_request_sends_image_parts() {
    let (base, seen) = serve_once(
        200,
        r#"{"id":"gen-2","model":"openai/gpt-4o",
            "choices":[{"index":0,"message":{"role":"assistant","content":"Dear Sir"}}]}"#,
    )
    .await;
    let client = OpenRouterClient::new("k").with_base_url(base);
    let image = ImageData::new("AAAA", "image/png").with_detail("high");
    let req = ChatRequest::new("openai/gpt-4o")
        .message(ChatMessage::user_with_images("Transcribe", vec![image]));

    let completion = client.chat(&req).await.unwrap();
    assert_eq!(completion.text, "Dear Sir");
    assert_eq!(completion.usage.prompt_tokens, 0);

    let body: serde_json::Value = serde_json::from_str(&seen.lock().unwrap().body).unwrap();
    let parts = body["messages"][0]["content"].as_array().unwrap();
    assert_eq!(parts[0]["type"], "text");
    assert_eq!(parts[1]["type"], "image_url");
    assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    assert_eq!(parts[1]["image_url"]["detail"], "high");
    assert_eq!(body["model"], "openai/gpt-4o");
}

#[tokio::test]
async fn rejected_key_is_upstream_401() {
    let (base, _) = serve_once(401, r#"{"error":{"message":"invalid key","code":401}}"#).await;
    let client = OpenRouterClient::new("k").with_base_url(base);

    let err = client.chat(&request()).await.unwrap_err();
    assert_eq!(err.status(), Some(401), "{err:?}");
}

#[tokio::test]
async fn server_error_is_upstream_with_status_and_body() {
    let (base, _) = serve_once(500, r#"{"error":{"message":"provider overloaded"}}"#).await;
    let client = OpenRouterClient::new("k").with_base_url(base);

    let err = client
        .embed("openai/text-embedding-3-large", "some text")
        .await
        .unwrap_err();
    match &err {
        LlmError::Upstream { status, body } => {
            assert_eq!(*status, 500);
            assert!(body.contains("provider overloaded"));
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn embedding_success_returns_vector() {
    let (base, seen) = serve_once(200, r#"{"data":[{"embedding":[0.5,-0.25,1.0]}]}"#).await;
    let client = OpenRouterClient::new("k").with_base_url(base);

    let vector = client.embed("openai/text-embedding-3-small", "hello").await.unwrap();
    assert_eq!(vector, vec![0.5, -0.25, 1.0]);
    assert!(seen.lock().unwrap().head.starts_with("POST /api/v1/embeddings"));
}

#[tokio::test]
async fn non_json_embedding_keeps_raw_body() {
    let (base, _) = serve_once(200, "<html>gateway</html>").await;
    let client = OpenRouterClient::new("k").with_base_url(base);

    let err = client.embed("m", "x").await.unwrap_err();
    match err {
        LlmError::MalformedResponse { raw, .. } => assert_eq!(raw, "<html>gateway</html>"),
        other => panic!("expected MalformedResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn non_json_success_is_malformed() {
    let (base, _) = serve_once(200, "<html>gateway</html>").await;
    let client = OpenRouterClient::new("k").with_base_url(base);

    let err = client.chat(&request()).await.unwrap_err();
    assert!(matches!(err, LlmError::MalformedResponse { .. }), "{err:?}");
}

#[tokio::test]
async fn unreachable_endpoint_is_network_error() {
    // Bind then drop to get a port nothing listens on. The provider retries
    // connection failures with backoff before giving up.
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let client = OpenRouterClient::new("k").with_base_url(format!("http://127.0.0.1:{port}"));

    let err = client.chat(&request()).await.unwrap_err();
    assert!(matches!(err, LlmError::Network(_)), "{err:?}");
}
