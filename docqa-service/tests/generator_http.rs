use docqa_service::{AnswerGenerator, GenerationError, GenerationParams, HttpGenerator};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serve exactly one request with a canned response; yields the request body.
async fn one_shot_server(
    status_line: &'static str,
    body: &'static str,
) -> anyhow::Result<(String, JoinHandle<anyhow::Result<String>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = format!("http://{}", listener.local_addr()?);
    let handle = tokio::spawn(serve_once(listener, status_line, body));
    Ok((endpoint, handle))
}

async fn serve_once(
    listener: TcpListener,
    status_line: &'static str,
    body: &'static str,
) -> anyhow::Result<String> {
    let (mut socket, _) = listener.accept().await?;

    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    let body_start = loop {
        let n = socket.read(&mut buf).await?;
        anyhow::ensure!(n > 0, "connection closed before headers");
        request.extend_from_slice(&buf[..n]);
        if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&request[..body_start]).to_lowercase();
    let content_length = match headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
    {
        Some(value) => value.trim().parse::<usize>()?,
        None => 0,
    };
    while request.len() < body_start + content_length {
        let n = socket.read(&mut buf).await?;
        anyhow::ensure!(n > 0, "connection closed before body");
        request.extend_from_slice(&buf[..n]);
    }

    let response = format!(
        "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\
         connection: close\r\n\r\n{body}",
        body.len()
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await?;

    Ok(String::from_utf8(request[body_start..].to_vec())?)
}

#[tokio::test]
async fn test_posts_prompt_and_reads_response() -> anyhow::Result<()> {
    let (endpoint, server) = one_shot_server(
        "HTTP/1.1 200 OK",
        r#"{"model":"falcon:7b-instruct","response":"  Twenty five years.\n","done":true}"#,
    )
    .await?;

    let generator = HttpGenerator::new(format!("{endpoint}/"), "falcon:7b-instruct");
    let answer = generator
        .generate(
            "How long do panels last?",
            "Panels last twenty five years.",
            &GenerationParams::default(),
        )
        .await?;
    assert_eq!(answer, "Twenty five years.");

    let body: serde_json::Value = serde_json::from_str(&server.await??)?;
    assert_eq!(body["model"], "falcon:7b-instruct");
    assert_eq!(body["stream"], false);
    assert_eq!(body["options"]["num_predict"], 200);
    assert_eq!(body["options"]["temperature"], 0.0);

    let prompt = body["prompt"].as_str().unwrap_or_default();
    assert!(prompt.contains("Panels last twenty five years."));
    assert!(prompt.contains("Question: How long do panels last?"));
    Ok(())
}

#[tokio::test]
async fn test_rate_limit_is_exhaustion() -> anyhow::Result<()> {
    let (endpoint, server) =
        one_shot_server("HTTP/1.1 429 Too Many Requests", r#"{"error":"slow down"}"#).await?;

    let result = HttpGenerator::new(endpoint, "m")
        .generate("q", "ctx", &GenerationParams::default())
        .await;
    assert!(matches!(result, Err(GenerationError::Exhausted(_))));
    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_server_error_is_backend_failure() -> anyhow::Result<()> {
    let (endpoint, server) = one_shot_server(
        "HTTP/1.1 500 Internal Server Error",
        r#"{"error":"model not loaded"}"#,
    )
    .await?;

    let result = HttpGenerator::new(endpoint, "m")
        .generate("q", "ctx", &GenerationParams::default())
        .await;
    match result {
        Err(GenerationError::Backend(message)) => assert!(message.contains("model not loaded")),
        other => panic!("expected backend error, got {other:?}"),
    }
    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_unreachable_endpoint_is_request_error() {
    let result = HttpGenerator::new("http://127.0.0.1:9", "m")
        .generate("q", "ctx", &GenerationParams::default())
        .await;
    assert!(matches!(result, Err(GenerationError::Request(_))));
}

#[tokio::test]
async fn test_blank_response_is_backend_failure() -> anyhow::Result<()> {
    let (endpoint, server) = one_shot_server(
        "HTTP/1.1 200 OK",
        r#"{"model":"m","response":"   \n","done":true}"#,
    )
    .await?;

    let result = HttpGenerator::new(endpoint, "m")
        .generate("q", "ctx", &GenerationParams::default())
        .await;
    match result {
        Err(GenerationError::Backend(message)) => assert_eq!(message, "empty response"),
        other => panic!("expected backend error, got {other:?}"),
    }
    server.await??;
    Ok(())
}
