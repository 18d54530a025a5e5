//! HTTP/JSON API server.
//!
//! Simple HTTP server using tokio and basic request handling, exposing the
//! ingestion entry point and the read-only query surface.

use crate::config::Config;
use crate::error::CsvqlError;
use crate::ingest::{IngestMode, IngestionOrchestrator};
use crate::query::{QueryService, DEFAULT_PREVIEW_LIMIT};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

/// Shared server state: the ingestion entry point and the query facade.
pub struct AppState {
    pub orchestrator: IngestionOrchestrator,
    pub query: QueryService,
    pub debug: bool,
}

#[derive(Deserialize)]
struct IngestRequest {
    file_path: String,
    table_name: String,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Deserialize)]
struct QueryRequest {
    sql: String,
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: &Config, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "server listening");
    println!("[OK] Server listening on http://{}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        if state.debug {
            println!("[INFO] New connection from: {}", peer);
        }
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            handle_connection(stream, state).await;
        });
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>) {
    use tokio::time::{timeout, Duration};

    let mut buffer = Vec::new();
    let mut temp_buf = [0u8; 8192];

    // Read the request with a timeout so a stalled client cannot hang the task.
    let read_result = timeout(Duration::from_secs(5), async {
        loop {
            match stream.read(&mut temp_buf).await {
                Ok(0) => break,
                Ok(n) => {
                    buffer.extend_from_slice(&temp_buf[..n]);
                    if let Ok(s) = std::str::from_utf8(&buffer) {
                        if let Some(headers_end) = s.find("\r\n\r\n") {
                            match extract_content_length(s) {
                                Some(content_length) => {
                                    if buffer.len() >= headers_end + 4 + content_length {
                                        break;
                                    }
                                }
                                None => break,
                            }
                        }
                    }
                    if buffer.len() > 1_000_000 {
                        break;
                    }
                }
                Err(e) => {
                    error!("failed to read from stream: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(())
    })
    .await;

    if read_result.is_err() {
        warn!("request read timeout");
        return;
    }

    if buffer.is_empty() {
        return;
    }

    let request = match String::from_utf8(buffer) {
        Ok(r) => r,
        Err(e) => {
            error!("request is not valid UTF-8: {}", e);
            return;
        }
    };

    let response = handle_request(&request, &state).await;
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        error!("failed to write response: {}", e);
    }
}

fn extract_content_length(request: &str) -> Option<usize> {
    for line in request.lines() {
        if line.to_lowercase().starts_with("content-length:") {
            if let Some(value) = line.split(':').nth(1) {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

async fn handle_request(request: &str, state: &AppState) -> String {
    let request_line = match request.lines().next() {
        Some(l) => l,
        None => return create_response(400, "Bad Request", "{}"),
    };

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return create_response(400, "Bad Request", "{}");
    }

    let method = parts[0];
    let full_path = parts[1];

    let (path_str, query_string) = match full_path.find('?') {
        Some(idx) => (&full_path[..idx], Some(&full_path[idx + 1..])),
        None => (full_path, None),
    };

    let mut path = path_str.trim_end_matches('/');
    if path.is_empty() {
        path = "/";
    }

    if state.debug {
        println!("[DEBUG] Request: {} {}", method, path);
    }

    let body = request
        .split_once("\r\n\r\n")
        .map(|(_, b)| b)
        .unwrap_or("");

    match (method, path) {
        ("GET", "/") => create_response(
            200,
            "OK",
            &serde_json::json!({
                "message": "CSV ingestion and query API",
                "version": env!("CARGO_PKG_VERSION"),
                "endpoints": {
                    "tables": "/api/tables",
                    "preview": "/api/tables/{name}",
                    "ingest": "POST /api/ingest",
                    "query": "POST /api/query"
                },
                "status": "running"
            })
            .to_string(),
        ),
        ("GET", "/health") => {
            create_response(200, "OK", &serde_json::json!({"status": "healthy"}).to_string())
        }
        ("GET", "/api/tables") => handle_list_tables(state).await,
        ("GET", p) if p.starts_with("/api/tables/") => {
            let table = &p["/api/tables/".len()..];
            let limit = parse_query_param(query_string, "limit")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(DEFAULT_PREVIEW_LIMIT);
            handle_preview(state, table, limit).await
        }
        ("POST", "/api/ingest") => handle_ingest(state, body).await,
        ("POST", "/api/query") => handle_query(state, body).await,
        _ => create_response(
            404,
            "Not Found",
            &serde_json::json!({"error": "not found"}).to_string(),
        ),
    }
}

fn parse_query_param<'a>(query_string: Option<&'a str>, key: &str) -> Option<&'a str> {
    query_string?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

async fn handle_list_tables(state: &AppState) -> String {
    match state.query.list_tables().await {
        Ok(tables) => match serde_json::to_string(&serde_json::json!({ "tables": tables })) {
            Ok(body) => create_response(200, "OK", &body),
            Err(e) => error_response(500, &e.to_string()),
        },
        Err(e) => error_response(500, &e.to_string()),
    }
}

async fn handle_preview(state: &AppState, table: &str, limit: usize) -> String {
    match state.query.preview(table, limit).await {
        Ok(preview) => match serde_json::to_string(&preview) {
            Ok(body) => create_response(200, "OK", &body),
            Err(e) => error_response(500, &e.to_string()),
        },
        Err(e @ CsvqlError::Store(_)) => error_response(404, &e.to_string()),
        Err(e) => error_response(500, &e.to_string()),
    }
}

async fn handle_ingest(state: &AppState, body: &str) -> String {
    let req: IngestRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return error_response(400, &format!("invalid request body: {}", e)),
    };

    let mode = match req.mode.as_deref() {
        Some("replace") => IngestMode::Replace,
        Some("append") | Some("default") | None => IngestMode::Append,
        Some(other) => {
            return error_response(400, &format!("unknown mode '{}'", other));
        }
    };

    let result = state
        .orchestrator
        .ingest(&PathBuf::from(&req.file_path), &req.table_name, mode)
        .await;

    let status = if result.success { 200 } else { 422 };
    let status_text = if result.success { "OK" } else { "Unprocessable Entity" };
    match serde_json::to_string(&result) {
        Ok(body) => create_response(status, status_text, &body),
        Err(e) => error_response(500, &e.to_string()),
    }
}

async fn handle_query(state: &AppState, body: &str) -> String {
    let req: QueryRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return error_response(400, &format!("invalid request body: {}", e)),
    };

    match state.query.run_query(&req.sql).await {
        Ok(rows) => match serde_json::to_string(&rows) {
            Ok(body) => create_response(200, "OK", &body),
            Err(e) => error_response(500, &e.to_string()),
        },
        Err(e @ CsvqlError::Query(_)) => error_response(400, &e.to_string()),
        Err(e) => error_response(500, &e.to_string()),
    }
}

fn error_response(status: u16, message: &str) -> String {
    let status_text = match status {
        400 => "Bad Request",
        404 => "Not Found",
        422 => "Unprocessable Entity",
        _ => "Internal Server Error",
    };
    create_response(
        status,
        status_text,
        &serde_json::json!({ "error": message }).to_string(),
    )
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nAccess-Control-Allow-Origin: *\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_extraction() {
        let req = "POST /api/query HTTP/1.1\r\nContent-Length: 42\r\n\r\n";
        assert_eq!(extract_content_length(req), Some(42));
        assert_eq!(extract_content_length("GET / HTTP/1.1\r\n\r\n"), None);
    }

    #[test]
    fn query_param_parsing() {
        assert_eq!(parse_query_param(Some("limit=25&x=1"), "limit"), Some("25"));
        assert_eq!(parse_query_param(Some("x=1"), "limit"), None);
        assert_eq!(parse_query_param(None, "limit"), None);
    }
}
