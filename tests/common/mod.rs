//! テスト用のHTTPスタブサーバー
//!
//! 受け取ったリクエストを記録し、ハンドラが返したJSONを `Connection: close` で返す。
//! 先頭N本の接続に対しては応答せずに切断（または待たせる）こともできる。

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use photo_uploader::client::BaseUrl;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        let path = self.target.split('?').next().unwrap_or("");
        path.trim_start_matches('/')
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        let (_, query) = self.target.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub body: String,
}

impl StubResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// 最初の数本の接続をどう壊すか
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// リクエストを読んだ後、応答せずに切断
    Drop,
    /// リクエストを読んだ後、応答せずに待たせる
    Hang(Duration),
    /// ヘッダは返すが、本文の途中で切断
    TruncateBody,
}

type Handler = Arc<dyn Fn(&RecordedRequest) -> StubResponse + Send + Sync>;

pub struct StubServer {
    base_url: BaseUrl,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: JoinHandle<()>,
}

impl StubServer {
    /// パスごとに固定の応答を返す。未登録のパスは404
    pub async fn with_routes(routes: &[(&str, StubResponse)]) -> Self {
        Self::start_with(routes_handler(routes), None).await
    }

    /// 先頭 `count` 本の接続に `fault` を起こしてから固定応答を返す
    pub async fn with_faults(routes: &[(&str, StubResponse)], fault: Fault, count: usize) -> Self {
        Self::start_with(routes_handler(routes), Some((fault, count))).await
    }

    pub async fn start<F>(handler: F, faults: Option<(Fault, usize)>) -> Self
    where
        F: Fn(&RecordedRequest) -> StubResponse + Send + Sync + 'static,
    {
        Self::start_with(Arc::new(handler), faults).await
    }

    async fn start_with(handler: Handler, faults: Option<(Fault, usize)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub server");
        let addr = listener.local_addr().expect("stub server address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let accepted = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let index = accepted.fetch_add(1, Ordering::SeqCst);
                let fault = faults.and_then(|(fault, count)| (index < count).then_some(fault));
                let handler = Arc::clone(&handler);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(handle_connection(stream, handler, recorded, fault));
            }
        });

        Self {
            base_url: BaseUrl::parse(&format!("http://{}", addr)).expect("stub base url"),
            requests,
            task,
        }
    }

    pub fn base_url(&self) -> BaseUrl {
        self.base_url.clone()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.path() == path).collect()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn routes_handler(routes: &[(&str, StubResponse)]) -> Handler {
    let routes: Vec<(String, StubResponse)> = routes
        .iter()
        .map(|(path, response)| (path.to_string(), response.clone()))
        .collect();

    Arc::new(move |request: &RecordedRequest| {
        routes
            .iter()
            .find(|(path, _)| path == request.path())
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| StubResponse::json(404, r#"{"error":"not found"}"#))
    })
}

async fn handle_connection(
    mut stream: TcpStream,
    handler: Handler,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
    fault: Option<Fault>,
) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    let response = (*handler)(&request);
    recorded.lock().unwrap().push(request);

    match fault {
        Some(Fault::Drop) => return,
        Some(Fault::Hang(duration)) => {
            tokio::time::sleep(duration).await;
            return;
        }
        Some(Fault::TruncateBody) | None => {}
    }

    // 本文を切る場合は実際より長い Content-Length を名乗る
    let announced_len = match fault {
        Some(Fault::TruncateBody) => response.body.len() + 64,
        _ => response.body.len(),
    };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\
         Connection: close\r\n\r\n",
        response.status,
        reason_phrase(response.status),
        announced_len
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(response.body.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(key, _)| key == "content-length")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Some(RecordedRequest {
        method,
        target,
        headers,
        body,
    })
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
