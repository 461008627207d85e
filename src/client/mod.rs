//! 推論サーバーAPIクライアント
//!
//! - GET  get-inference-count
//! - GET  get-inference-batch?start=&limit=
//! - GET  get-inference-item?id=
//! - POST upload (multipart: file + location)
//!
//! アップロードはメモリ上のバイト列（`upload`）かファイル（`upload_file`）から送る。

mod base_url;
mod source;

pub use base_url::BaseUrl;
pub use source::InferenceSource;

use std::path::Path;
use std::time::Duration;

use photo_uploader_common::types::{UPLOAD_FILE_NAME, UPLOAD_MIME_TYPE};
use photo_uploader_common::{
    extract_error_message, parse_batch_response, parse_count_response, parse_item_response,
    parse_upload_response, InferenceItem, MultipartBody, MultipartEncoder, UploadRequest,
    UploadResponse,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, StatusCode};

use crate::config::Config;
use crate::error::{Result, UploaderError};

pub const COUNT_PATH: &str = "get-inference-count";
pub const BATCH_PATH: &str = "get-inference-batch";
pub const ITEM_PATH: &str = "get-inference-item";
pub const UPLOAD_PATH: &str = "upload";

/// 通信設定
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// GET系リクエストのタイムアウト
    pub request_timeout: Duration,
    /// アップロード1回あたりのタイムアウト
    pub upload_timeout: Duration,
    /// 応答を受け取れなかった場合の再送回数
    pub upload_retries: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ClientOptions {
    fn from(config: &Config) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
            upload_timeout: Duration::from_secs(config.upload_timeout_seconds),
            upload_retries: config.upload_retries,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    base_url: BaseUrl,
    options: ClientOptions,
    encoder: MultipartEncoder,
}

impl InferenceClient {
    pub fn new(base_url: BaseUrl, options: ClientOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            options,
            encoder: MultipartEncoder::new(),
        })
    }

    pub fn base_url(&self) -> &BaseUrl {
        &self.base_url
    }

    /// 登録件数を取得
    pub async fn get_count(&self) -> Result<usize> {
        let request = self.http.get(self.base_url.endpoint(COUNT_PATH));
        let (status, body) = send_checked(request).await?;

        let count = parse_count_response(&body).map_err(|e| protocol_error(status, &body, e))?;
        tracing::debug!(count, "inference count");
        Ok(count)
    }

    /// `start` から最大 `limit` 件を取得
    ///
    /// 残りが `limit` より少なければ少ない件数を返す（エラーではない）。
    pub async fn get_batch(&self, start: usize, limit: usize) -> Result<Vec<InferenceItem>> {
        if limit == 0 {
            return Err(UploaderError::Config("limit は1以上にしてください".into()));
        }

        let request = self
            .http
            .get(self.base_url.endpoint(BATCH_PATH))
            .query(&[("start", start), ("limit", limit)]);
        let (status, body) = send_checked(request).await?;

        let items = parse_batch_response(&body).map_err(|e| protocol_error(status, &body, e))?;
        tracing::debug!(start, limit, received = items.len(), "inference batch");
        Ok(items)
    }

    /// 1件を画像込みで取得
    pub async fn get_item(&self, id: &str) -> Result<InferenceItem> {
        let request = self
            .http
            .get(self.base_url.endpoint(ITEM_PATH))
            .query(&[("id", id)]);
        let (status, body) = send(request).await?;

        if status == StatusCode::NOT_FOUND {
            return Err(UploaderError::NotFound(id.to_string()));
        }
        ensure_success(status, &body)?;

        parse_item_response(&body, id).map_err(|e| protocol_error(status, &body, e))
    }

    /// 画像をアップロード
    ///
    /// 応答が得られなかった場合（通信失敗・タイムアウト）だけ `upload_retries` 回まで再送する。
    /// サーバーが応答を返した場合はステータスに関わらず再送しない。
    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadResponse> {
        let multipart = self
            .encoder
            .encode(&request.file_part(), &[("location", request.location_tag())]);
        self.post_upload(multipart, request.location_tag()).await
    }

    /// ディスク上のファイルを加工せずにアップロード
    ///
    /// 読み込めない場合は送信せずに `Common(Io)` を返す。再送の条件は `upload` と同じ。
    pub async fn upload_file(&self, path: &Path, location_tag: &str) -> Result<UploadResponse> {
        let multipart = self.encoder.encode_path(
            path,
            UPLOAD_FILE_NAME,
            UPLOAD_MIME_TYPE,
            &[("location", location_tag)],
        )?;
        self.post_upload(multipart, location_tag).await
    }

    async fn post_upload(
        &self,
        multipart: MultipartBody,
        location_tag: &str,
    ) -> Result<UploadResponse> {
        let url = self.base_url.endpoint(UPLOAD_PATH);
        let content_type = multipart.content_type();
        let payload = multipart.into_bytes();
        let payload_len = payload.len();

        let max_attempts = self.options.upload_retries + 1;
        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let result = self
                .http
                .post(&url)
                .timeout(self.options.upload_timeout)
                .header(CONTENT_TYPE, content_type.as_str())
                .body(payload.clone())
                .send()
                .await;

            match result {
                Ok(response) => break response,
                Err(err) if attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %err,
                        "upload attempt failed, retrying"
                    );
                }
                Err(err) => {
                    return Err(UploaderError::Network {
                        status: err.status().map(|s| s.as_u16()),
                        message: format!("{} ({}回試行)", err, attempt),
                    });
                }
            }
        };

        // ヘッダ受信後はサーバーが処理済みの可能性があるので、本文の受信失敗は再送しない
        let (status, body) = read_body(response).await?;
        ensure_success(status, &body)?;

        let uploaded = parse_upload_response(&body).map_err(|e| protocol_error(status, &body, e))?;
        tracing::info!(
            bytes = payload_len,
            location = location_tag,
            attempts = attempt,
            "upload finished"
        );
        Ok(uploaded)
    }
}

async fn send(request: RequestBuilder) -> Result<(StatusCode, String)> {
    let response = request.send().await?;
    read_body(response).await
}

async fn send_checked(request: RequestBuilder) -> Result<(StatusCode, String)> {
    let (status, body) = send(request).await?;
    ensure_success(status, &body)?;
    Ok((status, body))
}

async fn read_body(response: reqwest::Response) -> Result<(StatusCode, String)> {
    let status = response.status();
    let body = response.text().await.map_err(|e| UploaderError::Network {
        status: Some(status.as_u16()),
        message: e.to_string(),
    })?;
    Ok((status, body))
}

/// 非2xxを Network エラーに変換（メッセージは error フィールド > 本文 > 理由句）
fn ensure_success(status: StatusCode, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }

    let message = extract_error_message(body)
        .or_else(|| Some(body.trim().to_string()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

    tracing::debug!(status = status.as_u16(), %message, "server returned error");
    Err(UploaderError::Network {
        status: Some(status.as_u16()),
        message,
    })
}

fn protocol_error(
    status: StatusCode,
    body: &str,
    err: photo_uploader_common::Error,
) -> UploaderError {
    UploaderError::Protocol {
        status: status.as_u16(),
        message: err.to_string(),
        body: body.to_string(),
    }
}
