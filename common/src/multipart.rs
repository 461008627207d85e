//! multipart/form-data エンコーダ
//!
//! ファイル1つ + テキストフィールドN個を次の順で並べる:
//!
//! ```text
//! --{boundary}\r\n
//! Content-Disposition: form-data; name="file"; filename="{filename}"\r\n
//! Content-Type: {mime}\r\n\r\n
//! {bytes}\r\n
//! --{boundary}\r\n
//! Content-Disposition: form-data; name="{name}"\r\n
//! Content-Type: text/plain\r\n\r\n
//! {value}\r\n
//! --{boundary}--\r\n
//! ```

use std::path::Path;

use uuid::Uuid;

use crate::error::Result;
use crate::types::FilePart;

const LINE_END: &str = "\r\n";
const TWO_HYPHENS: &str = "--";
const BOUNDARY_PREFIX: &str = "apiclient-";

/// エンコード済みのリクエストボディ
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// `Content-Type` ヘッダ値
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

/// multipart ボディを組み立てる
#[derive(Debug, Default, Clone, Copy)]
pub struct MultipartEncoder;

impl MultipartEncoder {
    pub fn new() -> Self {
        Self
    }

    /// ファイルパートとテキストフィールドからボディを生成
    ///
    /// 呼び出しごとに新しい boundary を生成する。フィールド値やファイル内容に
    /// 偶然含まれていた場合は作り直す。filename / mime_type の検証はしない。
    pub fn encode(&self, file: &FilePart, fields: &[(&str, &str)]) -> MultipartBody {
        let boundary = loop {
            let candidate = generate_boundary();
            if !collides(&candidate, file, fields) {
                break candidate;
            }
        };

        let mut bytes = Vec::with_capacity(file.bytes.len() + 256 * (fields.len() + 1));

        let file_header = format!(
            "{TWO_HYPHENS}{boundary}{LINE_END}\
             Content-Disposition: form-data; name=\"file\"; filename=\"{}\"{LINE_END}\
             Content-Type: {}{LINE_END}{LINE_END}",
            file.filename, file.mime_type
        );
        bytes.extend_from_slice(file_header.as_bytes());
        bytes.extend_from_slice(&file.bytes);
        bytes.extend_from_slice(LINE_END.as_bytes());

        for (name, value) in fields {
            let field_header = format!(
                "{TWO_HYPHENS}{boundary}{LINE_END}\
                 Content-Disposition: form-data; name=\"{name}\"{LINE_END}\
                 Content-Type: text/plain{LINE_END}{LINE_END}"
            );
            bytes.extend_from_slice(field_header.as_bytes());
            bytes.extend_from_slice(value.as_bytes());
            bytes.extend_from_slice(LINE_END.as_bytes());
        }

        let footer = format!("{TWO_HYPHENS}{boundary}{TWO_HYPHENS}{LINE_END}");
        bytes.extend_from_slice(footer.as_bytes());

        MultipartBody { boundary, bytes }
    }

    /// ディスク上のファイルを読み込んでエンコード
    ///
    /// 読み込めない場合のみ `Error::Io`。0バイトのファイルはそのまま送る。
    pub fn encode_path(
        &self,
        path: &Path,
        filename: &str,
        mime_type: &str,
        fields: &[(&str, &str)],
    ) -> Result<MultipartBody> {
        let file = FilePart {
            bytes: std::fs::read(path)?,
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
        };
        Ok(self.encode(&file, fields))
    }
}

fn generate_boundary() -> String {
    format!("{}{}", BOUNDARY_PREFIX, Uuid::new_v4())
}

fn collides(boundary: &str, file: &FilePart, fields: &[(&str, &str)]) -> bool {
    let needle = boundary.as_bytes();
    fields.iter().any(|(_, value)| value.contains(boundary))
        || file.bytes.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::convert::Infallible;

    fn jpeg_part(bytes: &[u8]) -> FilePart {
        FilePart {
            bytes: bytes.to_vec(),
            filename: "image.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
        }
    }

    /// multer でパースして (name, filename, content_type, data) を返す
    async fn parse(body: &MultipartBody) -> Vec<(String, Option<String>, Option<String>, Vec<u8>)> {
        let data = Bytes::from(body.bytes().to_vec());
        let stream = futures_util::stream::once(async move { Ok::<_, Infallible>(data) });
        let mut multipart = multer::Multipart::new(stream, body.boundary());

        let mut parts = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(|m| m.to_string());
            let data = field.bytes().await.unwrap().to_vec();
            parts.push((name, filename, content_type, data));
        }
        parts
    }

    #[test]
    fn test_exact_layout() {
        let body = MultipartEncoder::new().encode(&jpeg_part(b"JPEG"), &[("location", "Paris")]);
        let b = body.boundary();

        let expected = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"image.jpg\"\r\n\
             Content-Type: image/jpeg\r\n\r\n\
             JPEG\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"location\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             Paris\r\n\
             --{b}--\r\n"
        );
        assert_eq!(body.bytes(), expected.as_bytes());
    }

    #[test]
    fn test_content_type_header() {
        let body = MultipartEncoder::new().encode(&jpeg_part(b"x"), &[]);
        assert!(body.boundary().starts_with("apiclient-"));
        assert_eq!(
            body.content_type(),
            format!("multipart/form-data; boundary={}", body.boundary())
        );
    }

    #[test]
    fn test_boundary_differs_per_call() {
        let encoder = MultipartEncoder::new();
        let a = encoder.encode(&jpeg_part(b"x"), &[]);
        let b = encoder.encode(&jpeg_part(b"x"), &[]);
        assert_ne!(a.boundary(), b.boundary());
    }

    #[test]
    fn test_collision_detection() {
        let part = jpeg_part(b"..apiclient-1234..");
        assert!(collides("apiclient-1234", &part, &[]));
        assert!(collides("apiclient-9", &jpeg_part(b""), &[("location", "apiclient-9")]));
        assert!(!collides("apiclient-9", &jpeg_part(b"abc"), &[("location", "Paris")]));
    }

    #[tokio::test]
    async fn test_parser_recovers_binary_file_and_field() {
        // CR/LF やハイフンを含むバイナリ
        let image: Vec<u8> = (0u8..=255).chain(b"\r\n--\r\n".iter().copied()).collect();
        let body = MultipartEncoder::new().encode(&jpeg_part(&image), &[("location", "東京都 新宿区")]);

        let parts = parse(&body).await;
        assert_eq!(parts.len(), 2);

        let (name, filename, content_type, data) = &parts[0];
        assert_eq!(name, "file");
        assert_eq!(filename.as_deref(), Some("image.jpg"));
        assert_eq!(content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(data, &image);

        let (name, filename, _, data) = &parts[1];
        assert_eq!(name, "location");
        assert!(filename.is_none());
        assert_eq!(String::from_utf8(data.clone()).unwrap(), "東京都 新宿区");
    }

    #[tokio::test]
    async fn test_empty_file_is_valid() {
        let body = MultipartEncoder::new().encode(&jpeg_part(b""), &[("location", "")]);
        let parts = parse(&body).await;
        assert_eq!(parts.len(), 2);
        assert!(parts[0].3.is_empty());
        assert!(parts[1].3.is_empty());
    }

    #[tokio::test]
    async fn test_fields_keep_order() {
        let fields = [("location", "Paris"), ("note", "night"), ("camera", "rear")];
        let body = MultipartEncoder::new().encode(&jpeg_part(b"x"), &fields);
        let names: Vec<String> = parse(&body).await.into_iter().map(|p| p.0).collect();
        assert_eq!(names, vec!["file", "location", "note", "camera"]);
    }

    #[test]
    fn test_encode_path_missing_file() {
        let result = MultipartEncoder::new().encode_path(
            Path::new("/nonexistent/photo-uploader/image.jpg"),
            "image.jpg",
            "image/jpeg",
            &[],
        );
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }
}
