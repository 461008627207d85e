//! 共有型定義
//!
//! - UploadRequest: アップロード1回分の入力
//! - InferenceItem: サーバーが返す推論結果1件
//! - UploadResponse: アップロード成功時のレスポンス

use serde::{Deserialize, Serialize};

/// `location` が無いときの表示値
pub const UNKNOWN_LOCATION: &str = "Unknown Location";
/// `upload_time` が無いときの表示値
pub const UNKNOWN_TIME: &str = "Unknown Time";
/// `detected_objects` / `summary` が無いときの表示値
pub const NONE_TEXT: &str = "None";

/// アップロード時のファイル名（サーバー側はこの名前を前提にしている）
pub const UPLOAD_FILE_NAME: &str = "image.jpg";
/// アップロード時のMIMEタイプ
pub const UPLOAD_MIME_TYPE: &str = "image/jpeg";

/// multipart のファイルパート
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

/// アップロード要求
///
/// 作成後は変更しない。レスポンスを受け取ったら破棄する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    image_bytes: Vec<u8>,
    location_tag: String,
    filename: String,
}

impl UploadRequest {
    pub fn new(image_bytes: Vec<u8>, location_tag: impl Into<String>) -> Self {
        Self::with_filename(image_bytes, location_tag, UPLOAD_FILE_NAME)
    }

    pub fn with_filename(
        image_bytes: Vec<u8>,
        location_tag: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            image_bytes,
            location_tag: location_tag.into(),
            filename: filename.into(),
        }
    }

    pub fn image_bytes(&self) -> &[u8] {
        &self.image_bytes
    }

    pub fn location_tag(&self) -> &str {
        &self.location_tag
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// multipart のファイルパートに変換
    pub fn file_part(&self) -> FilePart {
        FilePart {
            bytes: self.image_bytes.clone(),
            filename: self.filename.clone(),
            mime_type: UPLOAD_MIME_TYPE.to_string(),
        }
    }
}

/// 推論結果1件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceItem {
    /// サーバー採番のID（`_id`）
    pub id: String,
    pub location: String,
    /// 検出物体（表示用に整形済み）
    pub detected_objects: String,
    /// 集計サマリ（表示用に整形済み）
    pub summary: String,
    /// Base64画像（処理済み画像、無ければ元画像）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub upload_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed: Option<bool>,
}

impl Default for InferenceItem {
    fn default() -> Self {
        Self {
            id: String::new(),
            location: UNKNOWN_LOCATION.to_string(),
            detected_objects: NONE_TEXT.to_string(),
            summary: NONE_TEXT.to_string(),
            image: None,
            upload_time: UNKNOWN_TIME.to_string(),
            processed: None,
        }
    }
}

/// アップロード成功レスポンス
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
}
