//! 表示用の整形

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Local, TimeZone};
use photo_uploader_common::InferenceItem;

use crate::error::{Result, UploaderError};

/// 一覧の1行
pub fn list_line(item: &InferenceItem) -> String {
    format!(
        "Location: {} / Uploaded: {}",
        item.location,
        format_upload_time(&item.upload_time)
    )
}

/// 詳細画面のテキスト
pub fn detail_text(item: &InferenceItem) -> String {
    format!(
        "Location: {}\nDetected Objects: {}\nSummary: {}",
        item.location, item.detected_objects, item.summary
    )
}

/// UNIX秒ならローカル時刻に、それ以外はそのまま返す
pub fn format_upload_time(raw: &str) -> String {
    format_unix_seconds(raw, &Local).unwrap_or_else(|| raw.to_string())
}

fn format_unix_seconds<Tz>(raw: &str, tz: &Tz) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let seconds: f64 = raw.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    let whole = seconds.trunc() as i64;
    let nanos = (seconds.fract() * 1e9) as u32;
    let utc = DateTime::from_timestamp(whole, nanos)?;
    Some(utc.with_timezone(tz).format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Data URL から Base64 部分を取り出す
pub fn extract_base64_from_data_url(data: &str) -> &str {
    if data.starts_with("data:") {
        data.split_once(',').map(|(_, b64)| b64).unwrap_or(data)
    } else {
        data
    }
}

/// アイテムの画像をデコード。画像が無ければ `None`
pub fn decode_image(item: &InferenceItem) -> Result<Option<Vec<u8>>> {
    let Some(encoded) = item.image.as_deref() else {
        return Ok(None);
    };

    // 改行入りの Base64 も受け付ける
    let cleaned: String = extract_base64_from_data_url(encoded)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    STANDARD
        .decode(cleaned)
        .map(Some)
        .map_err(|e| UploaderError::ImageLoad(format!("Base64デコード失敗: {}", e)))
}
