//! APIレスポンスパーサー
//!
//! 推論サーバーの JSON レスポンスを共有型に変換する。
//! 任意フィールドは既定値で埋め、必須フィールドの欠落だけを `Error::Parse` にする。

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::{InferenceItem, UploadResponse, NONE_TEXT, UNKNOWN_LOCATION, UNKNOWN_TIME};

/// `get-inference-count` レスポンスをパース
///
/// # Examples
/// ```
/// use photo_uploader_common::parse_count_response;
///
/// assert_eq!(parse_count_response(r#"{"count": 3}"#).unwrap(), 3);
/// ```
pub fn parse_count_response(body: &str) -> Result<usize> {
    let root = parse_object(body)?;
    let count = root
        .get("count")
        .ok_or_else(|| Error::Parse("`count` がありません".into()))?;

    count
        .as_u64()
        .and_then(|c| usize::try_from(c).ok())
        .ok_or_else(|| Error::Parse(format!("`count` が0以上の整数ではありません: {}", count)))
}

/// `get-inference-batch` レスポンスをパース
///
/// `items` の各要素は `InferenceItem` に変換する。オブジェクト以外の要素はエラー。
pub fn parse_batch_response(body: &str) -> Result<Vec<InferenceItem>> {
    let root = parse_object(body)?;
    let items = root
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Parse("`items` 配列がありません".into()))?;

    items
        .iter()
        .enumerate()
        .map(|(index, value)| {
            value
                .as_object()
                .map(item_from_object)
                .ok_or_else(|| {
                    Error::Parse(format!("items[{}] がオブジェクトではありません", index))
                })
        })
        .collect()
}

/// `get-inference-item` レスポンスをパース
///
/// サーバーは詳細レスポンスから `_id` を除くので、空なら `requested_id` で補う。
pub fn parse_item_response(body: &str, requested_id: &str) -> Result<InferenceItem> {
    let root = parse_object(body)?;
    let object = root
        .get("item")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::Parse("`item` オブジェクトがありません".into()))?;

    let mut item = item_from_object(object);
    if item.id.is_empty() {
        item.id = requested_id.to_string();
    }
    Ok(item)
}

/// `upload` 成功レスポンスをパース
pub fn parse_upload_response(body: &str) -> Result<UploadResponse> {
    let root = parse_object(body)?;
    let message = root
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Parse("`message` がありません".into()))?;

    Ok(UploadResponse {
        message: message.to_string(),
        location: root.get("location").and_then(Value::as_str).map(str::to_string),
        document_id: root.get("document_id").and_then(Value::as_str).map(str::to_string),
    })
}

/// エラーレスポンスからメッセージを取り出す
///
/// `{"error": "..."}` 形式なら `error` の値、それ以外は `None`。
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// JSON オブジェクト1件を InferenceItem に変換
pub fn item_from_object(object: &Map<String, Value>) -> InferenceItem {
    let id = text_field(object, "_id")
        .or_else(|| text_field(object, "id"))
        .unwrap_or_default();

    // 処理済み画像を優先し、無ければ元画像
    let image = text_field(object, "image")
        .filter(|s| !s.is_empty())
        .or_else(|| text_field(object, "imageData").filter(|s| !s.is_empty()));

    InferenceItem {
        id,
        location: text_field(object, "location").unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
        detected_objects: object
            .get("detected_objects")
            .and_then(render_detected_objects)
            .unwrap_or_else(|| NONE_TEXT.to_string()),
        summary: object
            .get("summary")
            .and_then(render_summary)
            .unwrap_or_else(|| NONE_TEXT.to_string()),
        image,
        upload_time: text_field(object, "upload_time").unwrap_or_else(|| UNKNOWN_TIME.to_string()),
        processed: object.get("processed").and_then(Value::as_bool),
    }
}

fn parse_object(body: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::Parse(format!("JSONパースエラー: {}", e)))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::Parse(format!(
            "JSONオブジェクトではありません: {}",
            type_name(&other)
        ))),
    }
}

/// 文字列または数値のフィールドを文字列で取り出す
fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `[[label, confidence], ...]` を "label (91%), ..." / "label (0.91), ..." に整形
fn render_detected_objects(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(entries) => {
            let rendered: Vec<String> = entries
                .iter()
                .map(|entry| match entry {
                    Value::Array(pair) => match (pair.first(), pair.get(1)) {
                        (Some(Value::String(label)), Some(Value::Number(conf))) => {
                            format!("{} ({})", label, render_confidence(conf))
                        }
                        (Some(Value::String(label)), _) => label.clone(),
                        _ => entry.to_string(),
                    },
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            if rendered.is_empty() {
                None
            } else {
                Some(rendered.join(", "))
            }
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// 整数は百分率、小数は0-1の確信度として表示
fn render_confidence(conf: &serde_json::Number) -> String {
    match (conf.as_i64(), conf.as_f64()) {
        (Some(percent), _) => format!("{}%", percent),
        (None, Some(c)) => format!("{:.2}", c),
        (None, None) => conf.to_string(),
    }
}

/// `{"Garbage": 2, ...}` を "Garbage: 2, ..." に整形
fn render_summary(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            if map.is_empty() {
                return None;
            }
            let rendered: Vec<String> = map
                .iter()
                .map(|(name, count)| match count {
                    Value::String(s) => format!("{}: {}", name, s),
                    other => format!("{}: {}", name, other),
                })
                .collect();
            Some(rendered.join(", "))
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
