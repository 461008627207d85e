//! アップロード時の撮影場所タグの決定

use std::path::Path;

use dialoguer::Input;

use crate::error::{Result, UploaderError};
use crate::scanner;

/// 場所が分からないときのタグ
pub const DEFAULT_LOCATION: &str = "Unknown";

/// 撮影場所を決める
///
/// `--location` > 対話入力（EXIF の GPS を初期値に） > GPS > "Unknown"
pub fn resolve_location(explicit: Option<&str>, image: &Path, interactive: bool) -> Result<String> {
    if let Some(location) = non_empty(explicit) {
        return Ok(location.to_string());
    }

    let suggestion = match scanner::extract_gps(image) {
        Ok(gps) => Some(gps),
        Err(e) => {
            tracing::debug!(path = %image.display(), error = %e, "no GPS in EXIF");
            None
        }
    };

    if !interactive {
        return Ok(fallback_location(suggestion));
    }
    prompt_location(suggestion)
}

fn prompt_location(suggestion: Option<String>) -> Result<String> {
    let input: String = Input::new()
        .with_prompt("撮影場所")
        .default(suggestion.unwrap_or_else(|| DEFAULT_LOCATION.to_string()))
        .interact_text()
        .map_err(|e| UploaderError::Prompt(e.to_string()))?;

    Ok(fallback_location(non_empty(Some(&input)).map(str::to_string)))
}

fn fallback_location(suggestion: Option<String>) -> String {
    suggestion.unwrap_or_else(|| DEFAULT_LOCATION.to_string())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
