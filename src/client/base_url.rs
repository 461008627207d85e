use std::fmt;

use crate::error::{Result, UploaderError};

/// 末尾に `/` をちょうど1つ持つサーバーのベースURL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl(String);

impl BaseUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(UploaderError::InvalidUrl("空のURL".into()));
        }

        let parsed = url::Url::parse(trimmed)
            .map_err(|e| UploaderError::InvalidUrl(format!("{}: {}", trimmed, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(UploaderError::InvalidUrl(format!(
                "{}: http/https 以外のスキーム ({})",
                trimmed,
                parsed.scheme()
            )));
        }

        Ok(Self(format!("{}/", trimmed.trim_end_matches('/'))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// エンドポイントの完全URL
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.0, path.trim_start_matches('/'))
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
