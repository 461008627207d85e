use crate::error::{Result, UploaderError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// サーバーURLを上書きする環境変数
pub const SERVER_URL_ENV: &str = "PHOTO_UPLOADER_SERVER_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_url: Option<String>,
    pub batch_size: usize,
    pub request_timeout_seconds: u64,
    pub upload_timeout_seconds: u64,
    pub upload_retries: u32,
    pub max_image_size: u32,
    pub jpeg_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: None,
            batch_size: 10,
            request_timeout_seconds: 30,
            upload_timeout_seconds: 60,
            upload_retries: 2,
            max_image_size: 800,
            jpeg_quality: 70,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// 足りないキーは既定値で補う
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        if config.batch_size == 0 {
            return Err(UploaderError::Config("batch_size は1以上にしてください".into()));
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| UploaderError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("photo-uploader").join("config.json"))
    }

    /// サーバーURLを解決する（引数 > 環境変数 > 設定ファイル）
    pub fn resolve_server_url(&self, cli_override: Option<&str>) -> Result<String> {
        let env_value = std::env::var(SERVER_URL_ENV).ok();
        pick_server_url(cli_override, env_value.as_deref(), self.server_url.as_deref())
    }

    pub fn set_server_url(&mut self, url: String) -> Result<()> {
        self.server_url = Some(url);
        self.save()
    }
}

fn pick_server_url(
    cli_override: Option<&str>,
    env_value: Option<&str>,
    configured: Option<&str>,
) -> Result<String> {
    [cli_override, env_value, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(UploaderError::MissingServerUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.upload_timeout_seconds, 60);
        assert_eq!(config.upload_retries, 2);
        assert_eq!(config.max_image_size, 800);
        assert_eq!(config.jpeg_quality, 70);
        assert!(config.server_url.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_json(r#"{"server_url": "http://10.0.2.2:5000"}"#).unwrap();
        assert_eq!(config.server_url.as_deref(), Some("http://10.0.2.2:5000"));
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = Config::from_json(r#"{"batch_size": 0}"#);
        assert!(matches!(result, Err(UploaderError::Config(_))));
    }

    #[test]
    fn test_server_url_priority() {
        let url =
            pick_server_url(Some("http://cli"), Some("http://env"), Some("http://file")).unwrap();
        assert_eq!(url, "http://cli");

        let url = pick_server_url(None, Some("http://env"), Some("http://file")).unwrap();
        assert_eq!(url, "http://env");

        let url = pick_server_url(Some("  "), None, Some("http://file")).unwrap();
        assert_eq!(url, "http://file");
    }

    #[test]
    fn test_server_url_missing() {
        let result = pick_server_url(None, None, None);
        assert!(matches!(result, Err(UploaderError::MissingServerUrl)));
    }
}
