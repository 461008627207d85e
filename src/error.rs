use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploaderError {
    /// 通信失敗・タイムアウト・サーバーのエラー応答
    #[error("通信エラー{}: {message}", .status.map(|s| format!(" (Status: {})", s)).unwrap_or_default())]
    Network { status: Option<u16>, message: String },

    /// 成功応答だがJSONの形が想定外
    #[error("レスポンス形式エラー (Status: {status}): {message}; body: {body}")]
    Protocol { status: u16, message: String, body: String },

    #[error("アイテムが見つかりません: {0}")]
    NotFound(String),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("サーバーURLが設定されていません。`photo-uploader config --set-server-url URL` か --server で指定してください")]
    MissingServerUrl,

    #[error("サーバーURLが不正: {0}")]
    InvalidUrl(String),

    #[error("画像読み込みエラー: {0}")]
    ImageLoad(String),

    #[error("入力エラー: {0}")]
    Prompt(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] photo_uploader_common::Error),
}

impl UploaderError {
    /// エラー応答のHTTPステータス（受信できた場合のみ）
    pub fn status(&self) -> Option<u16> {
        match self {
            UploaderError::Network { status, .. } => *status,
            UploaderError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UploaderError {
    fn from(err: reqwest::Error) -> Self {
        UploaderError::Network {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, UploaderError>;
