//! Photo Uploader Common Library
//!
//! CLI と推論サーバー通信で共有される型・multipart エンコーダ・レスポンスパーサー

pub mod types;
pub mod multipart;
pub mod error;
pub mod parser;

pub use types::{FilePart, InferenceItem, UploadRequest, UploadResponse};
pub use multipart::{MultipartBody, MultipartEncoder};
pub use error::{Error, Result};
pub use parser::{
    extract_error_message, item_from_object, parse_batch_response, parse_count_response,
    parse_item_response, parse_upload_response,
};
