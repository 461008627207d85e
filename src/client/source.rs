use async_trait::async_trait;
use photo_uploader_common::InferenceItem;

use super::InferenceClient;
use crate::error::Result;

/// BatchPager が使う一覧取得の窓口
#[async_trait]
pub trait InferenceSource: Send + Sync {
    async fn get_count(&self) -> Result<usize>;

    async fn get_batch(&self, start: usize, limit: usize) -> Result<Vec<InferenceItem>>;
}

#[async_trait]
impl InferenceSource for InferenceClient {
    async fn get_count(&self) -> Result<usize> {
        InferenceClient::get_count(self).await
    }

    async fn get_batch(&self, start: usize, limit: usize) -> Result<Vec<InferenceItem>> {
        InferenceClient::get_batch(self, start, limit).await
    }
}
