//! 一覧のバッチ取得
//!
//! count → batch(0) → batch(B) → ... の順に1件ずつ待ちながら取得し、
//! バッチごとに呼び出し元へ渡す。
//!
//! 取得セッションごとに番号を振り、古いセッションの結果は捨てる。
//! `refresh()` が重なった場合は後から始まった方だけが反映される。

use photo_uploader_common::InferenceItem;
use tokio::sync::Mutex;

use crate::client::InferenceSource;
use crate::error::{Result, UploaderError};

/// 取得の進捗（`0 <= fetched_count <= total_count`）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchFetchState {
    pub total_count: usize,
    pub fetched_count: usize,
    pub pending: bool,
}

/// 呼び出し元へ通知するイベント
#[derive(Debug)]
pub enum PagerEvent {
    /// 新しいセッションが始まった。表示リストを空にする
    Reset,
    /// 件数0
    NoData,
    /// `start` 番目から始まるバッチを取得した
    Batch { start: usize, items: Vec<InferenceItem> },
    Progress { fetched: usize, total: usize },
    /// バッチ取得に失敗した。次のバッチへ進む
    BatchFailed { start: usize, error: UploaderError },
}

/// `fetch_all` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    NoData,
    Completed {
        fetched: usize,
        total: usize,
        failed_batches: usize,
    },
    /// 途中で新しいセッションが始まったため打ち切った
    Superseded,
}

#[derive(Debug, Default)]
struct Session {
    epoch: u64,
    state: BatchFetchState,
    items: Vec<InferenceItem>,
}

pub struct BatchPager<S> {
    source: S,
    batch_size: usize,
    session: Mutex<Session>,
}

impl<S: InferenceSource> BatchPager<S> {
    pub fn new(source: S, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(UploaderError::Config("batch_size は1以上にしてください".into()));
        }
        Ok(Self {
            source,
            batch_size,
            session: Mutex::new(Session::default()),
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn state(&self) -> BatchFetchState {
        self.session.lock().await.state
    }

    /// 現在のセッションで取得済みのアイテム
    pub async fn items(&self) -> Vec<InferenceItem> {
        self.session.lock().await.items.clone()
    }

    /// 全件を先頭から取得する
    ///
    /// 件数取得の失敗はそのまま返す。バッチ取得の失敗は `BatchFailed` で通知し、
    /// そのバッチを飛ばして続行する（飛ばしたアイテムはこのセッションでは取得されない）。
    /// イベントはロック中に呼ぶので、古いセッションのイベントが新しい `Reset` の後に届くことはない。
    pub async fn fetch_all<F>(&self, mut on_event: F) -> Result<FetchOutcome>
    where
        F: FnMut(PagerEvent) + Send,
    {
        let epoch = {
            let mut session = self.session.lock().await;
            session.epoch += 1;
            session.state = BatchFetchState {
                pending: true,
                ..BatchFetchState::default()
            };
            session.items.clear();
            on_event(PagerEvent::Reset);
            session.epoch
        };

        let count = self.source.get_count().await;

        let total = {
            let mut session = self.session.lock().await;
            if session.epoch != epoch {
                return Ok(FetchOutcome::Superseded);
            }
            match count {
                Ok(0) => {
                    session.state.pending = false;
                    on_event(PagerEvent::NoData);
                    tracing::info!("no inference data");
                    return Ok(FetchOutcome::NoData);
                }
                Ok(total) => {
                    session.state.total_count = total;
                    total
                }
                Err(err) => {
                    session.state.pending = false;
                    return Err(err);
                }
            }
        };

        let mut failed_batches = 0;
        let mut start = 0;
        while start < total {
            let limit = self.batch_size.min(total - start);
            let result = self.source.get_batch(start, limit).await;

            let mut session = self.session.lock().await;
            if session.epoch != epoch {
                tracing::debug!(start, "discarding batch from superseded session");
                return Ok(FetchOutcome::Superseded);
            }

            match result {
                Ok(mut items) => {
                    if items.len() > limit {
                        tracing::warn!(
                            start,
                            limit,
                            received = items.len(),
                            "server returned more items than requested"
                        );
                        items.truncate(limit);
                    }
                    session.items.extend(items.iter().cloned());
                    session.state.fetched_count += items.len();
                    let fetched = session.state.fetched_count;
                    on_event(PagerEvent::Batch { start, items });
                    on_event(PagerEvent::Progress { fetched, total });
                }
                Err(error) => {
                    failed_batches += 1;
                    tracing::warn!(start, limit, error = %error, "batch fetch failed, skipping");
                    on_event(PagerEvent::BatchFailed { start, error });
                }
            }

            start += self.batch_size;
        }

        let mut session = self.session.lock().await;
        if session.epoch != epoch {
            return Ok(FetchOutcome::Superseded);
        }
        session.state.pending = false;
        let fetched = session.state.fetched_count;
        tracing::info!(fetched, total, failed_batches, "all batches fetched");

        Ok(FetchOutcome::Completed {
            fetched,
            total,
            failed_batches,
        })
    }

    /// 取得済みの内容を捨てて先頭から取り直す
    pub async fn refresh<F>(&self, on_event: F) -> Result<FetchOutcome>
    where
        F: FnMut(PagerEvent) + Send,
    {
        tracing::debug!("refresh requested");
        self.fetch_all(on_event).await
    }
}
