//! プッシュ通知チャネル
//!
//! Socket.IO の `connect` / `disconnect` / `new_file` をキューに積み、
//! 利用側は `next_event()` で順に受け取る。コールバック内ではキューに積むだけで
//! アプリケーションの処理はしない。

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use rust_socketio::asynchronous::{Client, ClientBuilder};
use rust_socketio::{Event, Payload};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;

use crate::client::{BaseUrl, InferenceSource};
use crate::error::{Result, UploaderError};
use crate::pager::{BatchPager, FetchOutcome, PagerEvent};

/// 新規アップロード通知のイベント名
pub const NEW_FILE_EVENT: &str = "new_file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveEvent {
    Connected,
    Disconnected,
    NewFile,
}

/// 利用側の使い終わりに `close()` すること
pub struct LiveUpdateChannel {
    events: UnboundedReceiver<LiveEvent>,
    socket: Option<Client>,
}

impl LiveUpdateChannel {
    /// サーバーの Socket.IO に接続して購読を始める
    ///
    /// 再接続は Socket.IO クライアントに任せる。
    pub async fn connect(base_url: &BaseUrl) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let socket = ClientBuilder::new(base_url.as_str())
            .on(Event::Connect, enqueue(tx.clone(), LiveEvent::Connected))
            .on(Event::Close, enqueue(tx.clone(), LiveEvent::Disconnected))
            .on(NEW_FILE_EVENT, enqueue(tx, LiveEvent::NewFile))
            .connect()
            .await
            .map_err(|e| UploaderError::Network {
                status: None,
                message: format!("プッシュ通知チャネルに接続できません: {}", e),
            })?;

        tracing::debug!(url = %base_url, "push channel connected");
        Ok(Self {
            events: rx,
            socket: Some(socket),
        })
    }

    /// 呼び出し側がイベントを流し込むチャネル（別トランスポートやテスト用）
    pub fn manual() -> (UnboundedSender<LiveEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                events: rx,
                socket: None,
            },
        )
    }

    /// 次のイベントを待つ。送信側がすべて閉じたら `None`
    pub async fn next_event(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }

    pub async fn close(mut self) -> Result<()> {
        self.events.close();
        if let Some(socket) = self.socket.take() {
            socket.disconnect().await.map_err(|e| UploaderError::Network {
                status: None,
                message: format!("プッシュ通知チャネルの切断に失敗: {}", e),
            })?;
            tracing::debug!("push channel closed");
        }
        Ok(())
    }
}

fn enqueue(
    tx: UnboundedSender<LiveEvent>,
    event: LiveEvent,
) -> impl FnMut(Payload, Client) -> BoxFuture<'static, ()> + Send + Sync + 'static {
    move |_payload, _socket| {
        // 受信側が閉じていれば捨てる
        let _ = tx.send(event);
        async {}.boxed()
    }
}

/// `drive_refreshes` が呼び出し元に渡すメッセージ
#[derive(Debug)]
pub enum WatchMessage {
    Live(LiveEvent),
    Pager(PagerEvent),
    RefreshFinished(FetchOutcome),
    RefreshFailed(UploaderError),
}

/// `new_file` ごとに `pager.refresh()` を起動する
///
/// リフレッシュは別タスクで走らせるので、実行中でも次のイベントを受け取れる。
/// 重なったリフレッシュは BatchPager 側で古い方が捨てられる。
/// チャネルが閉じるか `sink` の受信側が落ちたら、実行中のリフレッシュを待って戻る。
pub async fn drive_refreshes<S>(
    channel: &mut LiveUpdateChannel,
    pager: Arc<BatchPager<S>>,
    sink: UnboundedSender<WatchMessage>,
) where
    S: InferenceSource + 'static,
{
    let mut refreshes = JoinSet::new();

    loop {
        tokio::select! {
            event = channel.next_event() => {
                let Some(event) = event else { break };
                if sink.send(WatchMessage::Live(event)).is_err() {
                    break;
                }
                if event == LiveEvent::NewFile {
                    refreshes.spawn(run_refresh(Arc::clone(&pager), sink.clone()));
                }
            }
            Some(_) = refreshes.join_next(), if !refreshes.is_empty() => {}
        }
    }

    while refreshes.join_next().await.is_some() {}
}

async fn run_refresh<S>(pager: Arc<BatchPager<S>>, sink: UnboundedSender<WatchMessage>)
where
    S: InferenceSource + 'static,
{
    let events = sink.clone();
    let result = pager
        .refresh(move |event| {
            let _ = events.send(WatchMessage::Pager(event));
        })
        .await;

    let message = match result {
        Ok(outcome) => WatchMessage::RefreshFinished(outcome),
        Err(err) => {
            tracing::warn!(error = %err, "live refresh failed");
            WatchMessage::RefreshFailed(err)
        }
    };
    let _ = sink.send(message);
}
