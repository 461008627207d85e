use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use photo_uploader::{cli, client, config, display, error, live, location, pager, scanner, upload};
use cli::{Cli, Commands};
use client::{BaseUrl, ClientOptions, InferenceClient};
use config::Config;
use live::{LiveEvent, LiveUpdateChannel, WatchMessage};
use pager::{BatchPager, FetchOutcome, PagerEvent};
use photo_uploader_common::UploadResponse;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use upload::PrepareOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut config = Config::load()?;

    match cli.command {
        Commands::Config { set_server_url, show } => {
            if let Some(url) = set_server_url {
                // 保存前に形式だけ確認
                let url = BaseUrl::parse(&url)?;
                config.set_server_url(url.to_string())?;
                println!("✔ サーバーURLを保存しました: {}", url);
            }

            if show {
                println!("設定ファイル: {}", Config::config_path()?.display());
                println!(
                    "サーバーURL: {}",
                    config.server_url.as_deref().unwrap_or("(未設定)")
                );
                println!("バッチサイズ: {}", config.batch_size);
                println!(
                    "タイムアウト: {}秒 (アップロード: {}秒)",
                    config.request_timeout_seconds, config.upload_timeout_seconds
                );
                println!("アップロード再送回数: {}", config.upload_retries);
                println!(
                    "画像の最大サイズ: {}px (JPEG品質: {})",
                    config.max_image_size, config.jpeg_quality
                );
            }
        }

        Commands::Upload { path, location, raw } => {
            let client = connect_client(&config, cli.server.as_deref())?;
            let options = PrepareOptions::from(&config);
            let prepare = if raw { None } else { Some(&options) };
            run_upload(&client, &path, location.as_deref(), prepare).await?;
        }

        Commands::Count => {
            let client = connect_client(&config, cli.server.as_deref())?;
            let count = client.get_count().await?;
            println!("{}", count);
        }

        Commands::List { batch_size, watch } => {
            let client = connect_client(&config, cli.server.as_deref())?;
            // 初回取得中の new_file を取りこぼさないよう、先に購読しておく
            let channel = if watch {
                Some(LiveUpdateChannel::connect(client.base_url()).await?)
            } else {
                None
            };

            let batch_size = batch_size.unwrap_or(config.batch_size);
            let pager = Arc::new(BatchPager::new(client, batch_size)?);
            let progress = new_progress_bar();

            let outcome = pager
                .fetch_all(|event| print_pager_event(&progress, event))
                .await?;
            print_outcome(&progress, outcome);

            if let Some(channel) = channel {
                run_watch(channel, pager, &progress).await?;
            }
        }

        Commands::Show { id, save } => {
            let client = connect_client(&config, cli.server.as_deref())?;
            let item = client.get_item(&id).await?;
            println!("{}", display::detail_text(&item));
            println!("Uploaded: {}", display::format_upload_time(&item.upload_time));

            if let Some(save_path) = save {
                match display::decode_image(&item)? {
                    Some(bytes) => {
                        std::fs::write(&save_path, &bytes).with_context(|| {
                            format!("画像を保存できません: {}", save_path.display())
                        })?;
                        println!("✔ 画像を保存: {}", save_path.display());
                    }
                    None => println!("⚠ このアイテムには画像がありません"),
                }
            }
        }
    }

    Ok(())
}

/// RUST_LOG があればそれを優先する
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn connect_client(config: &Config, server: Option<&str>) -> anyhow::Result<InferenceClient> {
    let base_url = BaseUrl::parse(&config.resolve_server_url(server)?)?;
    Ok(InferenceClient::new(base_url, ClientOptions::from(config))?)
}

/// `prepare` が `None` なら元のファイルをそのまま送る
async fn upload_path(
    client: &InferenceClient,
    path: &Path,
    tag: &str,
    prepare: Option<&PrepareOptions>,
) -> error::Result<UploadResponse> {
    match prepare {
        Some(options) => {
            let request = upload::prepare_upload(path, tag, options)?;
            client.upload(&request).await
        }
        None => client.upload_file(path, tag).await,
    }
}

async fn run_upload(
    client: &InferenceClient,
    path: &Path,
    explicit_location: Option<&str>,
    prepare: Option<&PrepareOptions>,
) -> anyhow::Result<()> {
    if !path.is_dir() {
        let interactive = explicit_location.is_none() && std::io::stdin().is_terminal();
        let tag = location::resolve_location(explicit_location, path, interactive)?;

        println!("📤 アップロード中... ({})", tag);
        let response = upload_path(client, path, &tag, prepare)
            .await
            .with_context(|| format!("アップロードできません: {}", path.display()))?;
        println!("✔ {}", response.message);
        if let Some(id) = response.document_id {
            println!("  ID: {}", id);
        }
        return Ok(());
    }

    println!("[1/2] 写真をスキャン中...");
    let images = scanner::scan_folder(path)?;
    println!("✔ {}枚の写真を検出\n", images.len());
    if images.is_empty() {
        return Ok(());
    }

    println!("[2/2] アップロード中...");
    let total = images.len();
    let mut failed = 0;
    for (i, image) in images.iter().enumerate() {
        // フォルダ一括では1枚ずつ聞かない
        let tag = match explicit_location {
            Some(tag) => location::resolve_location(Some(tag), &image.path, false)?,
            None => image
                .gps
                .clone()
                .unwrap_or_else(|| location::DEFAULT_LOCATION.to_string()),
        };

        match upload_path(client, &image.path, &tag, prepare).await {
            Ok(response) => println!(
                "  [{}/{}] ✔ {} ({}): {}",
                i + 1,
                total,
                image.file_name,
                tag,
                response.message
            ),
            Err(e) => {
                failed += 1;
                println!("  [{}/{}] ✗ {}: {}", i + 1, total, image.file_name, e);
            }
        }
    }

    if failed == 0 {
        println!("\n✅ アップロード完了");
    } else {
        println!("\n⚠ {}枚中{}枚が失敗しました", total, failed);
    }
    Ok(())
}

fn new_progress_bar() -> ProgressBar {
    let progress = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        progress.set_style(style.progress_chars("=>-"));
    }
    progress
}

fn print_pager_event(progress: &ProgressBar, event: PagerEvent) {
    match event {
        PagerEvent::Reset => {
            progress.reset();
            progress.set_length(0);
        }
        PagerEvent::NoData => progress.println("データがありません"),
        PagerEvent::Batch { start, items } => {
            for (offset, item) in items.iter().enumerate() {
                progress.println(format!(
                    "{:>4}. {}  [{}]",
                    start + offset + 1,
                    display::list_line(item),
                    item.id
                ));
            }
        }
        PagerEvent::Progress { fetched, total } => {
            progress.set_length(total as u64);
            progress.set_position(fetched as u64);
        }
        PagerEvent::BatchFailed { start, error } => {
            progress.println(format!(
                "⚠ {}件目からの取得に失敗（スキップ）: {}",
                start + 1,
                error
            ));
        }
    }
}

fn print_outcome(progress: &ProgressBar, outcome: FetchOutcome) {
    match outcome {
        FetchOutcome::Completed {
            fetched,
            total,
            failed_batches,
        } => {
            progress.finish_with_message(if failed_batches == 0 {
                format!("✔ {}件を取得", fetched)
            } else {
                format!("⚠ {}/{}件を取得（{}バッチ失敗）", fetched, total, failed_batches)
            });
        }
        FetchOutcome::NoData => progress.finish_and_clear(),
        FetchOutcome::Superseded => {}
    }
}

fn print_watch_message(progress: &ProgressBar, message: WatchMessage) {
    match message {
        WatchMessage::Live(LiveEvent::Connected) => println!("🔌 接続しました"),
        WatchMessage::Live(LiveEvent::Disconnected) => {
            println!("🔌 切断されました（再接続待ち）")
        }
        WatchMessage::Live(LiveEvent::NewFile) => {
            println!("\n🆕 新しいアップロードがあります。再取得します")
        }
        WatchMessage::Pager(event) => print_pager_event(progress, event),
        WatchMessage::RefreshFinished(outcome) => print_outcome(progress, outcome),
        WatchMessage::RefreshFailed(e) => println!("⚠ 再取得に失敗: {}", e),
    }
}

/// 新規アップロードのたびに一覧を取り直す。Ctrl-C で終了
///
/// `channel` は初回取得の前に接続済みで、その間に届いた通知もここで処理する。
async fn run_watch(
    mut channel: LiveUpdateChannel,
    pager: Arc<BatchPager<InferenceClient>>,
    progress: &ProgressBar,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    println!("\n👀 新規アップロードを待機中 (Ctrl-C で終了)");

    {
        let driver = live::drive_refreshes(&mut channel, pager, tx);
        tokio::pin!(driver);

        loop {
            tokio::select! {
                _ = &mut driver => break,
                Some(message) = rx.recv() => print_watch_message(progress, message),
                _ = tokio::signal::ctrl_c() => break,
            }
        }
    }

    channel.close().await?;
    println!("✅ 終了しました");
    Ok(())
}
