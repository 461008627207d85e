use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "photo-uploader")]
#[command(about = "写真をアップロードし、推論結果を閲覧するクライアント", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// サーバーURL（設定ファイル・環境変数より優先）
    #[arg(long, global = true)]
    pub server: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 写真をアップロード（フォルダ指定で直下の画像をすべて）
    Upload {
        /// 画像ファイルまたはフォルダ
        #[arg(required = true)]
        path: PathBuf,

        /// 撮影場所（省略時は入力を求める）
        #[arg(short, long)]
        location: Option<String>,

        /// 縮小・再圧縮せずに送る
        #[arg(long)]
        raw: bool,
    },

    /// 登録件数を表示
    Count,

    /// 推論結果を一覧表示
    List {
        /// 1リクエストで取得する件数（省略時は設定値）
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// 新規アップロードを待ち受けて再取得
        #[arg(short, long)]
        watch: bool,
    },

    /// 1件の詳細を表示
    Show {
        /// アイテムID
        #[arg(required = true)]
        id: String,

        /// 画像をファイルに保存
        #[arg(short, long)]
        save: Option<PathBuf>,
    },

    /// 設定を表示/編集
    Config {
        /// サーバーURLを設定
        #[arg(long)]
        set_server_url: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
