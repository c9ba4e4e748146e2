//! 進捗イベント
//!
//! スクレイピングはバックグラウンドタスクで動くため、状態はチャネル経由で
//! 呼び出し側（CLIなど）へ通知する。

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::parse::ProductInfo;

#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeEvent {
    Status(String),
    Error(String),
    Progress { page: u32, total: u32 },
    Results(Vec<ProductInfo>),
    FileSaved(PathBuf),
}

/// イベント送信側。受信側が無い場合はログのみ
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ScrapeEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ScrapeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// ログ出力のみ
    pub fn silent() -> Self {
        Self::default()
    }

    fn send(&self, event: ScrapeEvent) {
        if let Some(tx) = &self.tx {
            // 受信側が閉じていても処理は続ける
            let _ = tx.send(event);
        }
    }

    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.send(ScrapeEvent::Status(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.send(ScrapeEvent::Error(message));
    }

    pub fn progress(&self, page: u32, total: u32) {
        info!("Scraping page {}/{}", page, total);
        self.send(ScrapeEvent::Progress { page, total });
    }

    pub fn results(&self, products: &[ProductInfo]) {
        info!("Found {} products", products.len());
        self.send(ScrapeEvent::Results(products.to_vec()));
    }

    pub fn file_saved(&self, path: PathBuf) {
        info!("CSV saved: {:?}", path);
        self.send(ScrapeEvent::FileSaved(path));
    }
}
