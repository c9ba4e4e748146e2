//! バックグラウンドでのレビュー取得ジョブ

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ScraperError;
use crate::events::EventSink;
use crate::output::{save_reviews_csv, ReviewStats};
use crate::parse::Review;
use crate::query::is_asin;
use crate::traits::Scraper;

pub const MIN_PAGES: u32 = 1;
pub const MAX_PAGES: u32 = 20;
pub const MAX_REVIEW_KEYWORD_CHARS: usize = 50;
/// 停止要求後にタスク終了を待つ時間
pub const STOP_WAIT: Duration = Duration::from_secs(5);

/// レビュー取得の指定
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewJob {
    pub asin: String,
    pub max_pages: u32,
    pub review_keyword: Option<String>,
}

impl ReviewJob {
    pub fn new(asin: impl Into<String>, max_pages: u32) -> Self {
        Self {
            asin: asin.into(),
            max_pages,
            review_keyword: None,
        }
    }

    pub fn with_review_keyword(mut self, keyword: impl Into<String>) -> Self {
        let keyword = keyword.into();
        let trimmed = keyword.trim();
        self.review_keyword = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn validate(&self) -> Result<(), ScraperError> {
        if !is_asin(&self.asin) {
            return Err(ScraperError::InvalidInput(format!(
                "ASINの形式が不正です: {}",
                self.asin
            )));
        }
        if !(MIN_PAGES..=MAX_PAGES).contains(&self.max_pages) {
            return Err(ScraperError::InvalidInput(format!(
                "ページ数は{}〜{}で指定してください",
                MIN_PAGES, MAX_PAGES
            )));
        }
        if let Some(keyword) = &self.review_keyword {
            if keyword.chars().count() > MAX_REVIEW_KEYWORD_CHARS {
                return Err(ScraperError::InvalidInput(format!(
                    "レビューキーワードは{}文字以内にしてください",
                    MAX_REVIEW_KEYWORD_CHARS
                )));
            }
        }
        Ok(())
    }
}

/// ジョブの結果
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub csv_path: PathBuf,
    pub reviews: Vec<Review>,
    pub stats: ReviewStats,
}

/// レビュー取得 → CSV保存 → 集計
///
/// ブラウザは初期化済みであること。停止された場合はCSVを書かない。
pub async fn run_review_job<S: Scraper + ?Sized>(
    scraper: &mut S,
    job: &ReviewJob,
    output_dir: &Path,
    sink: &EventSink,
) -> Result<JobOutcome, ScraperError> {
    job.validate()?;

    let reviews = scraper
        .scrape_reviews(&job.asin, job.max_pages, job.review_keyword.as_deref())
        .await?;

    if scraper.cancel_token().is_cancelled() {
        return Err(ScraperError::Cancelled);
    }

    let csv_path = match save_reviews_csv(
        &reviews,
        &job.asin,
        job.review_keyword.as_deref(),
        output_dir,
    ) {
        Ok(path) => path,
        Err(e @ ScraperError::NoReviews(_)) => {
            sink.error("No reviews to save.");
            return Err(e);
        }
        Err(e) => return Err(e),
    };
    sink.file_saved(csv_path.clone());

    let stats = ReviewStats::from_reviews(&reviews);
    for line in stats.summary_lines() {
        sink.status(line);
    }

    Ok(JobOutcome {
        csv_path,
        reviews,
        stats,
    })
}

/// 実行中のジョブ
pub struct JobHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<JobOutcome, ScraperError>>,
}

impl JobHandle {
    /// ジョブを別タスクで開始する。終了時にブラウザは閉じる
    pub fn spawn<S>(mut scraper: S, job: ReviewJob, output_dir: PathBuf, sink: EventSink) -> Self
    where
        S: Scraper + 'static,
    {
        let cancel = scraper.cancel_token();
        let task = tokio::spawn(async move {
            let result = run_review_job(&mut scraper, &job, &output_dir, &sink).await;
            if let Err(e) = scraper.close().await {
                warn!("Failed to close scraper: {}", e);
            }
            result
        });
        Self { cancel, task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 完了を待つ
    pub async fn wait(self) -> Result<JobOutcome, ScraperError> {
        joined(self.task.await)
    }

    /// 完了するか `stop_signal` が来るまで待つ。後者なら [`stop`](Self::stop) する
    pub async fn wait_or_stop<F>(self, stop_signal: F) -> Result<JobOutcome, ScraperError>
    where
        F: Future<Output = ()>,
    {
        let mut task = self.task;
        tokio::select! {
            result = &mut task => return joined(result),
            _ = stop_signal => {}
        }
        Self {
            cancel: self.cancel,
            task,
        }
        .stop()
        .await
    }

    /// 停止を要求し、最大5秒待つ
    pub async fn stop(self) -> Result<JobOutcome, ScraperError> {
        info!("Stopping job...");
        self.cancel.cancel();
        let mut task = self.task;
        match tokio::time::timeout(STOP_WAIT, &mut task).await {
            Ok(result) => joined(result),
            Err(_) => {
                warn!("Job did not stop within {:?}, aborting", STOP_WAIT);
                task.abort();
                Err(ScraperError::Cancelled)
            }
        }
    }
}

fn joined(
    result: Result<Result<JobOutcome, ScraperError>, tokio::task::JoinError>,
) -> Result<JobOutcome, ScraperError> {
    result.map_err(|e| ScraperError::Config(format!("ジョブが異常終了しました: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::ProductInfo;
    use crate::query::SearchQuery;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FakeScraper {
        reviews: Vec<Review>,
        cancel: CancellationToken,
        closed: Arc<AtomicBool>,
        hang: bool,
    }

    impl FakeScraper {
        fn new(reviews: Vec<Review>) -> Self {
            Self {
                reviews,
                cancel: CancellationToken::new(),
                closed: Arc::new(AtomicBool::new(false)),
                hang: false,
            }
        }
    }

    #[async_trait]
    impl Scraper for FakeScraper {
        async fn initialize(&mut self) -> Result<(), ScraperError> {
            Ok(())
        }

        async fn search(
            &mut self,
            _query: &SearchQuery,
            _max_results: usize,
        ) -> Result<Vec<ProductInfo>, ScraperError> {
            Ok(Vec::new())
        }

        async fn scrape_reviews(
            &mut self,
            _asin: &str,
            _max_pages: u32,
            _review_keyword: Option<&str>,
        ) -> Result<Vec<Review>, ScraperError> {
            if self.hang {
                self.cancel.cancelled().await;
                return Err(ScraperError::Cancelled);
            }
            Ok(self.reviews.clone())
        }

        async fn close(&mut self) -> Result<(), ScraperError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn cancel_token(&self) -> CancellationToken {
            self.cancel.clone()
        }
    }

    fn review(rating: f32) -> Review {
        Review {
            asin: "B0TEST0001".into(),
            rating: Some(rating),
            title: "Good".into(),
            text: "Long enough review body for the test.".into(),
            reviewer: "Sam".into(),
            date: "2024".into(),
            page: 1,
        }
    }

    #[test]
    fn test_job_validation() {
        assert!(ReviewJob::new("B0TEST0001", 5).validate().is_ok());
        assert!(ReviewJob::new("B0TEST0001", 0).validate().is_err());
        assert!(ReviewJob::new("B0TEST0001", 21).validate().is_err());
        assert!(ReviewJob::new("short", 5).validate().is_err());
        assert!(ReviewJob::new("B0TEST0001", 5)
            .with_review_keyword("x".repeat(51))
            .validate()
            .is_err());
        assert_eq!(
            ReviewJob::new("B0TEST0001", 5)
                .with_review_keyword("   ")
                .review_keyword,
            None
        );
    }

    #[tokio::test]
    async fn test_run_review_job_saves_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut scraper = FakeScraper::new(vec![review(5.0), review(3.0)]);
        let (sink, mut rx) = EventSink::channel();

        let job = ReviewJob::new("B0TEST0001", 2).with_review_keyword("battery");
        let outcome = run_review_job(&mut scraper, &job, dir.path(), &sink)
            .await
            .unwrap();

        assert!(outcome.csv_path.exists());
        assert_eq!(outcome.stats.total, 2);
        assert_eq!(outcome.stats.average_rating, Some(4.0));

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first,
            crate::events::ScrapeEvent::FileSaved(outcome.csv_path.clone())
        );
    }

    #[tokio::test]
    async fn test_run_review_job_without_reviews() {
        let dir = tempfile::tempdir().unwrap();
        let mut scraper = FakeScraper::new(Vec::new());
        let job = ReviewJob::new("B0TEST0001", 1);
        let err = run_review_job(&mut scraper, &job, dir.path(), &EventSink::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, ScraperError::NoReviews(_)));
    }

    #[tokio::test]
    async fn test_job_handle_wait_closes_scraper() {
        let dir = tempfile::tempdir().unwrap();
        let scraper = FakeScraper::new(vec![review(4.0)]);
        let closed = scraper.closed.clone();

        let handle = JobHandle::spawn(
            scraper,
            ReviewJob::new("B0TEST0001", 1),
            dir.path().to_path_buf(),
            EventSink::silent(),
        );
        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome.reviews.len(), 1);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_job_handle_stop_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let mut scraper = FakeScraper::new(vec![review(4.0)]);
        scraper.hang = true;
        let closed = scraper.closed.clone();

        let handle = JobHandle::spawn(
            scraper,
            ReviewJob::new("B0TEST0001", 3),
            dir.path().to_path_buf(),
            EventSink::silent(),
        );
        let err = handle.stop().await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_wait_or_stop_on_signal() {
        let dir = tempfile::tempdir().unwrap();
        let mut scraper = FakeScraper::new(vec![review(4.0)]);
        scraper.hang = true;

        let handle = JobHandle::spawn(
            scraper,
            ReviewJob::new("B0TEST0001", 3),
            dir.path().to_path_buf(),
            EventSink::silent(),
        );
        let err = handle
            .wait_or_stop(std::future::ready(()))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
