use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::Service;
use tracing::info;

use crate::amazon::AmazonScraper;
use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::events::EventSink;
use crate::job::{run_review_job, ReviewJob};
use crate::output::ReviewStats;
use crate::parse::Review;
use crate::traits::Scraper;

/// レビュー取得リクエスト
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub asin: String,
    pub max_pages: u32,
    pub review_keyword: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub headless: Option<bool>,
}

impl ScrapeRequest {
    pub fn new(asin: impl Into<String>) -> Self {
        Self {
            asin: asin.into(),
            max_pages: 5,
            review_keyword: None,
            output_dir: None,
            headless: None,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_review_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.review_keyword = Some(keyword.into());
        self
    }

    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = Some(headless);
        self
    }

    fn job(&self) -> ReviewJob {
        let job = ReviewJob::new(self.asin.clone(), self.max_pages);
        match &self.review_keyword {
            Some(k) => job.with_review_keyword(k.clone()),
            None => job,
        }
    }

    /// 基本設定にリクエストの指定を重ねる
    fn apply_to(&self, mut config: ScraperConfig) -> ScraperConfig {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(headless) = self.headless {
            config.headless = headless;
        }
        config
    }
}

/// レビュー取得結果
#[derive(Debug)]
pub struct ScrapeResult {
    pub csv_path: PathBuf,
    pub reviews: Vec<Review>,
    pub stats: ReviewStats,
}

/// tower::Serviceを実装したレビュー取得サービス
#[derive(Debug, Clone, Default)]
pub struct ReviewScrapeService {
    config: ScraperConfig,
    sink: EventSink,
}

impl ReviewScrapeService {
    pub fn new(config: ScraperConfig) -> Self {
        Self {
            config,
            sink: EventSink::silent(),
        }
    }

    pub fn with_event_sink(mut self, sink: EventSink) -> Self {
        self.sink = sink;
        self
    }
}

impl Service<ScrapeRequest> for ReviewScrapeService {
    type Response = ScrapeResult;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ScrapeRequest) -> Self::Future {
        info!(
            "レビュー取得リクエスト受信: asin={}, pages={}",
            req.asin, req.max_pages
        );
        let config = req.apply_to(self.config.clone());
        let sink = self.sink.clone();

        Box::pin(async move {
            let job = req.job();
            job.validate()?;

            let output_dir = config.output_dir.clone();
            let mut scraper = AmazonScraper::new(config).with_event_sink(sink.clone());

            scraper.initialize().await?;
            let result = run_review_job(&mut scraper, &job, &output_dir, &sink).await;
            let closed = scraper.close().await;
            let outcome = result?;
            closed?;

            info!(
                "レビュー取得完了: path={:?}, reviews={}",
                outcome.csv_path,
                outcome.reviews.len()
            );

            Ok(ScrapeResult {
                csv_path: outcome.csv_path,
                reviews: outcome.reviews,
                stats: outcome.stats,
            })
        })
    }
}
