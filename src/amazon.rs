//! Amazon 商品検索・レビュー取得
//!
//! ブラウザ操作はここで行い、HTMLの解析は [`crate::parse`] に任せる。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::config::ScraperConfig;
use crate::delay::DelayKind;
use crate::error::ScraperError;
use crate::events::EventSink;
use crate::login::{LoginFlow, NoPrompt, UserPrompt};
use crate::parse::{
    keyword_filter_applied, parse_product_page, parse_reviews, parse_search_results, ProductInfo,
    Review, ReviewCollector,
};
use crate::query::{self, SearchQuery};
use crate::selectors;
use crate::traits::Scraper;

/// 検索結果の表示待ち（秒）
const SEARCH_RESULTS_WAIT_SECS: u64 = 15;

/// 「次へ」クリック後の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageStep {
    Arrived,
    /// 番号が想定と違うが続行する
    Mismatch { actual: u32 },
    NoNextButton,
    UrlUnchanged,
    /// 1ページ目に戻された
    BackToFirst,
}

/// `urls` はクリック前後のURL（ボタンが無ければ `None`）
fn page_step(urls: Option<(&str, &str)>, expected: u32, actual: u32) -> PageStep {
    match urls {
        None => PageStep::NoNextButton,
        Some((before, after)) if before == after => PageStep::UrlUnchanged,
        Some(_) if actual == expected => PageStep::Arrived,
        Some(_) if actual == 1 => PageStep::BackToFirst,
        Some(_) => PageStep::Mismatch { actual },
    }
}

pub struct AmazonScraper {
    config: ScraperConfig,
    session: Option<BrowserSession>,
    sink: EventSink,
    cancel: CancellationToken,
    prompt: Arc<dyn UserPrompt>,
}

impl AmazonScraper {
    pub fn new(config: ScraperConfig) -> Self {
        Self {
            config,
            session: None,
            sink: EventSink::silent(),
            cancel: CancellationToken::new(),
            prompt: Arc::new(NoPrompt),
        }
    }

    pub fn with_event_sink(mut self, sink: EventSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn UserPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    fn session(&self) -> Result<&BrowserSession, ScraperError> {
        self.session
            .as_ref()
            .ok_or_else(|| ScraperError::BrowserInit("ブラウザが初期化されていません".into()))
    }

    async fn pause(&self, kind: DelayKind) -> Result<Duration, ScraperError> {
        self.config.delays.pause(kind, &self.cancel).await
    }

    /// 「ショッピングを続ける」画面が出ていれば閉じる
    async fn dismiss_interstitial(&self) -> Result<(), ScraperError> {
        let session = self.session()?;
        if session
            .click_if_present(selectors::CONTINUE_SHOPPING_BUTTON)
            .await?
        {
            self.pause(DelayKind::Interaction).await?;
            self.sink.status("Clicked \"Continue shopping\" button");
        }
        Ok(())
    }

    /// 商品ページから商品情報を取得
    async fn product_from_url(&self, url: &str) -> Result<Vec<ProductInfo>, ScraperError> {
        self.sink
            .status(format!("Extracting product info from URL: {}", url));
        let session = self.session()?;

        session.goto(url).await?;
        self.pause(DelayKind::PageLoad).await?;
        self.dismiss_interstitial().await?;

        let snapshot = session.snapshot().await?;
        let product = parse_product_page(&snapshot, url);

        if !product.extraction_errors.is_empty() {
            self.sink.status(format!(
                "Extraction issues: {}",
                product.extraction_errors.join(", ")
            ));
        }
        info!(
            "Product: asin={}, title={}, price={}, rating={}, reviews={}",
            product.asin,
            product.short_title(50),
            product.price,
            product.rating,
            product.reviews_count
        );
        Ok(vec![product])
    }

    /// キーワード検索
    async fn search_keyword(
        &self,
        keyword: &str,
        max_results: usize,
    ) -> Result<Vec<ProductInfo>, ScraperError> {
        let session = self.session()?;
        let domain = &self.config.domain;

        self.sink.status("Navigating to Amazon home page...");
        session.goto(&query::home_url(domain)).await?;
        self.pause(DelayKind::PageLoad).await?;
        self.dismiss_interstitial().await?;

        match self.submit_search_box(keyword).await {
            Ok(()) => self
                .sink
                .status(format!("Performed search for: \"{}\"", keyword)),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                self.sink.error(format!("Error using search box: {}", e));
                let url = query::keyword_search_url(domain, keyword);
                session.goto(&url).await?;
                self.sink.status(format!("Fallback to direct URL: {}", url));
            }
        }

        self.pause(DelayKind::PageLoad).await?;

        let found = session
            .wait_for_selector(
                selectors::SEARCH_RESULT,
                Duration::from_secs(SEARCH_RESULTS_WAIT_SECS),
            )
            .await?;

        let snapshot = session.snapshot().await?;
        if !found {
            if snapshot.is_captcha_page() {
                if self.config.debug {
                    session.log_screenshot("captcha").await;
                }
                return Err(ScraperError::Blocked(format!(
                    "CAPTCHA が表示されました: {}",
                    snapshot.title
                )));
            }
            self.sink.error("Search results not found within timeout");
            return Ok(Vec::new());
        }

        let products = parse_search_results(&snapshot.html, max_results);
        self.sink
            .status(format!("Extracted {} products", products.len()));
        Ok(products)
    }

    async fn submit_search_box(&self, keyword: &str) -> Result<(), ScraperError> {
        let session = self.session()?;
        let search_box = session
            .first_visible(selectors::SEARCH_BOX)
            .await?
            .ok_or_else(|| ScraperError::ElementNotFound("search box".into()))?;
        session.fill(&search_box, keyword).await?;
        self.pause(DelayKind::Interaction).await?;
        session.press_enter().await
    }

    /// レビューのキーワード絞り込み。失敗しても取得は続ける
    async fn apply_review_filter(&self, keyword: &str) -> Result<bool, ScraperError> {
        self.sink
            .status(format!("Applying review keyword filter: \"{}\"", keyword));
        let session = self.session()?;
        self.pause(DelayKind::PageLoad).await?;

        let Some(input) = session.first_visible(selectors::REVIEW_SEARCH_INPUT).await? else {
            self.sink
                .status("Review search input not found - proceeding without filter");
            return Ok(false);
        };
        debug!("Review search input: {}", input);

        session.fill(&input, keyword).await?;
        self.pause(DelayKind::Interaction).await?;

        match session
            .click_first_visible(selectors::REVIEW_FILTER_SUBMIT)
            .await?
        {
            Some(button) => debug!("Clicked filter submit: {}", button),
            None => {
                session.press_enter().await?;
                debug!("Submitted keyword filter with Enter key");
            }
        }
        self.pause(DelayKind::PageTransition).await?;

        let snapshot = session.snapshot().await?;
        let applied = keyword_filter_applied(&snapshot.url, &snapshot.html, keyword);
        if applied {
            self.sink.status("Review keyword filter applied successfully");
        } else {
            self.sink
                .status("WARNING: Keyword filter may not have been applied");
        }
        Ok(applied)
    }

    /// 現在のページのレビューを抽出
    async fn collect_current_page(
        &self,
        collector: &mut ReviewCollector,
        asin: &str,
        page: u32,
    ) -> Result<Vec<Review>, ScraperError> {
        let snapshot = self.session()?.snapshot().await?;
        let parsed = parse_reviews(&snapshot.html);
        if parsed.is_empty() {
            self.sink.status(format!("No reviews found on page {}", page));
            if snapshot.is_captcha_page() && self.config.debug {
                self.session()?.log_screenshot("captcha").await;
            }
            return Ok(Vec::new());
        }
        debug!("Found {} review elements on page {}", parsed.len(), page);
        Ok(collector.accept_page(parsed, asin, page))
    }

    /// 「次へ」をクリックし、前後のURLを返す。ボタンが無ければ `None`
    async fn click_next_page(&self) -> Result<Option<(String, String)>, ScraperError> {
        let session = self.session()?;
        let Some(found) = session.locate_next_button(selectors::NEXT_PAGE_BUTTON).await? else {
            return Ok(None);
        };
        debug!("Found next button with selector: {}", found);
        self.pause(DelayKind::Interaction).await?;

        let before = session.current_url().await?;
        session.click_next_button().await?;
        self.pause(DelayKind::PageTransition).await?;
        let after = session.current_url().await?;
        Ok(Some((before, after)))
    }

    async fn scrape_pages(
        &self,
        asin: &str,
        max_pages: u32,
        review_keyword: Option<&str>,
        collector: &mut ReviewCollector,
        reviews: &mut Vec<Review>,
    ) -> Result<(), ScraperError> {
        let session = self.session()?;
        let url = query::reviews_url(&self.config.domain, asin);

        self.sink.progress(1, max_pages);
        LoginFlow::new(
            session,
            &self.config,
            self.prompt.as_ref(),
            &self.sink,
            &self.cancel,
        )
        .ensure_logged_in(&url)
        .await?;

        if let Some(keyword) = review_keyword.filter(|k| !k.trim().is_empty()) {
            match self.apply_review_filter(keyword.trim()).await {
                Ok(true) => {}
                Ok(false) => self.sink.status("Continuing without keyword filter"),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    self.sink
                        .status(format!("Error applying keyword filter: {}", e));
                    self.sink.status("Continuing without keyword filter");
                }
            }
        }

        let first = self.collect_current_page(collector, asin, 1).await?;
        self.sink
            .status(format!("Added {} reviews from page 1", first.len()));
        reviews.extend(first);

        for page in 2..=max_pages {
            self.sink.progress(page, max_pages);

            let navigation = self.click_next_page().await?;
            let actual = match &navigation {
                Some((before, after)) if before != after => {
                    session.snapshot().await?.page_number()
                }
                _ => 0,
            };
            let urls = navigation
                .as_ref()
                .map(|(before, after)| (before.as_str(), after.as_str()));

            match page_step(urls, page, actual) {
                PageStep::Arrived => debug!("On page {}", page),
                PageStep::Mismatch { actual } => self.sink.status(format!(
                    "WARNING: Expected page {}, but actually on page {}",
                    page, actual
                )),
                PageStep::NoNextButton => {
                    self.sink.status("No next button found - stopping pagination");
                    break;
                }
                PageStep::UrlUnchanged => {
                    self.sink
                        .status("WARNING: URL did not change after clicking next");
                    self.sink.status("No next button found - stopping pagination");
                    break;
                }
                PageStep::BackToFirst => {
                    self.sink.status(format!(
                        "WARNING: Expected page {}, but actually on page 1",
                        page
                    ));
                    self.sink.status("Pagination failed, stopping");
                    break;
                }
            }

            let page_reviews = self.collect_current_page(collector, asin, page).await?;
            self.sink.status(format!(
                "Added {} reviews from page {}",
                page_reviews.len(),
                page
            ));
            reviews.extend(page_reviews);

            if page < max_pages {
                let delay = self.pause(DelayKind::PageTransition).await?;
                debug!("Waited {:.1}s before next page", delay.as_secs_f64());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Scraper for AmazonScraper {
    async fn initialize(&mut self) -> Result<(), ScraperError> {
        if self.session.is_some() {
            return Ok(());
        }
        self.sink.status("Starting browser...");
        let session = BrowserSession::launch(&self.config).await.map_err(|e| {
            ScraperError::BrowserInit(format!(
                "Chrome/Chromium を起動できませんでした。インストールするか CHROME_PATH を設定してください ({})",
                e
            ))
        })?;
        self.session = Some(session);
        Ok(())
    }

    async fn search(
        &mut self,
        query: &SearchQuery,
        max_results: usize,
    ) -> Result<Vec<ProductInfo>, ScraperError> {
        self.sink.status(format!("Searching Amazon for: {}", query));
        let products = match query {
            SearchQuery::Asin(asin) => {
                self.product_from_url(&query::product_url(&self.config.domain, asin))
                    .await?
            }
            SearchQuery::Url(url) => self.product_from_url(url).await?,
            SearchQuery::Keyword(keyword) => self.search_keyword(keyword, max_results).await?,
        };
        self.sink.results(&products);
        Ok(products)
    }

    async fn scrape_reviews(
        &mut self,
        asin: &str,
        max_pages: u32,
        review_keyword: Option<&str>,
    ) -> Result<Vec<Review>, ScraperError> {
        self.sink
            .status(format!("Starting to scrape reviews for product: {}", asin));
        let mut collector = ReviewCollector::new();
        let mut reviews = Vec::new();

        let outcome = self
            .scrape_pages(asin, max_pages, review_keyword, &mut collector, &mut reviews)
            .await;

        match outcome {
            Ok(()) => {}
            Err(e @ ScraperError::Cancelled) => {
                self.sink.status("Scraping stopped");
                return Err(e);
            }
            Err(e @ (ScraperError::Login(_) | ScraperError::BrowserInit(_))) => {
                self.sink.error(e.to_string());
                return Err(e);
            }
            Err(e) => {
                // 途中までのレビューは返す
                warn!("Error during scraping: {}", e);
                self.sink.error(format!("Error during scraping: {}", e));
                if reviews.is_empty() {
                    return Err(e);
                }
            }
        }

        self.sink.status(format!(
            "Finished scraping. Total unique reviews collected: {}",
            reviews.len()
        ));
        Ok(reviews)
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        if let Some(session) = self.session.take() {
            session.close().await?;
        }
        Ok(())
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
