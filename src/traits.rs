use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ScraperError;
use crate::parse::{ProductInfo, Review};
use crate::query::SearchQuery;

#[async_trait]
pub trait Scraper: Send + Sync {
    /// ブラウザ初期化
    async fn initialize(&mut self) -> Result<(), ScraperError>;

    /// 商品検索（キーワード・ASIN・URL）
    async fn search(
        &mut self,
        query: &SearchQuery,
        max_results: usize,
    ) -> Result<Vec<ProductInfo>, ScraperError>;

    /// レビュー取得（重複排除済み）
    async fn scrape_reviews(
        &mut self,
        asin: &str,
        max_pages: u32,
        review_keyword: Option<&str>,
    ) -> Result<Vec<Review>, ScraperError>;

    /// リソース解放
    async fn close(&mut self) -> Result<(), ScraperError>;

    /// 停止要求を受け取るトークン
    fn cancel_token(&self) -> CancellationToken;

    /// 一括実行（initialize → scrape_reviews → close）
    ///
    /// 取得に失敗してもブラウザは閉じる。
    async fn execute(
        &mut self,
        asin: &str,
        max_pages: u32,
        review_keyword: Option<&str>,
    ) -> Result<Vec<Review>, ScraperError> {
        self.initialize().await?;
        let result = self.scrape_reviews(asin, max_pages, review_keyword).await;
        let closed = self.close().await;
        let reviews = result?;
        closed?;
        Ok(reviews)
    }
}
