//! Amazon 商品検索・レビュースクレイパー
//!
//! - キーワード・ASIN・商品URLで商品を検索
//! - 選択した商品のレビューを複数ページ取得し、タイムスタンプ付きCSVに保存
//!
//! HTMLの解析（[`parse`]）はブラウザ操作から独立しており、保存済みのHTMLでも使える。
//!
//! # 使用例
//!
//! ```rust,ignore
//! use amazon_review_scraper::{ReviewScrapeService, ScrapeRequest, ScraperConfig};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ScraperConfig::from_env().unwrap();
//!     let mut service = ReviewScrapeService::new(config);
//!
//!     let request = ScrapeRequest::new("B08N5WRWNW")
//!         .with_max_pages(3)
//!         .with_review_keyword("battery");
//!
//!     let result = service.call(request).await.unwrap();
//!     println!("CSV saved: {:?} ({} reviews)", result.csv_path, result.reviews.len());
//! }
//! ```
//!
//! # 検索してから取得
//!
//! ```rust,ignore
//! use amazon_review_scraper::{AmazonScraper, Scraper, ScraperConfig, SearchQuery};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ScraperConfig::from_env().unwrap();
//!     let query = SearchQuery::parse("usb c cable", &config.domain).unwrap();
//!
//!     let mut scraper = AmazonScraper::new(config);
//!     scraper.initialize().await.unwrap();
//!     let products = scraper.search(&query, 10).await.unwrap();
//!     let reviews = scraper.scrape_reviews(&products[0].asin, 2, None).await.unwrap();
//!     scraper.close().await.unwrap();
//!     println!("Reviews: {}", reviews.len());
//! }
//! ```

pub mod amazon;
pub mod browser;
pub mod config;
pub mod delay;
pub mod error;
pub mod events;
pub mod job;
pub mod login;
pub mod output;
pub mod parse;
pub mod query;
pub mod selectors;
pub mod service;
pub mod traits;

// 主要な型をリエクスポート
pub use amazon::AmazonScraper;
pub use config::{Credentials, Marketplace, ScraperConfig};
pub use delay::{DelayConfig, DelayKind, DelayRange};
pub use error::ScraperError;
pub use events::{EventSink, ScrapeEvent};
pub use job::{run_review_job, JobHandle, JobOutcome, ReviewJob};
pub use login::{NoPrompt, UserPrompt};
pub use output::{open_in_default_app, save_reviews_csv, ReviewStats};
pub use parse::{ProductInfo, Review};
pub use query::{SearchKind, SearchQuery};
pub use service::{ReviewScrapeService, ScrapeRequest, ScrapeResult};
pub use traits::Scraper;
