use amazon_review_scraper::{ReviewScrapeService, ScrapeRequest, ScraperConfig};
use tower::Service;

#[tokio::main]
async fn main() {
    // ログ設定
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // .env / 環境変数から設定を読み込む
    let config = ScraperConfig::from_env()
        .expect("設定の読み込みに失敗しました")
        .with_headless(false); // デバッグ用に表示モード

    let asin = std::env::var("REVIEW_ASIN").unwrap_or_else(|_| "B08N5WRWNW".to_string());

    let mut service = ReviewScrapeService::new(config);
    let request = ScrapeRequest::new(&asin).with_max_pages(2);

    println!("=== Review Scraper Test ({}) ===", asin);

    match service.call(request).await {
        Ok(result) => {
            println!("成功! CSV保存先: {:?}", result.csv_path);
            for line in result.stats.summary_lines() {
                println!("{}", line);
            }
        }
        Err(e) => {
            eprintln!("エラー: {}", e);
        }
    }
}
