use amazon_review_scraper::{AmazonScraper, EventSink, ScrapeEvent, Scraper, ScraperConfig, SearchQuery};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let keyword = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "usb c cable".to_string());

    let config = ScraperConfig::from_env()?;
    let query = SearchQuery::parse(&keyword, &config.domain)?;

    let (sink, mut rx) = EventSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let ScrapeEvent::Status(msg) = event {
                println!("  {}", msg);
            }
        }
    });

    let mut scraper = AmazonScraper::new(config).with_event_sink(sink);
    scraper.initialize().await?;
    let products = scraper.search(&query, 5).await;
    scraper.close().await?;
    drop(scraper);
    printer.await?;

    println!("=== {} ===", query);
    for p in products? {
        println!(
            "{:>2}. {} | {} | {} | {} reviews",
            p.index,
            p.asin,
            p.short_title(50),
            p.price,
            p.reviews_count
        );
    }
    Ok(())
}
