//! 保存済みHTMLを使った抽出・保存のテスト

use amazon_review_scraper::parse::{
    parse_reviews, parse_search_results, PageSnapshot, ReviewCollector, DEFAULT_PRICE,
    DEFAULT_RATING, DEFAULT_REVIEWER, DEFAULT_REVIEW_COUNT,
};
use amazon_review_scraper::{save_reviews_csv, ReviewStats, ScraperError};

const SEARCH_RESULTS: &str = include_str!("fixtures/search_results.html");
const REVIEWS_PAGE1: &str = include_str!("fixtures/reviews_page1.html");
const REVIEWS_PAGE2: &str = include_str!("fixtures/reviews_page2.html");
const SIGN_IN: &str = include_str!("fixtures/sign_in.html");
const TWO_FACTOR: &str = include_str!("fixtures/two_factor.html");

const ASIN: &str = "B07ZQ3V5KB";
const REVIEWS_URL: &str = "https://www.amazon.com/product-reviews/B07ZQ3V5KB/";

#[test]
fn test_search_results_fixture() {
    let products = parse_search_results(SEARCH_RESULTS, 10);
    let asins: Vec<_> = products.iter().map(|p| p.asin.as_str()).collect();
    assert_eq!(asins, ["B07ZQ3V5KB", "B0C7GQ8JL1", "B0D1KET002"]);

    let kettle = &products[0];
    assert_eq!(kettle.index, 1);
    assert_eq!(kettle.title, "Electric Kettle, 1.7L Glass Tea Kettle with LED Light");
    assert_eq!(kettle.price, "$24.99");
    assert_eq!(kettle.rating, "4.5");
    assert_eq!(kettle.reviews_count, "18204");

    let gooseneck = &products[1];
    assert_eq!(gooseneck.index, 3);
    assert_eq!(gooseneck.title, "Gooseneck Kettle Temperature Control");
    assert_eq!(gooseneck.price, "$59.00");
    assert_eq!(gooseneck.rating, DEFAULT_RATING);
    assert_eq!(gooseneck.reviews_count, "2100");

    let travel = &products[2];
    assert_eq!(travel.title, "Travel Kettle");
    assert_eq!(travel.price, DEFAULT_PRICE);
    assert_eq!(travel.reviews_count, DEFAULT_REVIEW_COUNT);
}

#[test]
fn test_search_results_limit_counts_skipped_cards() {
    // 2件目は ASIN が無いため、上限2では1件のみ
    let products = parse_search_results(SEARCH_RESULTS, 2);
    assert_eq!(products.len(), 1);
}

#[test]
fn test_reviews_across_pages() {
    let mut collector = ReviewCollector::new();

    let page1 = collector.accept_page(parse_reviews(REVIEWS_PAGE1), ASIN, 1);
    assert_eq!(page1.len(), 2, "short review should be skipped");
    assert_eq!(page1[0].title, "Boils fast");
    assert_eq!(page1[0].rating, Some(5.0));
    assert_eq!(page1[0].reviewer, "Morgan");
    assert_eq!(page1[1].title, "Lid broke");

    let page2 = collector.accept_page(parse_reviews(REVIEWS_PAGE2), ASIN, 2);
    let titles: Vec<_> = page2.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["Good value", "まあまあ"]);
    assert!(page2.iter().all(|r| r.page == 2 && r.asin == ASIN));

    let japanese = &page2[1];
    assert_eq!(japanese.rating, Some(3.0));
    assert_eq!(japanese.reviewer, DEFAULT_REVIEWER);

    assert_eq!(collector.seen_count(), 4);
}

#[test]
fn test_page_numbers_from_pagination() {
    let page1 = PageSnapshot::new(REVIEWS_URL, "Customer reviews", REVIEWS_PAGE1);
    let page2 = PageSnapshot::new(REVIEWS_URL, "Customer reviews", REVIEWS_PAGE2);
    assert_eq!(page1.page_number(), 1);
    assert_eq!(page2.page_number(), 2);
    assert!(!page1.is_login_page());
}

#[test]
fn test_login_and_two_factor_fixtures() {
    let sign_in = PageSnapshot::new(
        "https://www.amazon.com/ap/signin?openid.return_to=x",
        "Amazon Sign-In",
        SIGN_IN,
    );
    assert!(sign_in.is_login_page());
    assert!(!sign_in.is_two_factor_page());
    assert!(!sign_in.login_succeeded());

    let two_factor = PageSnapshot::new(
        "https://www.amazon.com/ap/mfa",
        "Two-Step Verification",
        TWO_FACTOR,
    );
    assert!(two_factor.is_two_factor_page());
}

#[test]
fn test_scraped_reviews_to_csv() {
    let mut collector = ReviewCollector::new();
    let mut reviews = collector.accept_page(parse_reviews(REVIEWS_PAGE1), ASIN, 1);
    reviews.extend(collector.accept_page(parse_reviews(REVIEWS_PAGE2), ASIN, 2));

    let dir = tempfile::tempdir().unwrap();
    let path = save_reviews_csv(&reviews, ASIN, Some("lid hinge"), dir.path()).unwrap();

    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("amazon_reviews_lid_hinge_B07ZQ3V5KB_"));
    assert!(name.ends_with(".csv"));

    let raw = std::fs::read(&path).unwrap();
    let mut reader = csv::Reader::from_reader(&raw[3..]);
    let headers = reader.headers().unwrap().clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        ["asin", "rating", "title", "text", "reviewer", "date", "page"]
    );
    assert_eq!(reader.records().count(), 4);

    let stats = ReviewStats::from_reviews(&reviews);
    assert_eq!(stats.total, 4);
    assert_eq!(stats.distribution.get("2.0"), Some(&1));
    assert_eq!(stats.distribution.get("3.0"), Some(&1));
    assert!((stats.average_rating.unwrap() - 3.5).abs() < 1e-9);
}

#[test]
fn test_no_reviews_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let reviews = parse_reviews(SIGN_IN);
    assert!(reviews.is_empty());

    let err = save_reviews_csv(&[], ASIN, None, dir.path()).unwrap_err();
    assert!(matches!(err, ScraperError::NoReviews(_)));
}
